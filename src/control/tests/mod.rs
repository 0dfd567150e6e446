//! End-to-end tests of the decision pipeline with in-process collaborators.

mod support;
