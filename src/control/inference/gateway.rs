use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{validate_response, InferenceOracle, InferenceRequest, PolicyDecision};
use crate::control::infra::targets;
use crate::errors::InferenceError;
use crate::types::{AgentKind, Observation};

/// One inference route: an oracle behind a fixed timeout and schema check.
///
/// No retries. A slow or failing oracle degrades the caller to the next route.
#[derive(Clone)]
pub struct InferenceGateway {
    route: &'static str,
    oracle: Arc<dyn InferenceOracle>,
    timeout: Duration,
}

impl InferenceGateway {
    pub fn new(route: &'static str, oracle: Arc<dyn InferenceOracle>, timeout: Duration) -> Self {
        Self {
            route,
            oracle,
            timeout,
        }
    }

    /// Route label used in reason codes (`primary`, `secondary`).
    pub fn route(&self) -> &'static str {
        self.route
    }

    pub fn endpoint(&self) -> &str {
        self.oracle.endpoint()
    }

    pub async fn request_decision(
        &self,
        kind: AgentKind,
        observation: &Observation,
        context: Map<String, Value>,
    ) -> Result<PolicyDecision, InferenceError> {
        let request = InferenceRequest {
            observation: *observation,
            context,
        };

        let body = match tokio::time::timeout(self.timeout, self.oracle.infer(kind, &request)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Unreachable(format!(
                "timed out after {} ms",
                self.timeout.as_millis()
            ))),
        };

        let result = body.and_then(|body| validate_response(kind, body));
        match &result {
            Ok(decision) => debug!(
                target: targets::INFERENCE,
                route = self.route,
                agent = %kind,
                confidence = ?decision.confidence,
                "Policy decision accepted"
            ),
            Err(e) => warn!(
                target: targets::INFERENCE,
                route = self.route,
                agent = %kind,
                endpoint = self.oracle.endpoint(),
                reason = e.reason_label(),
                error = %e,
                "Inference route failed"
            ),
        }
        result
    }
}

impl std::fmt::Debug for InferenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceGateway")
            .field("route", &self.route)
            .field("endpoint", &self.oracle.endpoint())
            .field("timeout", &self.timeout)
            .finish()
    }
}
