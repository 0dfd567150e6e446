use thiserror::Error;

/// Malformed ingest input, rejected before it reaches the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Measurement location is missing or blank")]
    MissingLocation,
    #[error("Measurement value is missing")]
    MissingValue,
    #[error("Unknown agent kind: {0}")]
    UnknownKind(String),
}

/// The measurement did not carry the numbers the observation schema needs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObservationError {
    #[error("Observation field missing: {0}")]
    MissingField(&'static str),
    #[error("Observation field is not a finite number: {0}")]
    NonFinite(&'static str),
    #[error("Observation field is negative: {0}")]
    Negative(&'static str),
}

impl ObservationError {
    pub fn reason_code(&self) -> String {
        match self {
            ObservationError::MissingField(field) => format!("observation_missing:{field}"),
            ObservationError::NonFinite(field) => format!("observation_non_finite:{field}"),
            ObservationError::Negative(field) => format!("observation_negative:{field}"),
        }
    }
}

/// Inference oracle failures. Both variants degrade to the next route.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// Network failure, timeout or an HTTP error status from the oracle
    #[error("Inference oracle unreachable: {0}")]
    Unreachable(String),
    /// Oracle answered but the payload does not match the agent schema
    #[error("Inference oracle returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl InferenceError {
    pub fn reason_label(&self) -> &'static str {
        match self {
            InferenceError::Unreachable(_) => "unreachable",
            InferenceError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Actuation endpoint failures. Logged, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActuationError {
    #[error("Actuation transport error: {0}")]
    Transport(String),
    #[error("Actuation rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Actuation timed out after {0} ms")]
    Timeout(u64),
}

impl ActuationError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            ActuationError::Transport(_) => "actuation_transport",
            ActuationError::Rejected { .. } => "actuation_rejected",
            ActuationError::Timeout(_) => "actuation_timeout",
        }
    }
}

/// Consensus ledger failures. Anchoring is skipped for the decision.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger credentials rejected: {0}")]
    Credentials(String),
    #[error("Ledger transport error: {0}")]
    Transport(String),
    #[error("Ledger rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Ledger response could not be parsed: {0}")]
    Parse(String),
}

impl LedgerError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            LedgerError::Credentials(_) => "consensus_credentials",
            LedgerError::Transport(_) => "consensus_transport",
            LedgerError::Rejected { .. } => "consensus_rejected",
            LedgerError::Parse(_) => "consensus_parse",
        }
    }
}

/// Main crate error type
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Observation(#[from] ObservationError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Actuation(#[from] ActuationError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Client HTTP error (4xx)
    #[error("Client error: status code: {status_code}, error message: {error_message}")]
    ClientRequest {
        status_code: u16,
        error_message: String,
    },

    /// Server HTTP error (5xx)
    #[error("Server error: status code: {status_code}, error message: {error_message}")]
    ServerRequest {
        status_code: u16,
        error_message: String,
    },

    /// Generic request error
    #[error("Generic request error: {0}")]
    GenericRequest(String),

    /// JSON parse error
    #[error("Json parse error: {0}")]
    JsonParse(String),
}

impl Error {
    /// HTTP status carried by the error, if it came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::ClientRequest { status_code, .. } | Error::ServerRequest { status_code, .. } => {
                Some(*status_code)
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::JsonParse(e.to_string())
    }
}
