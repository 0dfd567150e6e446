//! Actuation collaborator: hands outcomes to the physical controllers.
//!
//! Best effort. The pipeline records the decision whether or not actuation
//! succeeds.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::control::config::ActuationConfig;
use crate::control::infra::targets;
use crate::errors::ActuationError;
use crate::req::HttpClient;
use crate::types::{AgentKind, Outcome};
use crate::Error;

#[async_trait]
pub trait Actuator: Send + Sync {
    async fn apply_outcome(&self, kind: AgentKind, location: &str, outcome: &Outcome) -> Result<(), ActuationError>;
}

/// Controller bridge at `POST {base}/{kind}/apply`.
pub struct HttpActuator {
    http: HttpClient,
    timeout: Duration,
}

impl HttpActuator {
    pub fn new(base_url: impl Into<String>, config: &ActuationConfig) -> Result<Self, Error> {
        Ok(Self {
            http: HttpClient::new(base_url, config.timeout())?.with_retries(config.max_retries),
            timeout: config.timeout(),
        })
    }
}

fn actuation_error(e: Error) -> ActuationError {
    match e {
        Error::ClientRequest {
            status_code,
            error_message,
        }
        | Error::ServerRequest {
            status_code,
            error_message,
        } => ActuationError::Rejected {
            status: status_code,
            message: error_message,
        },
        other => ActuationError::Transport(other.to_string()),
    }
}

#[async_trait]
impl Actuator for HttpActuator {
    async fn apply_outcome(&self, kind: AgentKind, location: &str, outcome: &Outcome) -> Result<(), ActuationError> {
        let body = json!({ "location": location, "outcome": outcome }).to_string();
        let path = format!("/{kind}/apply");

        // The overall budget also covers retry backoff
        match tokio::time::timeout(self.timeout, self.http.post(&path, body, &[])).await {
            Ok(Ok(_)) => {
                debug!(target: targets::ACTUATION, agent = %kind, location, "Outcome applied");
                Ok(())
            }
            Ok(Err(e)) => Err(actuation_error(e)),
            Err(_) => Err(ActuationError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

/// Logs outcomes without actuating. Used when no controller URL is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActuator;

#[async_trait]
impl Actuator for NoopActuator {
    async fn apply_outcome(&self, kind: AgentKind, location: &str, outcome: &Outcome) -> Result<(), ActuationError> {
        info!(
            target: targets::ACTUATION,
            agent = %kind,
            location,
            outcome = %json!(outcome),
            "No actuation endpoint configured, outcome logged only"
        );
        Ok(())
    }
}
