use std::time::Duration;

use thiserror::Error;

/// Failure reported by the certificate, DNS or CDN service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Throttling or eventual-consistency lag; the same call may succeed later.
    #[error("transient registry error: {0}")]
    Transient(String),
    #[error("registry error: {0}")]
    Fatal(String),
}

/// Every way a deployment run can fail. All variants abort the run.
#[derive(Error, Debug)]
pub enum DeployError {
    /// Missing input, unsupported validation setup, or a precondition resource
    /// (hosted zone, distribution) that does not exist.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{operation} still failing after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        source: RegistryError,
    },

    /// The certificate authority rejected validation. Needs a human.
    #[error("certificate validation failed for '{domain}': {reason}")]
    ValidationFailed { domain: String, reason: String },

    /// Something that must exist per an invariant does not.
    #[error("FATAL {0}")]
    Integrity(String),

    #[error(
        "timed out after {}s waiting for {operation} of '{subject}'; it may still complete asynchronously, re-run the workflow to pick it up",
        .elapsed.as_secs()
    )]
    Timeout {
        operation: String,
        subject: String,
        elapsed: Duration,
    },
}

impl DeployError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeployError::Registry(RegistryError::Transient(_)))
    }
}

pub type Result<T, E = DeployError> = std::result::Result<T, E>;
