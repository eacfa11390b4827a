//! Certificate lookup, request and DNS validation.

mod flow;
mod resolver;
mod token;

pub use flow::{
    CertificateProvisioner, ProgressStep, ProvisionReport, ProvisionSettings, ValidationOutcome,
};
pub use resolver::CertificateResolver;
pub use token::{MAX_IDEMPOTENCY_TOKEN_LEN, idempotency_token};
