//! Blocking client boundary to the certificate authority, the DNS service and
//! the edge cache.
//!
//! Every method is one network round-trip with no side effects beyond the
//! named call. Implementations classify failures as
//! [`RegistryError::Transient`] (throttling, eventual consistency) or
//! [`RegistryError::Fatal`]; retry policy is left to callers.

use crate::model::{
    CertificateDescription, CertificateRef, DistributionRef, DnsRecordChange, HostedZoneRef,
    InvalidationRequest, InvalidationResult, RegistryError,
};

mod aws;
mod memory;

pub use aws::AwsRegistry;
pub use memory::{
    MemoryRegistry, RecordedRequest, RecordedSubmission, RecordedUpsert, RegistryCall,
};

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

pub trait Registry: Send + Sync {
    /// All certificates in provider order. May be empty.
    fn list_certificates(&self) -> RegistryResult<Vec<CertificateRef>>;

    fn list_hosted_zones(&self) -> RegistryResult<Vec<HostedZoneRef>>;

    /// Requests a DNS-validated certificate. Repeating the call with the same
    /// token does not create a second certificate.
    fn request_certificate(&self, domain_name: &str, idempotency_token: &str) -> RegistryResult<()>;

    fn describe_certificate(&self, certificate: &CertificateRef) -> RegistryResult<CertificateDescription>;

    /// Create-or-replace; never deletes.
    fn upsert_dns_record(&self, zone: &HostedZoneRef, change: &DnsRecordChange) -> RegistryResult<()>;

    /// All distributions in provider order.
    fn list_distributions(&self) -> RegistryResult<Vec<DistributionRef>>;

    fn invalidate_distribution(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> RegistryResult<InvalidationRequest>;

    fn poll_invalidation(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> RegistryResult<InvalidationResult>;
}
