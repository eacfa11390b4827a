use log::{debug, warn};

use crate::model::{CertificateRef, DeployError, Result};
use crate::registry::Registry;

/// Looks up an existing certificate by exact domain name.
pub struct CertificateResolver<'a> {
    registry: &'a dyn Registry,
}

impl<'a> CertificateResolver<'a> {
    pub fn new(registry: &'a dyn Registry) -> Self {
        Self { registry }
    }

    /// Returns the first listed certificate whose domain equals `domain_name`
    /// (case-sensitive, no wildcard matching). Registry errors propagate
    /// unchanged; retrying is up to the caller.
    pub fn resolve(&self, domain_name: &str) -> Result<Option<CertificateRef>> {
        self.resolve_excluding(domain_name, None)
    }

    /// Like [`resolve`](Self::resolve), but skips the certificate with ARN
    /// `superseded`.
    pub fn resolve_excluding(
        &self,
        domain_name: &str,
        superseded: Option<&str>,
    ) -> Result<Option<CertificateRef>> {
        let certificates = self.registry.list_certificates()?;
        let mut matching = certificates.into_iter().filter(|certificate| {
            certificate.domain_name == domain_name
                && superseded.is_none_or(|arn| arn != certificate.arn)
        });

        let Some(first) = matching.next() else {
            debug!("[certificate] no certificate listed for '{}'", domain_name);
            return Ok(None);
        };

        let others = matching.count();
        if others > 0 {
            warn!(
                "[certificate] {} certificates match '{}', using the first listed ({})",
                others + 1,
                domain_name,
                first.arn
            );
        }

        if first.arn.is_empty() {
            return Err(DeployError::Integrity(format!(
                "certificate for '{domain_name}' does not have an ARN"
            )));
        }

        Ok(Some(first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RegistryError;
    use crate::registry::{MemoryRegistry, RegistryCall};

    #[test]
    fn returns_none_without_match() {
        let registry = MemoryRegistry::new().with_certificate("other.test", "arn:1", vec![]);
        let resolver = CertificateResolver::new(&registry);
        assert_eq!(resolver.resolve("example.test").unwrap(), None);
    }

    #[test]
    fn matches_exactly_and_case_sensitively() {
        let registry = MemoryRegistry::new()
            .with_certificate("*.example.test", "arn:wildcard", vec![])
            .with_certificate("Example.test", "arn:upper", vec![])
            .with_certificate("example.test", "arn:exact", vec![]);
        let resolver = CertificateResolver::new(&registry);
        let found = resolver.resolve("example.test").unwrap().unwrap();
        assert_eq!(found.arn, "arn:exact");
    }

    #[test]
    fn first_listed_match_wins() {
        let registry = MemoryRegistry::new()
            .with_certificate("example.test", "arn:first", vec![])
            .with_certificate("example.test", "arn:second", vec![]);
        let resolver = CertificateResolver::new(&registry);
        assert_eq!(resolver.resolve("example.test").unwrap().unwrap().arn, "arn:first");
    }

    #[test]
    fn superseded_certificate_is_skipped() {
        let registry = MemoryRegistry::new()
            .with_certificate("example.test", "arn:failed", vec![])
            .with_certificate("example.test", "arn:fresh", vec![]);
        let resolver = CertificateResolver::new(&registry);
        let found = resolver
            .resolve_excluding("example.test", Some("arn:failed"))
            .unwrap()
            .unwrap();
        assert_eq!(found.arn, "arn:fresh");
        assert_eq!(
            resolver.resolve_excluding("other.test", Some("arn:failed")).unwrap(),
            None
        );
    }

    #[test]
    fn missing_arn_is_integrity_error() {
        let registry = MemoryRegistry::new().with_certificate("example.test", "", vec![]);
        let resolver = CertificateResolver::new(&registry);
        let err = resolver.resolve("example.test").unwrap_err();
        assert!(err.to_string().starts_with("FATAL"));
    }

    #[test]
    fn transient_errors_propagate_without_retry() {
        let registry = MemoryRegistry::new()
            .with_transient_failures(RegistryCall::ListCertificates, 1)
            .with_certificate("example.test", "arn:1", vec![]);
        let resolver = CertificateResolver::new(&registry);
        let err = resolver.resolve("example.test").unwrap_err();
        assert!(matches!(err, DeployError::Registry(RegistryError::Transient(_))));
        assert_eq!(registry.call_count(RegistryCall::ListCertificates), 1);
    }
}
