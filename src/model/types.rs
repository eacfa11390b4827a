use serde::Serialize;

/// TTL applied to every DNS validation record.
pub const VALIDATION_RECORD_TTL_SECS: i64 = 60;

/// A certificate resource as listed by the certificate authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateRef {
    pub domain_name: String,
    pub arn: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationMethod {
    Dns,
    Email,
}

/// Proof-of-ownership record the certificate authority wants to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationChallenge {
    pub record_name: String,
    pub record_type: String,
    pub record_value: String,
    pub method: ValidationMethod,
}

impl ValidationChallenge {
    pub fn dns(record_name: &str, record_type: &str, record_value: &str) -> Self {
        Self {
            record_name: record_name.to_string(),
            record_type: record_type.to_string(),
            record_value: record_value.to_string(),
            method: ValidationMethod::Dns,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    PendingValidation,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDescription {
    pub status: ValidationStatus,
    pub challenges: Vec<ValidationChallenge>,
    /// Provider's reason code when validation failed.
    pub failure_reason: Option<String>,
}

impl CertificateDescription {
    pub fn new(status: ValidationStatus, challenges: Vec<ValidationChallenge>) -> Self {
        Self {
            status,
            challenges,
            failure_reason: None,
        }
    }
}

/// A DNS hosted zone. `name` is dot-qualified (`example.com.`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZoneRef {
    pub id: String,
    pub name: String,
}

/// A single record applied with upsert semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecordChange {
    pub name: String,
    pub record_type: String,
    pub ttl_seconds: i64,
    pub value: String,
}

impl DnsRecordChange {
    pub fn for_challenge(challenge: &ValidationChallenge) -> Self {
        Self {
            name: challenge.record_name.clone(),
            record_type: challenge.record_type.clone(),
            ttl_seconds: VALIDATION_RECORD_TTL_SECS,
            value: challenge.record_value.clone(),
        }
    }
}

/// An edge cache distribution and its alternate domain names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionRef {
    pub id: String,
    pub aliases: Vec<String>,
}

impl DistributionRef {
    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.iter().any(|candidate| candidate == alias)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRequest {
    pub id: String,
    pub distribution_id: String,
    pub caller_reference: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationResult {
    pub id: String,
    pub status: InvalidationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_change_is_deterministic_with_fixed_ttl() {
        let challenge =
            ValidationChallenge::dns("_acme.example.test", "CNAME", "abc.acm-validations.aws.");
        let first = DnsRecordChange::for_challenge(&challenge);
        let second = DnsRecordChange::for_challenge(&challenge);
        assert_eq!(first, second);
        assert_eq!(first.ttl_seconds, 60);
        assert_eq!(first.record_type, "CNAME");
        assert_eq!(first.value, "abc.acm-validations.aws.");
    }

    #[test]
    fn alias_match_is_exact() {
        let distribution = DistributionRef {
            id: "E1".into(),
            aliases: vec!["radiator.example.test".into()],
        };
        assert!(distribution.has_alias("radiator.example.test"));
        assert!(!distribution.has_alias("Radiator.example.test"));
        assert!(!distribution.has_alias("example.test"));
    }
}
