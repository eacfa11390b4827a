use std::fmt;
use std::thread;
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;

use super::resolver::CertificateResolver;
use super::token::idempotency_token;
use crate::domain::qualified_zone_name;
use crate::model::{
    CertificateDescription, CertificateRef, DeployError, DnsRecordChange, HostedZoneRef, Result,
    ValidationChallenge, ValidationMethod, ValidationStatus,
};
use crate::registry::Registry;
use crate::retry::{PollPolicy, RetryPolicy, retry_transient, wait_until};

/// Knobs for a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionSettings {
    /// Suffix of the idempotency token. Above 1, a FAILED certificate for the
    /// domain is replaced by a fresh request instead of failing the run.
    pub token_generation: u32,
    /// Transient-error retries and the post-request listing wait.
    pub lookup: RetryPolicy,
    /// Polling for the authority to report the certificate validated.
    pub validation: PollPolicy,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            token_generation: 1,
            lookup: RetryPolicy::new(5, Duration::from_secs(2)),
            validation: PollPolicy::new(Duration::from_secs(60), Duration::from_secs(40 * 60)),
        }
    }
}

/// Operator-facing milestones, logged as they happen and returned in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ProgressStep {
    CheckingExisting { domain_name: String },
    Requesting { domain_name: String, idempotency_token: String },
    AlreadyValidated { domain_name: String },
    ConfiguringDns { record_name: String, record_type: String, zone: String },
    WaitingForValidation { domain_name: String },
    Validated { domain_name: String },
}

impl fmt::Display for ProgressStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressStep::CheckingExisting { domain_name } => {
                write!(f, "Checking existing certificate for '{domain_name}'")
            }
            ProgressStep::Requesting {
                domain_name,
                idempotency_token,
            } => write!(
                f,
                "Requesting a certificate for '{domain_name}' (token {idempotency_token})"
            ),
            ProgressStep::AlreadyValidated { domain_name } => {
                write!(f, "Certificate for '{domain_name}' is already validated")
            }
            ProgressStep::ConfiguringDns {
                record_name,
                record_type,
                zone,
            } => write!(
                f,
                "Configuring {record_type} record {record_name} in zone {zone} for validation"
            ),
            ProgressStep::WaitingForValidation { domain_name } => {
                write!(f, "Waiting for certificate for '{domain_name}' to validate")
            }
            ProgressStep::Validated { domain_name } => {
                write!(f, "Certificate for '{domain_name}' validated")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// Nothing to do; no DNS changes were made.
    AlreadyValid,
    /// A validation record was applied and the authority confirmed it.
    Validated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub certificate: CertificateRef,
    pub requested: bool,
    pub outcome: ValidationOutcome,
    pub steps: Vec<ProgressStep>,
}

/// Drives a certificate from absent or pending to validated.
///
/// Every run re-derives its state from the registry, so a run killed halfway
/// can simply be started again.
pub struct CertificateProvisioner<'a> {
    registry: &'a dyn Registry,
    resolver: CertificateResolver<'a>,
    settings: ProvisionSettings,
}

impl<'a> CertificateProvisioner<'a> {
    pub fn new(registry: &'a dyn Registry, settings: ProvisionSettings) -> Self {
        Self {
            registry,
            resolver: CertificateResolver::new(registry),
            settings,
        }
    }

    /// Ensures a validated certificate exists for `domain_name`, whose
    /// validation record goes into the hosted zone of `zone_domain`.
    ///
    /// The zone is looked up first, so a missing zone fails the run before
    /// any certificate is requested.
    pub fn provision(&self, domain_name: &str, zone_domain: &str) -> Result<ProvisionReport> {
        let mut steps = Vec::new();
        let zone = self.find_hosted_zone(zone_domain)?;

        record(&mut steps, ProgressStep::CheckingExisting {
            domain_name: domain_name.to_string(),
        });
        let existing = retry_transient("certificate lookup", self.settings.lookup, || {
            self.resolver.resolve(domain_name)
        })?;

        let (certificate, requested) = match existing {
            Some(certificate) if self.is_replaceable(&certificate)? => {
                info!(
                    "[certificate] {} failed validation, requesting a replacement (generation {})",
                    certificate.arn, self.settings.token_generation
                );
                let fresh = self.request(domain_name, Some(&certificate.arn), &mut steps)?;
                (fresh, true)
            }
            Some(certificate) => {
                debug!("[certificate] found {} for '{}'", certificate.arn, domain_name);
                (certificate, false)
            }
            None => (self.request(domain_name, None, &mut steps)?, true),
        };

        let outcome = self.validate(&zone, &certificate, &mut steps)?;

        Ok(ProvisionReport {
            certificate,
            requested,
            outcome,
            steps,
        })
    }

    /// The zone named exactly `<zone_domain>.`; zones are never created.
    pub fn find_hosted_zone(&self, zone_domain: &str) -> Result<HostedZoneRef> {
        let expected = qualified_zone_name(zone_domain);
        let zones = retry_transient("hosted zone lookup", self.settings.lookup, || {
            Ok(self.registry.list_hosted_zones()?)
        })?;

        zones
            .into_iter()
            .find(|zone| zone.name == expected)
            .ok_or_else(|| {
                DeployError::Config(format!(
                    "hosted zone missing for domain '{zone_domain}' (no zone named '{expected}')"
                ))
            })
    }

    /// Only a FAILED certificate under a bumped token generation is replaced.
    fn is_replaceable(&self, certificate: &CertificateRef) -> Result<bool> {
        if self.settings.token_generation <= 1 {
            return Ok(false);
        }
        let description = retry_transient("certificate description", self.settings.lookup, || {
            Ok(self.registry.describe_certificate(certificate)?)
        })?;
        Ok(description.status == ValidationStatus::Failed)
    }

    /// Requests a certificate and waits for it to be listed. `superseded` is
    /// the ARN of a failed certificate the new one replaces.
    fn request(
        &self,
        domain_name: &str,
        superseded: Option<&str>,
        steps: &mut Vec<ProgressStep>,
    ) -> Result<CertificateRef> {
        let token = idempotency_token(domain_name, self.settings.token_generation);
        record(steps, ProgressStep::Requesting {
            domain_name: domain_name.to_string(),
            idempotency_token: token.clone(),
        });

        retry_transient("certificate request", self.settings.lookup, || {
            Ok(self.registry.request_certificate(domain_name, &token)?)
        })?;

        // The new certificate is not always listable right away.
        let attempts = self.settings.lookup.effective_attempts();
        for attempt in 1..=attempts {
            match self.resolver.resolve_excluding(domain_name, superseded) {
                Ok(Some(certificate)) => return Ok(certificate),
                Ok(None) => debug!(
                    "[certificate] '{}' not listed yet (attempt {}/{})",
                    domain_name, attempt, attempts
                ),
                Err(err) if err.is_transient() => debug!(
                    "[certificate] lookup after request failed (attempt {}/{}): {}",
                    attempt, attempts, err
                ),
                Err(err) => return Err(err),
            }
            if attempt < attempts {
                thread::sleep(self.settings.lookup.delay);
            }
        }

        Err(DeployError::Integrity(format!(
            "certificate for '{domain_name}' not found even though it was just requested"
        )))
    }

    fn validate(
        &self,
        zone: &HostedZoneRef,
        certificate: &CertificateRef,
        steps: &mut Vec<ProgressStep>,
    ) -> Result<ValidationOutcome> {
        let domain_name = &certificate.domain_name;
        info!("[certificate] validating {} ({})", domain_name, certificate.arn);

        let description = retry_transient("certificate description", self.settings.lookup, || {
            Ok(self.registry.describe_certificate(certificate)?)
        })?;

        match description.status {
            ValidationStatus::Success => {
                record(steps, ProgressStep::AlreadyValidated {
                    domain_name: domain_name.clone(),
                });
                return Ok(ValidationOutcome::AlreadyValid);
            }
            ValidationStatus::Failed => return Err(validation_failed(certificate, &description)),
            ValidationStatus::PendingValidation => {}
        }

        let challenge = single_dns_challenge(certificate, &description.challenges)?;
        let change = DnsRecordChange::for_challenge(challenge);
        record(steps, ProgressStep::ConfiguringDns {
            record_name: change.name.clone(),
            record_type: change.record_type.clone(),
            zone: zone.name.clone(),
        });
        retry_transient("validation record upsert", self.settings.lookup, || {
            Ok(self.registry.upsert_dns_record(zone, &change)?)
        })?;

        record(steps, ProgressStep::WaitingForValidation {
            domain_name: domain_name.clone(),
        });
        wait_until(
            "certificate validation",
            domain_name,
            self.settings.validation,
            || {
                let description = self.registry.describe_certificate(certificate)?;
                match description.status {
                    ValidationStatus::Success => Ok(Some(())),
                    ValidationStatus::Failed => Err(validation_failed(certificate, &description)),
                    ValidationStatus::PendingValidation => Ok(None),
                }
            },
        )?;

        record(steps, ProgressStep::Validated {
            domain_name: domain_name.clone(),
        });
        Ok(ValidationOutcome::Validated)
    }
}

fn record(steps: &mut Vec<ProgressStep>, step: ProgressStep) {
    info!("[certificate] {step}");
    steps.push(step);
}

/// Only DNS validation is automated, and only for a single-domain certificate.
fn single_dns_challenge<'c>(
    certificate: &CertificateRef,
    challenges: &'c [ValidationChallenge],
) -> Result<&'c ValidationChallenge> {
    match challenges {
        [challenge] if challenge.method == ValidationMethod::Dns => Ok(challenge),
        [challenge] => Err(DeployError::Config(format!(
            "certificate {} uses {:?} validation; only DNS validation is supported",
            certificate.arn, challenge.method
        ))),
        _ => Err(DeployError::Config(format!(
            "certificate {} has {} validation challenges; exactly one DNS challenge is supported",
            certificate.arn,
            challenges.len()
        ))),
    }
}

fn validation_failed(certificate: &CertificateRef, description: &CertificateDescription) -> DeployError {
    DeployError::ValidationFailed {
        domain: certificate.domain_name.clone(),
        reason: description
            .failure_reason
            .clone()
            .unwrap_or_else(|| "certificate authority reported FAILED".to_string()),
    }
}
