use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Registry, RegistryResult};
use crate::model::{
    CertificateDescription, CertificateRef, DistributionRef, DnsRecordChange, HostedZoneRef,
    InvalidationRequest, InvalidationResult, InvalidationStatus, RegistryError,
    ValidationChallenge, ValidationStatus,
};

/// Names a [`Registry`] method, for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryCall {
    ListCertificates,
    ListHostedZones,
    RequestCertificate,
    DescribeCertificate,
    UpsertDnsRecord,
    ListDistributions,
    InvalidateDistribution,
    PollInvalidation,
}

impl RegistryCall {
    pub fn is_dns_mutation(self) -> bool {
        matches!(self, RegistryCall::UpsertDnsRecord)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpsert {
    pub zone_id: String,
    pub change: DnsRecordChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmission {
    pub distribution_id: String,
    pub caller_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub domain_name: String,
    pub idempotency_token: String,
}

struct CertificateEntry {
    certificate: CertificateRef,
    /// Remaining `list_certificates` calls that will not see this certificate.
    hidden_for: u32,
    /// Scripted descriptions; the last one repeats.
    script: VecDeque<CertificateDescription>,
}

#[derive(Default)]
struct State {
    certificates: Vec<CertificateEntry>,
    tokens: HashMap<String, String>,
    zones: Vec<HostedZoneRef>,
    distributions: Vec<DistributionRef>,
    listing_delay: u32,
    new_certificate_script: Vec<CertificateDescription>,
    invalidation_polls: u32,
    invalidation_poll_counts: HashMap<String, u32>,
    failures: HashMap<RegistryCall, u32>,
    lost_responses: HashMap<RegistryCall, u32>,
    calls: Vec<RegistryCall>,
    requests: Vec<RecordedRequest>,
    submissions: Vec<RecordedSubmission>,
    upserts: Vec<RecordedUpsert>,
    invalidations: Vec<InvalidationRequest>,
}

/// Deterministic in-process [`Registry`].
///
/// Unscripted certificates behave like the real authority: pending with one
/// DNS challenge until the matching record has been upserted, then successful.
/// Certificate requests are deduplicated by idempotency token and
/// invalidations by caller reference.
#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<State>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hosted_zone(self, id: &str, name: &str) -> Self {
        self.lock().zones.push(HostedZoneRef {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Registers an existing certificate. An empty `script` means unscripted.
    pub fn with_certificate(
        self,
        domain_name: &str,
        arn: &str,
        script: Vec<CertificateDescription>,
    ) -> Self {
        self.lock().certificates.push(CertificateEntry {
            certificate: CertificateRef {
                domain_name: domain_name.to_string(),
                arn: arn.to_string(),
            },
            hidden_for: 0,
            script: script.into(),
        });
        self
    }

    /// Descriptions returned, in order, for certificates requested later.
    pub fn with_new_certificate_script(self, script: Vec<CertificateDescription>) -> Self {
        self.lock().new_certificate_script = script;
        self
    }

    /// Newly requested certificates stay unlisted for `list_calls` listings.
    pub fn with_listing_delay(self, list_calls: u32) -> Self {
        self.lock().listing_delay = list_calls;
        self
    }

    pub fn with_distribution(self, id: &str, aliases: &[&str]) -> Self {
        self.lock().distributions.push(DistributionRef {
            id: id.to_string(),
            aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
        });
        self
    }

    /// Invalidations report in-progress for `polls` polls before completing.
    pub fn with_invalidation_polls(self, polls: u32) -> Self {
        self.lock().invalidation_polls = polls;
        self
    }

    /// The next `times` calls of `call` fail with a transient error.
    pub fn with_transient_failures(self, call: RegistryCall, times: u32) -> Self {
        self.lock().failures.insert(call, times);
        self
    }

    /// The next `times` calls of `call` take effect but report a transient
    /// error, as when the response is lost on the way back.
    pub fn with_lost_responses(self, call: RegistryCall, times: u32) -> Self {
        self.lock().lost_responses.insert(call, times);
        self
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, call: RegistryCall) -> usize {
        self.lock().calls.iter().filter(|c| **c == call).count()
    }

    pub fn dns_mutation_count(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.is_dns_mutation()).count()
    }

    pub fn certificates(&self) -> Vec<CertificateRef> {
        self.lock()
            .certificates
            .iter()
            .map(|entry| entry.certificate.clone())
            .collect()
    }

    /// Every certificate request attempt, including failed ones.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn upserts(&self) -> Vec<RecordedUpsert> {
        self.lock().upserts.clone()
    }

    pub fn invalidations(&self) -> Vec<InvalidationRequest> {
        self.lock().invalidations.clone()
    }

    /// Every invalidation submission attempt, including failed ones.
    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.lock().submissions.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, call: RegistryCall) -> RegistryResult<MutexGuard<'_, State>> {
        self.enter_recording(call, |_| {})
    }

    /// Records the call and its arguments, then consumes an injected failure
    /// if one is pending.
    fn enter_recording<F>(&self, call: RegistryCall, record: F) -> RegistryResult<MutexGuard<'_, State>>
    where
        F: FnOnce(&mut State),
    {
        let mut state = self.lock();
        state.calls.push(call);
        record(&mut state);
        take_injected(&mut state.failures, call, "throttled")?;
        Ok(state)
    }
}

fn take_injected(
    pending: &mut HashMap<RegistryCall, u32>,
    call: RegistryCall,
    what: &str,
) -> RegistryResult<()> {
    if let Some(remaining) = pending.get_mut(&call)
        && *remaining > 0
    {
        *remaining -= 1;
        return Err(RegistryError::Transient(format!("{call:?} {what}")));
    }
    Ok(())
}

fn generated_challenge(domain_name: &str, serial: usize) -> ValidationChallenge {
    ValidationChallenge::dns(
        &format!("_acme.{domain_name}."),
        "CNAME",
        &format!("validation{serial}.acm-validations.aws."),
    )
}

impl Registry for MemoryRegistry {
    fn list_certificates(&self) -> RegistryResult<Vec<CertificateRef>> {
        let mut state = self.enter(RegistryCall::ListCertificates)?;
        let mut listed = Vec::new();
        for entry in state.certificates.iter_mut() {
            if entry.hidden_for > 0 {
                entry.hidden_for -= 1;
            } else {
                listed.push(entry.certificate.clone());
            }
        }
        Ok(listed)
    }

    fn list_hosted_zones(&self) -> RegistryResult<Vec<HostedZoneRef>> {
        let state = self.enter(RegistryCall::ListHostedZones)?;
        Ok(state.zones.clone())
    }

    fn request_certificate(&self, domain_name: &str, idempotency_token: &str) -> RegistryResult<()> {
        let mut state = self.enter_recording(RegistryCall::RequestCertificate, |state| {
            state.requests.push(RecordedRequest {
                domain_name: domain_name.to_string(),
                idempotency_token: idempotency_token.to_string(),
            });
        })?;
        if state.tokens.contains_key(idempotency_token) {
            return take_injected(
                &mut state.lost_responses,
                RegistryCall::RequestCertificate,
                "response lost",
            );
        }

        let serial = state.certificates.len() + 1;
        let arn = format!("arn:aws:acm:us-east-1:000000000000:certificate/{serial:08}");
        let hidden_for = state.listing_delay;
        let script = state.new_certificate_script.clone().into();
        state
            .tokens
            .insert(idempotency_token.to_string(), arn.clone());
        state.certificates.push(CertificateEntry {
            certificate: CertificateRef {
                domain_name: domain_name.to_string(),
                arn,
            },
            hidden_for,
            script,
        });
        take_injected(
            &mut state.lost_responses,
            RegistryCall::RequestCertificate,
            "response lost",
        )
    }

    fn describe_certificate(&self, certificate: &CertificateRef) -> RegistryResult<CertificateDescription> {
        let mut state = self.enter(RegistryCall::DescribeCertificate)?;
        let upserts = state.upserts.clone();
        let (serial, entry) = state
            .certificates
            .iter_mut()
            .enumerate()
            .find(|(_, entry)| entry.certificate.arn == certificate.arn)
            .ok_or_else(|| {
                RegistryError::Fatal(format!("certificate {} does not exist", certificate.arn))
            })?;

        if let Some(next) = entry.script.front().cloned() {
            if entry.script.len() > 1 {
                entry.script.pop_front();
            }
            return Ok(next);
        }

        let challenge = generated_challenge(&entry.certificate.domain_name, serial + 1);
        let published = upserts.iter().any(|upsert| {
            upsert.change.name == challenge.record_name && upsert.change.value == challenge.record_value
        });
        let status = if published {
            ValidationStatus::Success
        } else {
            ValidationStatus::PendingValidation
        };
        Ok(CertificateDescription::new(status, vec![challenge]))
    }

    fn upsert_dns_record(&self, zone: &HostedZoneRef, change: &DnsRecordChange) -> RegistryResult<()> {
        let mut state = self.enter(RegistryCall::UpsertDnsRecord)?;
        if !state.zones.iter().any(|known| known.id == zone.id) {
            return Err(RegistryError::Fatal(format!("hosted zone {} does not exist", zone.id)));
        }
        state
            .upserts
            .retain(|existing| !(existing.zone_id == zone.id && existing.change.name == change.name));
        state.upserts.push(RecordedUpsert {
            zone_id: zone.id.clone(),
            change: change.clone(),
        });
        Ok(())
    }

    fn list_distributions(&self) -> RegistryResult<Vec<DistributionRef>> {
        let state = self.enter(RegistryCall::ListDistributions)?;
        Ok(state.distributions.clone())
    }

    fn invalidate_distribution(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> RegistryResult<InvalidationRequest> {
        let mut state = self.enter_recording(RegistryCall::InvalidateDistribution, |state| {
            state.submissions.push(RecordedSubmission {
                distribution_id: distribution_id.to_string(),
                caller_reference: caller_reference.to_string(),
            });
        })?;
        if !state.distributions.iter().any(|d| d.id == distribution_id) {
            return Err(RegistryError::Fatal(format!(
                "distribution {distribution_id} does not exist"
            )));
        }

        // Same caller reference on the same distribution returns the existing batch.
        let existing = state
            .invalidations
            .iter()
            .find(|i| i.distribution_id == distribution_id && i.caller_reference == caller_reference)
            .cloned();
        let request = match existing {
            Some(request) => request,
            None => {
                let request = InvalidationRequest {
                    id: format!("I{:04}", state.invalidations.len() + 1),
                    distribution_id: distribution_id.to_string(),
                    caller_reference: caller_reference.to_string(),
                    paths: paths.to_vec(),
                };
                state.invalidations.push(request.clone());
                request
            }
        };
        take_injected(
            &mut state.lost_responses,
            RegistryCall::InvalidateDistribution,
            "response lost",
        )?;
        Ok(request)
    }

    fn poll_invalidation(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> RegistryResult<InvalidationResult> {
        let mut state = self.enter(RegistryCall::PollInvalidation)?;
        if !state
            .invalidations
            .iter()
            .any(|i| i.id == invalidation_id && i.distribution_id == distribution_id)
        {
            return Err(RegistryError::Fatal(format!(
                "invalidation {invalidation_id} does not exist on {distribution_id}"
            )));
        }
        let required = state.invalidation_polls;
        let seen = state
            .invalidation_poll_counts
            .entry(invalidation_id.to_string())
            .or_insert(0);
        *seen += 1;
        let status = if *seen > required {
            InvalidationStatus::Completed
        } else {
            InvalidationStatus::InProgress
        };
        Ok(InvalidationResult {
            id: invalidation_id.to_string(),
            status,
        })
    }
}
