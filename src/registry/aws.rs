use std::error::Error as StdError;
use std::fmt::Debug;

use aws_config::BehaviorVersion;
use aws_sdk_acm::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_acm::types::{
    CertificateDetail, CertificateStatus, DomainStatus, DomainValidation,
    ValidationMethod as AcmValidationMethod,
};
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use log::{debug, info};
use tokio::runtime::Runtime;

use super::{Registry, RegistryResult};
use crate::model::{
    CertificateDescription, CertificateRef, DistributionRef, DnsRecordChange, HostedZoneRef,
    InvalidationRequest, InvalidationResult, InvalidationStatus, RegistryError,
    ValidationChallenge, ValidationMethod, ValidationStatus,
};

/// Service error codes that mean "slow down and try again".
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "PriorRequestNotComplete",
];

/// [`Registry`] backed by ACM, Route 53 and CloudFront.
///
/// The SDK is async; calls are driven to completion on a private
/// current-thread runtime so callers stay synchronous.
pub struct AwsRegistry {
    runtime: Runtime,
    acm: aws_sdk_acm::Client,
    route53: aws_sdk_route53::Client,
    cloudfront: aws_sdk_cloudfront::Client,
}

impl AwsRegistry {
    /// Loads credentials from the default provider chain. ACM is pinned to
    /// `certificate_region`; CloudFront only accepts certificates from us-east-1.
    pub fn connect(certificate_region: &str) -> RegistryResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| RegistryError::Fatal(format!("Failed to create tokio runtime: {e}")))?;

        let shared = runtime.block_on(aws_config::defaults(BehaviorVersion::latest()).load());

        let acm_config = aws_sdk_acm::config::Builder::from(&shared)
            .region(aws_sdk_acm::config::Region::new(certificate_region.to_string()))
            .build();

        debug!(
            "[registry] AWS clients ready (certificate region {}, default region {:?})",
            certificate_region,
            shared.region()
        );

        Ok(Self {
            acm: aws_sdk_acm::Client::from_conf(acm_config),
            route53: aws_sdk_route53::Client::new(&shared),
            cloudfront: aws_sdk_cloudfront::Client::new(&shared),
            runtime,
        })
    }

    async fn fetch_certificates(&self) -> RegistryResult<Vec<CertificateRef>> {
        let mut certificates = Vec::new();
        let mut paginator = self.acm.list_certificates().into_paginator().send();

        while let Some(page) = paginator.next().await {
            let page = page.map_err(|e| classify("Failed to list ACM certificates", e))?;
            for summary in page.certificate_summary_list() {
                let Some(domain_name) = summary.domain_name() else {
                    debug!("[registry] skipping certificate summary without a domain name");
                    continue;
                };
                certificates.push(CertificateRef {
                    domain_name: domain_name.to_string(),
                    // Checked by the resolver; an empty ARN is an integrity error.
                    arn: summary.certificate_arn().unwrap_or_default().to_string(),
                });
            }
        }

        Ok(certificates)
    }

    async fn fetch_hosted_zones(&self) -> RegistryResult<Vec<HostedZoneRef>> {
        let mut zones = Vec::new();
        let mut paginator = self
            .route53
            .list_hosted_zones()
            .into_paginator()
            .page_size(100)
            .send();

        while let Some(page) = paginator.next().await {
            let page = page.map_err(|e| classify("Failed to list Route 53 hosted zones", e))?;
            for zone in page.hosted_zones() {
                zones.push(HostedZoneRef {
                    id: zone.id().to_string(),
                    name: zone.name().to_string(),
                });
            }
        }

        Ok(zones)
    }

    async fn send_certificate_request(&self, domain_name: &str, idempotency_token: &str) -> RegistryResult<()> {
        let output = self
            .acm
            .request_certificate()
            .domain_name(domain_name)
            .validation_method(AcmValidationMethod::Dns)
            .idempotency_token(idempotency_token)
            .send()
            .await
            .map_err(|e| classify("Failed to request ACM certificate", e))?;

        info!(
            "[registry] ACM accepted certificate request for {} ({})",
            domain_name,
            output.certificate_arn().unwrap_or("no ARN returned")
        );
        Ok(())
    }

    async fn fetch_description(&self, certificate: &CertificateRef) -> RegistryResult<CertificateDescription> {
        let output = self
            .acm
            .describe_certificate()
            .certificate_arn(&certificate.arn)
            .send()
            .await
            .map_err(|e| classify("Failed to describe ACM certificate", e))?;

        let detail = output.certificate().ok_or_else(|| {
            RegistryError::Fatal(format!(
                "FATAL certificate {} not returned from API",
                certificate.arn
            ))
        })?;

        describe_detail(detail)
    }

    async fn send_record_change(&self, zone: &HostedZoneRef, change: &DnsRecordChange) -> RegistryResult<()> {
        let record_set = ResourceRecordSet::builder()
            .name(&change.name)
            .set_resource_records(Some(vec![ResourceRecord::builder()
                .value(&change.value)
                .build()
                .map_err(|e| RegistryError::Fatal(format!("Failed to build ResourceRecord: {e}")))?]))
            .ttl(change.ttl_seconds)
            .set_type(Some(RrType::from(change.record_type.as_str())))
            .build()
            .map_err(|e| RegistryError::Fatal(format!("Failed to build ResourceRecordSet: {e}")))?;

        let upsert = Change::builder()
            .action(ChangeAction::Upsert)
            .resource_record_set(record_set)
            .build()
            .map_err(|e| RegistryError::Fatal(format!("Failed to build Change: {e}")))?;

        let change_batch = ChangeBatch::builder()
            .changes(upsert)
            .build()
            .map_err(|e| RegistryError::Fatal(format!("Failed to build ChangeBatch: {e}")))?;

        let output = self
            .route53
            .change_resource_record_sets()
            .hosted_zone_id(&zone.id)
            .change_batch(change_batch)
            .send()
            .await
            .map_err(|e| classify("Failed to upsert Route 53 DNS record", e))?;

        debug!(
            "[registry] Route 53 change {:?} submitted for {} in zone {}",
            output.change_info().map(|info| info.id()),
            change.name,
            zone.id
        );
        Ok(())
    }

    async fn fetch_distributions(&self) -> RegistryResult<Vec<DistributionRef>> {
        let mut distributions = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .cloudfront
                .list_distributions()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| classify("Failed to list CloudFront distributions", e))?;

            let list = output.distribution_list().ok_or_else(|| {
                RegistryError::Fatal("FATAL distribution list missing from response".to_string())
            })?;

            for summary in list.items() {
                distributions.push(DistributionRef {
                    id: summary.id().to_string(),
                    aliases: summary
                        .aliases()
                        .map(|aliases| aliases.items().to_vec())
                        .unwrap_or_default(),
                });
            }

            marker = list.next_marker().map(str::to_string);
            if !list.is_truncated() || marker.is_none() {
                break;
            }
        }

        Ok(distributions)
    }

    async fn send_invalidation(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> RegistryResult<InvalidationRequest> {
        let quantity = i32::try_from(paths.len())
            .map_err(|_| RegistryError::Fatal(format!("too many paths: {}", paths.len())))?;
        let path_set = Paths::builder()
            .quantity(quantity)
            .set_items(Some(paths.to_vec()))
            .build()
            .map_err(|e| RegistryError::Fatal(format!("Failed to build Paths: {e}")))?;
        let batch = InvalidationBatch::builder()
            .caller_reference(caller_reference)
            .paths(path_set)
            .build()
            .map_err(|e| RegistryError::Fatal(format!("Failed to build InvalidationBatch: {e}")))?;

        let output = self
            .cloudfront
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| classify("Failed to create CloudFront invalidation", e))?;

        let invalidation = output.invalidation().ok_or_else(|| {
            RegistryError::Fatal("FATAL invalidation missing from response".to_string())
        })?;

        Ok(InvalidationRequest {
            id: invalidation.id().to_string(),
            distribution_id: distribution_id.to_string(),
            caller_reference: caller_reference.to_string(),
            paths: paths.to_vec(),
        })
    }

    async fn fetch_invalidation(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> RegistryResult<InvalidationResult> {
        let output = self
            .cloudfront
            .get_invalidation()
            .distribution_id(distribution_id)
            .id(invalidation_id)
            .send()
            .await
            .map_err(|e| classify("Failed to get CloudFront invalidation", e))?;

        let invalidation = output.invalidation().ok_or_else(|| {
            RegistryError::Fatal(format!(
                "FATAL invalidation {invalidation_id} missing from response"
            ))
        })?;

        Ok(InvalidationResult {
            id: invalidation.id().to_string(),
            status: invalidation_status(invalidation.status()),
        })
    }
}

impl Registry for AwsRegistry {
    fn list_certificates(&self) -> RegistryResult<Vec<CertificateRef>> {
        self.runtime.block_on(self.fetch_certificates())
    }

    fn list_hosted_zones(&self) -> RegistryResult<Vec<HostedZoneRef>> {
        self.runtime.block_on(self.fetch_hosted_zones())
    }

    fn request_certificate(&self, domain_name: &str, idempotency_token: &str) -> RegistryResult<()> {
        self.runtime
            .block_on(self.send_certificate_request(domain_name, idempotency_token))
    }

    fn describe_certificate(&self, certificate: &CertificateRef) -> RegistryResult<CertificateDescription> {
        self.runtime.block_on(self.fetch_description(certificate))
    }

    fn upsert_dns_record(&self, zone: &HostedZoneRef, change: &DnsRecordChange) -> RegistryResult<()> {
        self.runtime.block_on(self.send_record_change(zone, change))
    }

    fn list_distributions(&self) -> RegistryResult<Vec<DistributionRef>> {
        self.runtime.block_on(self.fetch_distributions())
    }

    fn invalidate_distribution(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> RegistryResult<InvalidationRequest> {
        self.runtime
            .block_on(self.send_invalidation(distribution_id, paths, caller_reference))
    }

    fn poll_invalidation(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> RegistryResult<InvalidationResult> {
        self.runtime
            .block_on(self.fetch_invalidation(distribution_id, invalidation_id))
    }
}

fn classify<E, R>(context: &str, err: SdkError<E, R>) -> RegistryError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => true,
        _ => err.code().is_some_and(is_throttling_code),
    };
    let message = format!("{context}: {}", DisplayErrorContext(&err));
    if transient {
        RegistryError::Transient(message)
    } else {
        RegistryError::Fatal(message)
    }
}

fn is_throttling_code(code: &str) -> bool {
    THROTTLING_CODES.contains(&code)
}

fn invalidation_status(raw: &str) -> InvalidationStatus {
    if raw.eq_ignore_ascii_case("Completed") {
        InvalidationStatus::Completed
    } else {
        InvalidationStatus::InProgress
    }
}

fn describe_detail(detail: &CertificateDetail) -> RegistryResult<CertificateDescription> {
    let options = detail.domain_validation_options();
    let status = overall_status(detail.status(), options);
    let challenges = if status == ValidationStatus::PendingValidation {
        pending_challenges(options)?
    } else {
        options.iter().filter_map(published_challenge).collect()
    };

    Ok(CertificateDescription {
        status,
        challenges,
        failure_reason: detail.failure_reason().map(|reason| reason.as_str().to_string()),
    })
}

fn overall_status(
    certificate_status: Option<&CertificateStatus>,
    options: &[DomainValidation],
) -> ValidationStatus {
    match certificate_status {
        Some(CertificateStatus::Issued) => return ValidationStatus::Success,
        Some(
            CertificateStatus::Failed
            | CertificateStatus::ValidationTimedOut
            | CertificateStatus::Revoked,
        ) => return ValidationStatus::Failed,
        _ => {}
    }

    if options
        .iter()
        .any(|option| option.validation_status() == Some(&DomainStatus::Failed))
    {
        return ValidationStatus::Failed;
    }
    if !options.is_empty()
        && options
            .iter()
            .all(|option| option.validation_status() == Some(&DomainStatus::Success))
    {
        return ValidationStatus::Success;
    }
    ValidationStatus::PendingValidation
}

/// ACM fills in validation options a few seconds after the request; until
/// then the description is reported as transient so callers retry.
fn pending_challenges(options: &[DomainValidation]) -> RegistryResult<Vec<ValidationChallenge>> {
    if options.is_empty() {
        return Err(RegistryError::Transient(
            "certificate has no validation options yet".to_string(),
        ));
    }

    let mut challenges = Vec::with_capacity(options.len());
    for option in options {
        match option.validation_method() {
            Some(AcmValidationMethod::Dns) => {
                let challenge = published_challenge(option).ok_or_else(|| {
                    RegistryError::Transient(format!(
                        "DNS validation record for '{}' not published yet",
                        option.domain_name()
                    ))
                })?;
                challenges.push(challenge);
            }
            Some(_) => challenges.push(ValidationChallenge {
                record_name: option.domain_name().to_string(),
                record_type: String::new(),
                record_value: String::new(),
                method: ValidationMethod::Email,
            }),
            None => {
                return Err(RegistryError::Transient(format!(
                    "validation method for '{}' not assigned yet",
                    option.domain_name()
                )));
            }
        }
    }
    Ok(challenges)
}

fn published_challenge(option: &DomainValidation) -> Option<ValidationChallenge> {
    if option.validation_method() != Some(&AcmValidationMethod::Dns) {
        return None;
    }
    let record = option.resource_record()?;
    Some(ValidationChallenge::dns(
        record.name(),
        record.r#type().as_str(),
        record.value(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_acm::types::{RecordType, ResourceRecord as AcmResourceRecord};

    fn dns_option(status: DomainStatus, with_record: bool) -> DomainValidation {
        let mut builder = DomainValidation::builder()
            .domain_name("example.test")
            .validation_method(AcmValidationMethod::Dns)
            .validation_status(status);
        if with_record {
            builder = builder.resource_record(
                AcmResourceRecord::builder()
                    .name("_acme.example.test")
                    .r#type(RecordType::Cname)
                    .value("abc.acm-validations.aws.")
                    .build()
                    .unwrap(),
            );
        }
        builder.build().unwrap()
    }

    #[test]
    fn throttling_codes_are_transient() {
        assert!(is_throttling_code("ThrottlingException"));
        assert!(is_throttling_code("PriorRequestNotComplete"));
        assert!(!is_throttling_code("AccessDeniedException"));
    }

    #[test]
    fn invalidation_status_parsing() {
        assert_eq!(invalidation_status("Completed"), InvalidationStatus::Completed);
        assert_eq!(invalidation_status("InProgress"), InvalidationStatus::InProgress);
    }

    #[test]
    fn issued_certificate_is_success_regardless_of_options() {
        let options = vec![dns_option(DomainStatus::PendingValidation, true)];
        assert_eq!(
            overall_status(Some(&CertificateStatus::Issued), &options),
            ValidationStatus::Success
        );
    }

    #[test]
    fn failed_option_fails_certificate() {
        let options = vec![
            dns_option(DomainStatus::Success, true),
            dns_option(DomainStatus::Failed, true),
        ];
        assert_eq!(
            overall_status(Some(&CertificateStatus::PendingValidation), &options),
            ValidationStatus::Failed
        );
        assert_eq!(
            overall_status(Some(&CertificateStatus::ValidationTimedOut), &[]),
            ValidationStatus::Failed
        );
    }

    #[test]
    fn all_successful_options_are_success() {
        let options = vec![dns_option(DomainStatus::Success, true)];
        assert_eq!(overall_status(None, &options), ValidationStatus::Success);
        assert_eq!(overall_status(None, &[]), ValidationStatus::PendingValidation);
    }

    #[test]
    fn pending_option_yields_dns_challenge() {
        let options = vec![dns_option(DomainStatus::PendingValidation, true)];
        let challenges = pending_challenges(&options).unwrap();
        assert_eq!(
            challenges,
            vec![ValidationChallenge::dns(
                "_acme.example.test",
                "CNAME",
                "abc.acm-validations.aws."
            )]
        );
    }

    #[test]
    fn unpublished_record_is_transient() {
        let options = vec![dns_option(DomainStatus::PendingValidation, false)];
        assert!(matches!(
            pending_challenges(&options),
            Err(RegistryError::Transient(_))
        ));
        assert!(matches!(pending_challenges(&[]), Err(RegistryError::Transient(_))));
    }

    #[test]
    fn email_option_is_reported_as_email_challenge() {
        let option = DomainValidation::builder()
            .domain_name("example.test")
            .validation_method(AcmValidationMethod::Email)
            .validation_status(DomainStatus::PendingValidation)
            .build()
            .unwrap();
        let challenges = pending_challenges(&[option]).unwrap();
        assert_eq!(challenges[0].method, ValidationMethod::Email);
    }
}
