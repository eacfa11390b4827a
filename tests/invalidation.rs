use std::time::Duration;

use radiator_deploy::distribution::{
    CacheInvalidator, DEFAULT_INVALIDATION_PATHS, InvalidationSettings,
};
use radiator_deploy::model::DeployError;
use radiator_deploy::registry::{MemoryRegistry, RegistryCall};
use radiator_deploy::retry::{PollPolicy, RetryPolicy};

fn fast_settings() -> InvalidationSettings {
    InvalidationSettings {
        lookup: RetryPolicy::new(3, Duration::from_millis(5)),
        completion: PollPolicy::new(Duration::from_millis(5), Duration::from_secs(1)),
    }
}

fn default_paths() -> Vec<String> {
    DEFAULT_INVALIDATION_PATHS
        .iter()
        .map(|path| path.to_string())
        .collect()
}

#[test]
fn invalidates_distribution_found_by_alias() {
    let registry = MemoryRegistry::new()
        .with_distribution("E1STAGING", &["staging.example.test"])
        .with_distribution("E2RADIATOR", &["radiator.example.test"])
        .with_distribution("E3", &[])
        .with_invalidation_polls(2);
    let invalidator = CacheInvalidator::new(&registry, fast_settings());

    let report = invalidator
        .invalidate_and_wait("radiator.example.test", &default_paths())
        .expect("invalidation should complete");

    assert_eq!(report.distribution_id, "E2RADIATOR");
    assert_eq!(report.paths, vec!["/", "/index.html"]);

    let submitted = registry.invalidations();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].distribution_id, "E2RADIATOR");
    assert_eq!(submitted[0].caller_reference, report.caller_reference);
    assert_eq!(registry.call_count(RegistryCall::PollInvalidation), 3);
}

#[test]
fn unknown_alias_fails_without_submitting() {
    let registry = MemoryRegistry::new()
        .with_distribution("E1", &["staging.example.test"])
        .with_distribution("E2", &["www.example.test"]);
    let invalidator = CacheInvalidator::new(&registry, fast_settings());

    let err = invalidator
        .invalidate_and_wait("radiator.example.test", &default_paths())
        .unwrap_err();

    assert!(matches!(err, DeployError::Config(_)));
    assert!(err.to_string().contains("radiator.example.test"));
    assert!(registry.invalidations().is_empty());
}

#[test]
fn throttled_polls_do_not_abort_the_wait() {
    let registry = MemoryRegistry::new()
        .with_distribution("E1", &["radiator.example.test"])
        .with_transient_failures(RegistryCall::PollInvalidation, 2);
    let invalidator = CacheInvalidator::new(&registry, fast_settings());

    invalidator
        .invalidate_and_wait("radiator.example.test", &default_paths())
        .unwrap();

    assert_eq!(registry.call_count(RegistryCall::PollInvalidation), 3);
}

#[test]
fn throttled_submission_keeps_one_caller_reference() {
    let registry = MemoryRegistry::new()
        .with_distribution("E1", &["radiator.example.test"])
        .with_transient_failures(RegistryCall::InvalidateDistribution, 2);
    let invalidator = CacheInvalidator::new(&registry, fast_settings());

    let report = invalidator
        .invalidate_and_wait("radiator.example.test", &default_paths())
        .unwrap();

    let submissions = registry.submissions();
    assert_eq!(submissions.len(), 3);
    assert!(submissions.iter().all(|submission| {
        submission.distribution_id == "E1"
            && submission.caller_reference == report.caller_reference
    }));
    assert!(report.caller_reference.starts_with("deployment"));
    assert_eq!(registry.invalidations().len(), 1);
}
