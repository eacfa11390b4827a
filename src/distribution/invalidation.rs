use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::model::{DeployError, DistributionRef, InvalidationStatus, Result};
use crate::registry::Registry;
use crate::retry::{PollPolicy, RetryPolicy, retry_transient, wait_until};

/// Paths purged after a static asset deployment.
pub const DEFAULT_INVALIDATION_PATHS: &[&str] = &["/", "/index.html"];

const CALLER_REFERENCE_PREFIX: &str = "deployment";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationSettings {
    pub lookup: RetryPolicy,
    pub completion: PollPolicy,
}

impl Default for InvalidationSettings {
    fn default() -> Self {
        Self {
            lookup: RetryPolicy::new(5, Duration::from_secs(2)),
            completion: PollPolicy::new(Duration::from_secs(20), Duration::from_secs(10 * 60)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub distribution_id: String,
    pub invalidation_id: String,
    pub caller_reference: String,
    pub paths: Vec<String>,
}

/// Freshness token for an invalidation batch. Unique per millisecond, which
/// is enough for human-triggered deployments.
pub fn caller_reference(now: DateTime<Utc>) -> String {
    format!("{CALLER_REFERENCE_PREFIX}{}", now.timestamp_millis())
}

/// Purges edge-cached paths and blocks until the CDN reports completion.
pub struct CacheInvalidator<'a> {
    registry: &'a dyn Registry,
    settings: InvalidationSettings,
}

impl<'a> CacheInvalidator<'a> {
    pub fn new(registry: &'a dyn Registry, settings: InvalidationSettings) -> Self {
        Self { registry, settings }
    }

    /// First distribution in provider order whose alias list contains
    /// `alias` exactly. The distribution must already exist.
    pub fn find_distribution(&self, alias: &str) -> Result<DistributionRef> {
        let distributions = retry_transient("distribution lookup", self.settings.lookup, || {
            Ok(self.registry.list_distributions()?)
        })?;
        let mut matching = distributions
            .into_iter()
            .filter(|distribution| distribution.has_alias(alias));

        let found = matching.next().ok_or_else(|| {
            DeployError::Config(format!("no distribution has the alias '{alias}'"))
        })?;
        if matching.next().is_some() {
            warn!(
                "[invalidation] several distributions alias '{}', using the first listed ({})",
                alias, found.id
            );
        }
        Ok(found)
    }

    pub fn invalidate_and_wait(&self, alias: &str, paths: &[String]) -> Result<InvalidationReport> {
        let distribution = self.find_distribution(alias)?;
        debug!("[invalidation] '{}' is served by {}", alias, distribution.id);
        self.invalidate_distribution_and_wait(&distribution.id, paths)
    }

    pub fn invalidate_distribution_and_wait(
        &self,
        distribution_id: &str,
        paths: &[String],
    ) -> Result<InvalidationReport> {
        if paths.is_empty() {
            return Err(DeployError::Config(
                "at least one path is required for invalidation".to_string(),
            ));
        }

        let reference = caller_reference(Utc::now());
        info!(
            "[invalidation] Invalidating {} path(s) on {} to update static assets",
            paths.len(),
            distribution_id
        );
        // Resubmitting the same caller reference returns the existing batch.
        let request = retry_transient("invalidation request", self.settings.lookup, || {
            Ok(self
                .registry
                .invalidate_distribution(distribution_id, paths, &reference)?)
        })?;

        info!("[invalidation] Waiting for invalidation {} to complete", request.id);
        wait_until(
            "cache invalidation",
            distribution_id,
            self.settings.completion,
            || {
                let result = self.registry.poll_invalidation(distribution_id, &request.id)?;
                Ok((result.status == InvalidationStatus::Completed).then_some(()))
            },
        )?;
        info!("[invalidation] Cache invalidated on {}", distribution_id);

        Ok(InvalidationReport {
            distribution_id: request.distribution_id,
            invalidation_id: request.id,
            caller_reference: request.caller_reference,
            paths: request.paths,
        })
    }
}
