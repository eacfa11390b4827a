use std::time::Duration;

use log::warn;

use crate::distribution::InvalidationSettings;
use crate::domain::{hostname_for, normalize_domain};
use crate::issuance::ProvisionSettings;
use crate::model::{DeployError, Result};
use crate::retry::{PollPolicy, RetryPolicy};

pub const DOMAIN_NAME_VAR: &str = "DOMAIN_NAME";
pub const SUBDOMAIN_VAR: &str = "RADIATOR_SUBDOMAIN";
pub const TOKEN_GENERATION_VAR: &str = "RADIATOR_TOKEN_GENERATION";
pub const CERTIFICATE_REGION_VAR: &str = "RADIATOR_CERTIFICATE_REGION";
pub const VALIDATION_TIMEOUT_VAR: &str = "RADIATOR_VALIDATION_TIMEOUT_SECS";
pub const VALIDATION_INTERVAL_VAR: &str = "RADIATOR_VALIDATION_INTERVAL_SECS";
pub const INVALIDATION_TIMEOUT_VAR: &str = "RADIATOR_INVALIDATION_TIMEOUT_SECS";
pub const INVALIDATION_INTERVAL_VAR: &str = "RADIATOR_INVALIDATION_INTERVAL_SECS";
pub const LOOKUP_ATTEMPTS_VAR: &str = "RADIATOR_LOOKUP_ATTEMPTS";
pub const LOOKUP_DELAY_VAR: &str = "RADIATOR_LOOKUP_DELAY_MS";

const DEFAULT_SUBDOMAIN: &str = "radiator";
const DEFAULT_CERTIFICATE_REGION: &str = "us-east-1";

/// Everything a deployment run needs, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
    /// Root domain; its hosted zone receives the validation record.
    pub domain_name: String,
    /// Host the certificate is issued for and the CDN alias.
    pub hostname: String,
    pub certificate_region: String,
    pub provision: ProvisionSettings,
    pub invalidation: InvalidationSettings,
}

impl DeployConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`. Fails before anything else if
    /// the domain name is missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_domain = lookup(DOMAIN_NAME_VAR)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                DeployError::Config(format!("environment variable '{DOMAIN_NAME_VAR}' is missing"))
            })?;
        let domain_name = normalize_domain(&raw_domain)?;

        let subdomain = lookup(SUBDOMAIN_VAR).unwrap_or_else(|| DEFAULT_SUBDOMAIN.to_string());
        let hostname = normalize_domain(&hostname_for(&subdomain, &domain_name))?;

        let certificate_region = lookup(CERTIFICATE_REGION_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CERTIFICATE_REGION.to_string());

        let provision_defaults = ProvisionSettings::default();
        let invalidation_defaults = InvalidationSettings::default();

        let lookup_policy = RetryPolicy::new(
            positive(&lookup, LOOKUP_ATTEMPTS_VAR, provision_defaults.lookup.attempts.into()) as u32,
            Duration::from_millis(positive(
                &lookup,
                LOOKUP_DELAY_VAR,
                provision_defaults.lookup.delay.as_millis() as u64,
            )),
        );

        let provision = ProvisionSettings {
            token_generation: positive(
                &lookup,
                TOKEN_GENERATION_VAR,
                provision_defaults.token_generation.into(),
            ) as u32,
            lookup: lookup_policy,
            validation: PollPolicy::new(
                seconds(&lookup, VALIDATION_INTERVAL_VAR, provision_defaults.validation.interval),
                seconds(&lookup, VALIDATION_TIMEOUT_VAR, provision_defaults.validation.timeout),
            ),
        };

        let invalidation = InvalidationSettings {
            lookup: lookup_policy,
            completion: PollPolicy::new(
                seconds(&lookup, INVALIDATION_INTERVAL_VAR, invalidation_defaults.completion.interval),
                seconds(&lookup, INVALIDATION_TIMEOUT_VAR, invalidation_defaults.completion.timeout),
            ),
        };

        Ok(Self {
            domain_name,
            hostname,
            certificate_region,
            provision,
            invalidation,
        })
    }
}

fn seconds<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_secs(positive(lookup, key, default.as_secs()))
}

/// Parses a positive integer, falling back to `default` when unset or invalid.
fn positive<F>(lookup: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<u32>() {
        Ok(value) if value > 0 => value.into(),
        _ => {
            warn!("[config] invalid value '{raw}' for {key}; using default {default}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<DeployConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DeployConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn missing_domain_is_configuration_error() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
        assert!(err.to_string().contains("DOMAIN_NAME"));

        let err = config_from(&[(DOMAIN_NAME_VAR, "   ")]).unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[(DOMAIN_NAME_VAR, "Example.Test.")]).unwrap();
        assert_eq!(config.domain_name, "example.test");
        assert_eq!(config.hostname, "radiator.example.test");
        assert_eq!(config.certificate_region, "us-east-1");
        assert_eq!(config.provision, ProvisionSettings::default());
        assert_eq!(config.invalidation, InvalidationSettings::default());
    }

    #[test]
    fn empty_subdomain_targets_apex() {
        let config = config_from(&[(DOMAIN_NAME_VAR, "example.test"), (SUBDOMAIN_VAR, "")]).unwrap();
        assert_eq!(config.hostname, "example.test");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            (DOMAIN_NAME_VAR, "example.test"),
            (TOKEN_GENERATION_VAR, "4"),
            (VALIDATION_INTERVAL_VAR, "10"),
            (VALIDATION_TIMEOUT_VAR, "120"),
            (LOOKUP_ATTEMPTS_VAR, "7"),
            (LOOKUP_DELAY_VAR, "250"),
            (CERTIFICATE_REGION_VAR, "eu-north-1"),
        ])
        .unwrap();
        assert_eq!(config.provision.token_generation, 4);
        assert_eq!(config.provision.validation.interval, Duration::from_secs(10));
        assert_eq!(config.provision.validation.timeout, Duration::from_secs(120));
        assert_eq!(config.provision.lookup.attempts, 7);
        assert_eq!(config.invalidation.lookup.delay, Duration::from_millis(250));
        assert_eq!(config.certificate_region, "eu-north-1");
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            (DOMAIN_NAME_VAR, "example.test"),
            (VALIDATION_TIMEOUT_VAR, "0"),
            (INVALIDATION_INTERVAL_VAR, "soon"),
        ])
        .unwrap();
        assert_eq!(config.provision.validation.timeout, Duration::from_secs(2400));
        assert_eq!(config.invalidation.completion.interval, Duration::from_secs(20));
    }
}
