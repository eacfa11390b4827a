use std::process::ExitCode;

use anyhow::{Context, Result};

use radiator_deploy::config::DeployConfig;
use radiator_deploy::distribution::{CacheInvalidator, DEFAULT_INVALIDATION_PATHS};
use radiator_deploy::init_logging;
use radiator_deploy::registry::AwsRegistry;

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config = DeployConfig::from_env()?;
    let registry =
        AwsRegistry::connect(&config.certificate_region).context("Failed to set up AWS clients")?;

    let paths: Vec<String> = DEFAULT_INVALIDATION_PATHS
        .iter()
        .map(|path| path.to_string())
        .collect();
    let invalidator = CacheInvalidator::new(&registry, config.invalidation);
    let report = invalidator.invalidate_and_wait(&config.hostname, &paths)?;

    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
