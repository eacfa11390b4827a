use std::process::ExitCode;

use anyhow::{Context, Result};

use radiator_deploy::config::DeployConfig;
use radiator_deploy::init_logging;
use radiator_deploy::issuance::CertificateProvisioner;
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

    let provisioner = CertificateProvisioner::new(&registry, config.provision);
    let report = provisioner.provision(&config.hostname, &config.domain_name)?;

    // Downstream stack deployment reads the certificate ARN from stdout.
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
