//! Prepares the public HTTPS endpoint of the radiator dashboard: provisions
//! and DNS-validates its certificate, and purges the edge cache after a
//! static asset deployment.

pub mod config;
pub mod distribution;
pub mod domain;
pub mod issuance;
pub mod model;
pub mod registry;
pub mod retry;

/// Installs the `env_logger` backend; `RUST_LOG` overrides the `info` default.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();
}
