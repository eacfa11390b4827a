pub mod error;
pub mod types;

pub use error::{DeployError, RegistryError, Result};
pub use types::*;
