//! Configuration system for boostgate.
//!
//! One YAML file (explicit path, `.boostgate.yml`, or
//! `~/.config/boostgate/boostgate.yml`) overlaid with environment variables.
//! Tier resolution maps client-facing model names onto executor models.

use std::path::PathBuf;

use eyre::Result;

pub use self::gateway::{
    BoostConfig, DEFAULT_BOOST_MODEL, DEFAULT_EXECUTOR_URL, DEFAULT_MAX_ITERATIONS, DEFAULT_TIMEOUT_MS,
    ExecutorConfig, GatewayConfig,
};
pub use self::tier::{Tier, TierModels};

mod gateway;
mod tier;

/// Load and validate configuration from the standard search paths.
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<GatewayConfig> {
    let config = GatewayConfig::load(explicit_path)?;
    config.validate()?;
    Ok(config)
}
