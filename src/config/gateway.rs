//! Gateway configuration.
//!
//! Loaded from an explicit path, `.boostgate.yml`, or
//! `~/.config/boostgate/boostgate.yml`, then overlaid with environment
//! variables. Read-only once handed to the orchestrator.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use super::tier::{Tier, TierModels};
use crate::boost::wrapper::WrapperTemplate;

/// Default planning model
pub const DEFAULT_BOOST_MODEL: &str = "gpt-4o";

/// Default executor endpoint
pub const DEFAULT_EXECUTOR_URL: &str = "https://api.openai.com/v1";

/// Default planning attempts per request
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Default per-call timeout (90 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 90_000;

const REDACTED: &str = "********";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Log filter when RUST_LOG is unset.
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Planning (boost) model settings.
    pub boost: BoostConfig,

    /// Tool-capable executor settings.
    pub executor: ExecutorConfig,
}

/// Planning endpoint settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BoostConfig {
    /// Tiers that go through the planning loop.
    pub enabled_tiers: Vec<Tier>,

    pub base_url: Option<String>,

    pub api_key: Option<String>,

    pub model: String,

    /// Custom wrapper template; blank means built-in.
    pub wrapper_template: Option<String>,

    /// Hard cap on planning attempts per request.
    pub max_iterations: u32,

    /// Timeout per planning call in milliseconds.
    pub timeout_ms: u64,

    /// Reuse planning replies for identical prompts.
    pub cache: bool,

    pub max_tokens: u32,

    pub temperature: f32,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            enabled_tiers: Vec::new(),
            base_url: None,
            api_key: None,
            model: DEFAULT_BOOST_MODEL.to_string(),
            wrapper_template: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            cache: true,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Executor endpoint settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExecutorConfig {
    pub base_url: String,

    pub api_key: Option<String>,

    /// Model used for each tier.
    pub models: TierModels,

    /// Timeout per executor call in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EXECUTOR_URL.to_string(),
            api_key: None,
            models: TierModels::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl GatewayConfig {
    /// Load configuration with fallback chain, then apply environment overrides.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .boostgate.yml in current directory
    /// 3. ~/.config/boostgate/boostgate.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path takes precedence
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".boostgate.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .boostgate.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .boostgate.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("boostgate").join("boostgate.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Overlay environment variables; `lookup` is `std::env::var` outside of tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ENABLE_BOOST_SUPPORT") {
            self.boost.enabled_tiers = parse_enabled_tiers(&value)?;
        }
        if let Some(value) = lookup("BOOST_BASE_URL") {
            self.boost.base_url = Some(value);
        }
        if let Some(value) = lookup("BOOST_API_KEY") {
            self.boost.api_key = Some(value);
        }
        if let Some(value) = lookup("BOOST_MODEL") {
            self.boost.model = value;
        }
        if let Some(value) = lookup("BOOST_WRAPPER_TEMPLATE") {
            self.boost.wrapper_template = Some(value);
        }
        if let Some(value) = lookup("BOOST_MAX_ITERATIONS") {
            self.boost.max_iterations = value
                .trim()
                .parse()
                .context(format!("BOOST_MAX_ITERATIONS must be a number, got '{}'", value))?;
        }
        if let Some(value) = lookup("BOOST_TIMEOUT_MS") {
            self.boost.timeout_ms = value
                .trim()
                .parse()
                .context(format!("BOOST_TIMEOUT_MS must be a number, got '{}'", value))?;
        }
        if let Some(value) = lookup("OPENAI_BASE_URL") {
            self.executor.base_url = value;
        }
        if let Some(value) = lookup("OPENAI_API_KEY") {
            self.executor.api_key = Some(value);
        }
        if let Some(value) = lookup("BIG_MODEL") {
            self.executor.models.big = value;
        }
        if let Some(value) = lookup("MIDDLE_MODEL") {
            self.executor.models.middle = Some(value);
        }
        if let Some(value) = lookup("SMALL_MODEL") {
            self.executor.models.small = value;
        }
        if let Some(value) = lookup("REQUEST_TIMEOUT") {
            let secs: u64 = value
                .trim()
                .parse()
                .context(format!("REQUEST_TIMEOUT must be a number of seconds, got '{}'", value))?;
            self.executor.timeout_ms = secs * 1000;
        }
        if let Some(value) = lookup("LOG_LEVEL") {
            self.log_level = Some(value.to_lowercase());
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.boost.max_iterations == 0 {
            eyre::bail!("boost.max-iterations must be > 0");
        }
        if self.boost.timeout_ms == 0 || self.executor.timeout_ms == 0 {
            eyre::bail!("timeouts must be > 0");
        }
        if !self.boost.enabled_tiers.is_empty() {
            if self.boost.base_url.as_deref().is_none_or(|s| s.trim().is_empty()) {
                eyre::bail!("boost.base-url (BOOST_BASE_URL) is required when boost is enabled");
            }
            if self.boost.api_key.as_deref().is_none_or(|s| s.trim().is_empty()) {
                eyre::bail!("boost.api-key (BOOST_API_KEY) is required when boost is enabled");
            }
        }
        WrapperTemplate::from_config(self.boost.wrapper_template.as_deref())?;
        Ok(())
    }

    pub fn is_boost_enabled(&self, tier: Tier) -> bool {
        self.boost.enabled_tiers.contains(&tier)
    }

    pub fn executor_model(&self, tier: Tier) -> &str {
        self.executor.models.for_tier(tier)
    }

    pub fn planning_timeout(&self) -> Duration {
        Duration::from_millis(self.boost.timeout_ms)
    }

    pub fn executor_timeout(&self) -> Duration {
        Duration::from_millis(self.executor.timeout_ms)
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.boost.api_key.is_some() {
            copy.boost.api_key = Some(REDACTED.to_string());
        }
        if copy.executor.api_key.is_some() {
            copy.executor.api_key = Some(REDACTED.to_string());
        }
        copy
    }
}

/// Parse `ENABLE_BOOST_SUPPORT`: `NONE` or a comma list of tier names.
fn parse_enabled_tiers(value: &str) -> Result<Vec<Tier>> {
    let mut tiers = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if part.eq_ignore_ascii_case("NONE") {
            continue;
        }
        let tier: Tier = part
            .parse()
            .map_err(|e| eyre::eyre!("ENABLE_BOOST_SUPPORT must be NONE or tier names: {}", e))?;
        if !tiers.contains(&tier) {
            tiers.push(tier);
        }
    }
    Ok(tiers)
}
