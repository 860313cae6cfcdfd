use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::{Error, Result};

const ENV_MAX_CONCURRENCY: &str = "TASKWEAVE_MAX_CONCURRENCY";
const ENV_MAX_RETRIES: &str = "TASKWEAVE_MAX_RETRIES";
const ENV_MAX_ATTEMPTS: &str = "TASKWEAVE_MAX_ATTEMPTS";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
}

/// Scheduling limits for a single orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Upper bound on simultaneously running items.
    pub max_concurrency: usize,
    /// Retry round triggers once more than this many failed items can still be retried.
    pub max_retries: usize,
    /// Per-item dispatch ceiling, the first attempt included.
    pub max_attempts: u32,
    /// Optional per-item timeout in milliseconds, applied by `Orchestrator::from_config`.
    pub item_timeout_ms: Option<u64>,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            max_retries: 3,
            max_attempts: 2,
            item_timeout_ms: None,
        }
    }
}

impl OrchestrationConfig {
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_max_retries(mut self, max: usize) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn item_timeout(&self) -> Option<Duration> {
        self.item_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.item_timeout_ms == Some(0) {
            return Err(Error::InvalidConfig(
                "item_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn home_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".taskweave"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::home_dir()?.join("taskweave.toml"))
    }

    /// Load `~/.taskweave/taskweave.toml`, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env_overrides()?;
        config.orchestration.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        debug!(
            max_concurrency = config.orchestration.max_concurrency,
            max_retries = config.orchestration.max_retries,
            max_attempts = config.orchestration.max_attempts,
            "config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::home_dir()?;
        if !dir.exists() {
            debug!(dir = %dir.display(), "creating config directory");
            fs::create_dir_all(&dir)?;
        }
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let orch = &mut self.orchestration;
        if let Some(v) = lookup(ENV_MAX_CONCURRENCY) {
            orch.max_concurrency = parse_env(ENV_MAX_CONCURRENCY, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_RETRIES) {
            orch.max_retries = parse_env(ENV_MAX_RETRIES, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_ATTEMPTS) {
            orch.max_attempts = parse_env(ENV_MAX_ATTEMPTS, &v)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{}={:?} is not a valid number", key, value)))
}
