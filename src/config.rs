//! xectl configuration
//!
//! Read from `config.toml` in the config directory. Every field has a
//! default, so a missing file or an empty one is a valid configuration.
//!
//! ```toml
//! xe_path = "/opt/xensource/bin/xe"
//! timeout_seconds = 600
//! max_retries = 3
//! cache_lookups = true
//!
//! [backoff]
//! base_seconds = 2
//! factor = 2.0
//! max_seconds = 60
//! ```

use anyhow::{Context, Result, bail};
use reconcile::EngineOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use xekit::RetryConfig;
use xekit::executor::process::ProcessExecutor;

use crate::paths;

/// Longest accepted per-invocation timeout (one week)
const MAX_TIMEOUT_SECONDS: u64 = 7 * 24 * 60 * 60;
/// Longest accepted backoff delay (one hour)
const MAX_BACKOFF_SECONDS: f64 = 3600.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// xe binary to run; discovered when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xe_path: Option<String>,
    /// Per-invocation timeout
    pub timeout_seconds: u64,
    /// Attempts per idempotent step, including the first
    pub max_retries: u32,
    /// Reuse SR lookups within one plan run
    pub cache_lookups: bool,
    pub backoff: Backoff,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Backoff {
    pub base_seconds: f64,
    pub factor: f64,
    pub max_seconds: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            xe_path: None,
            timeout_seconds: xekit::DEFAULT_TIMEOUT.as_secs(),
            max_retries: 3,
            cache_lookups: true,
            backoff: Backoff::default(),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_seconds: 2.0,
            factor: 2.0,
            max_seconds: 60.0,
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist
    pub fn load() -> Result<Self> {
        let path = paths::config_file()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_seconds == 0 {
            bail!("timeout_seconds must be greater than zero");
        }
        if self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            bail!("timeout_seconds must be at most {MAX_TIMEOUT_SECONDS}");
        }
        if self.max_retries == 0 {
            bail!("max_retries must be at least 1");
        }
        let Backoff {
            base_seconds,
            factor,
            max_seconds,
        } = self.backoff;
        let in_range = |secs: f64| (0.0..=MAX_BACKOFF_SECONDS).contains(&secs);
        if !(in_range(base_seconds) && in_range(max_seconds)) {
            bail!("backoff base_seconds and max_seconds must be between 0 and {MAX_BACKOFF_SECONDS}");
        }
        if !(factor.is_finite() && factor >= 1.0) {
            bail!("backoff factor must be a finite number >= 1");
        }
        Ok(())
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, xe: Option<&str>, timeout_seconds: Option<u64>) -> Self {
        if let Some(xe) = xe {
            self.xe_path = Some(xe.to_string());
        }
        if let Some(timeout) = timeout_seconds {
            self.timeout_seconds = timeout;
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry(&self) -> Result<RetryConfig> {
        let delay = |name: &str, secs: f64| {
            Duration::try_from_secs_f64(secs)
                .with_context(|| format!("Invalid backoff {name}: {secs}"))
        };
        Ok(RetryConfig {
            max_attempts: self.max_retries.max(1),
            base_delay: delay("base_seconds", self.backoff.base_seconds)?,
            backoff_factor: self.backoff.factor,
            max_delay: delay("max_seconds", self.backoff.max_seconds)?,
        })
    }

    pub fn engine_options(&self, dry_run: bool) -> Result<EngineOptions> {
        Ok(EngineOptions {
            retry: self.retry()?,
            cache_lookups: self.cache_lookups,
            dry_run,
        })
    }

    /// Build an xe client from this configuration
    pub fn client(&self) -> Result<xekit::Client> {
        let executor = match &self.xe_path {
            Some(path) => ProcessExecutor::new(paths::expand(path)),
            None => ProcessExecutor::find()
                .context("Could not locate the xe binary (set xe_path or pass --xe)")?,
        };
        Ok(xekit::Client::with_executor(Box::new(executor)).with_timeout(self.timeout()))
    }

    /// Resolved xe path, if configured
    pub fn xe_path(&self) -> Option<PathBuf> {
        self.xe_path.as_deref().map(paths::expand)
    }
}
