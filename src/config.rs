//! User configuration
//!
//! Settings are read from `config.toml` under the platform config home,
//! then overridden by `PERFANA_*` environment variables, then by CLI flags.

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::metrics::Period;
use crate::pricing::RetryPolicy;

pub const ENV_OFFLINE_DIR: &str = "PERFANA_OFFLINE_PRICES_DIR";
pub const ENV_BENCHMARK: &str = "PERFANA_BENCHMARK";
pub const ENV_NO_CACHE: &str = "PERFANA_NO_CACHE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub benchmark: String,
    pub full_shares: bool,
    pub risk_free_rate: Decimal,
    pub calmar_window: String,
    pub rolling_window: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    /// Read prices from CSV files in this directory instead of the network
    pub offline_prices_dir: Option<PathBuf>,
    pub cache_db: Option<PathBuf>,
    pub no_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            benchmark: "SPY".to_string(),
            full_shares: false,
            risk_free_rate: Decimal::ZERO,
            calmar_window: "3y".to_string(),
            rolling_window: "1y".to_string(),
            request_timeout_secs: 15,
            max_retries: 3,
            offline_prices_dir: None,
            cache_db: None,
            no_cache: false,
        }
    }
}

/// Location of `config.toml`
pub fn config_path() -> Result<PathBuf> {
    let config_dir =
        dir_spec::config_home().ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(config_dir.join("perfana").join("config.toml"))
}

impl Config {
    /// Load the user's configuration with environment overrides applied
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            debug!("No config file at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_env(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PERFANA_*` overrides from `vars`
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let value = value.trim();
            match key.as_str() {
                ENV_OFFLINE_DIR if !value.is_empty() => {
                    self.offline_prices_dir = Some(PathBuf::from(value));
                }
                ENV_BENCHMARK if !value.is_empty() => self.benchmark = value.to_uppercase(),
                ENV_NO_CACHE => {
                    self.no_cache = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes");
                }
                _ => {}
            }
        }
    }

    fn validate(&self) -> Result<()> {
        self.calmar_period()?;
        self.rolling_period()?;
        if self.benchmark.trim().is_empty() {
            return Err(anyhow!("benchmark must not be empty"));
        }
        Ok(())
    }

    pub fn calmar_period(&self) -> Result<Period> {
        self.calmar_window
            .parse()
            .map_err(|e: String| anyhow!("calmar_window: {}", e))
    }

    pub fn rolling_period(&self) -> Result<Period> {
        self.rolling_window
            .parse()
            .map_err(|e: String| anyhow!("rolling_window: {}", e))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.request_timeout_secs, self.max_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.benchmark, "SPY");
        assert_eq!(config.calmar_period().unwrap(), Period::ThreeYears);
        assert_eq!(config.rolling_period().unwrap(), Period::OneYear);
        assert_eq!(config.retry_policy().timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse("benchmark = \"QQQ\"\nrisk_free_rate = 0.0001\n").unwrap();
        assert_eq!(config.benchmark, "QQQ");
        assert_eq!(config.risk_free_rate, dec!(0.0001));
        assert_eq!(config.max_retries, 3);
        assert!(!config.full_shares);
    }

    #[test]
    fn test_invalid_window_is_rejected() {
        let err = Config::parse("rolling_window = \"2w\"\n").unwrap_err();
        assert!(format!("{:#}", err).contains("rolling_window"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(vec![
            (ENV_BENCHMARK.to_string(), "vti".to_string()),
            (ENV_OFFLINE_DIR.to_string(), "/tmp/prices".to_string()),
            (ENV_NO_CACHE.to_string(), "1".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ]);
        assert_eq!(config.benchmark, "VTI");
        assert_eq!(config.offline_prices_dir, Some(PathBuf::from("/tmp/prices")));
        assert!(config.no_cache);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "full_shares = true\ncalmar_window = \"5y\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert!(config.full_shares);
        assert_eq!(config.calmar_period().unwrap(), Period::FiveYears);
    }
}
