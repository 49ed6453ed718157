//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Initial credential secrets come from the KEYPOOL_KEYS env var or
//! keys_file, never from the TOML itself.

use common::Secret;
use keypool::{EndpointStrategy, SwitchStrategy};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub pool: PoolConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    pub admin: AdminConfig,
}

/// Pool behaviour and persistence
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    /// Overrides the persisted switch strategy when set.
    #[serde(default)]
    pub strategy: Option<SwitchStrategy>,
    /// Overrides the persisted endpoint strategy when set.
    #[serde(default)]
    pub endpoint_strategy: Option<EndpointStrategy>,
    pub store_path: PathBuf,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Used while no endpoint has been added.
    pub default_endpoint: String,
    /// Endpoints added at startup if not already present.
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// File with one secret per line (alternative to KEYPOOL_KEYS)
    #[serde(default)]
    pub keys_file: Option<PathBuf>,
    #[serde(skip)]
    pub keys: Vec<Secret<String>>,
}

/// Usage-query transport
#[derive(Debug, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_usage_url")]
    pub usage_url: String,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            usage_url: default_usage_url(),
        }
    }
}

/// Admin HTTP listener
#[derive(Debug, Deserialize)]
pub struct AdminConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_refresh_interval() -> u64 {
    keypool::DEFAULT_REFRESH_INTERVAL.as_secs()
}

fn default_probe_timeout() -> u64 {
    keypool::DEFAULT_PROBE_TIMEOUT.as_secs()
}

fn default_usage_url() -> String {
    probe::http::DEFAULT_USAGE_URL.to_string()
}

fn default_max_connections() -> usize {
    1000
}

fn validate_url(field: &str, url: &str) -> common::Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {url}"
        )));
    }
    Ok(())
}

/// Split secrets on `separator`, dropping blanks.
fn parse_keys(raw: &str, separator: char) -> Vec<Secret<String>> {
    raw.split(separator)
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(|key| Secret::new(key.to_owned()))
        .collect()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Key resolution order:
    /// 1. KEYPOOL_KEYS env var (comma separated)
    /// 2. keys_file path from config (one per line)
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        validate_url("default_endpoint", &config.pool.default_endpoint)?;
        for endpoint in &config.pool.endpoints {
            validate_url("endpoints", endpoint)?;
        }
        validate_url("usage_url", &config.quota.usage_url)?;

        if config.pool.refresh_interval_secs == 0 {
            return Err(common::Error::Config(
                "refresh_interval_secs must be greater than 0".into(),
            ));
        }
        if config.pool.probe_timeout_secs == 0 {
            return Err(common::Error::Config(
                "probe_timeout_secs must be greater than 0".into(),
            ));
        }
        if config.admin.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if let Ok(keys) = std::env::var("KEYPOOL_KEYS") {
            config.pool.keys = parse_keys(&keys, ',');
        } else if let Some(ref keys_file) = config.pool.keys_file {
            let keys = std::fs::read_to_string(keys_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read keys_file {}: {e}",
                    keys_file.display()
                ))
            })?;
            config.pool.keys = parse_keys(&keys, '\n');
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("keypool.toml")
    }
}

impl PoolConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}
