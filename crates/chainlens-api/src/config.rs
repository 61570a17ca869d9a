//! API server configuration.

use serde::Deserialize;
use std::time::Duration;

use chainlens_core::logging::LogConfig;
use chainlens_metadata::{MetadataOverrides, QueryPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Accepted values for the `apiKey` header.
    pub api_keys: Vec<String>,
    pub database_url: String,
    /// Platform served by this deployment, e.g. `tezos`.
    pub platform: String,
    /// Networks of that platform with indexed data.
    pub networks: Vec<String>,
    #[serde(default)]
    pub metadata_overrides: MetadataOverrides,
    #[serde(default)]
    pub query: QueryLimits,
    /// Interval of the attribute-value cache refresher, in seconds.
    #[serde(default = "default_cache_refresh_secs")]
    pub cache_refresh_secs: u64,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    1337
}
fn default_cache_refresh_secs() -> u64 {
    300
}

/// Query engine limits, as configured.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryLimits {
    #[serde(default = "default_rows")]
    pub default_rows: u32,
    #[serde(default = "max_rows")]
    pub max_rows: u32,
    #[serde(default = "timeout_ms")]
    pub timeout_ms: u64,
}

fn default_rows() -> u32 {
    100
}
fn max_rows() -> u32 {
    10_000
}
fn timeout_ms() -> u64 {
    25_000
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_rows: default_rows(),
            max_rows: max_rows(),
            timeout_ms: timeout_ms(),
        }
    }
}

impl From<&QueryLimits> for QueryPolicy {
    fn from(limits: &QueryLimits) -> Self {
        Self {
            default_rows: limits.default_rows,
            max_rows: limits.max_rows,
            timeout: Duration::from_millis(limits.timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg: ApiConfig = toml::from_str(
            r#"
            api_keys = ["secret"]
            database_url = "postgresql://localhost/chainlens"
            platform = "tezos"
            networks = ["mainnet"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.port, 1337);
        assert_eq!(cfg.query.max_rows, 10_000);
        let policy = QueryPolicy::from(&cfg.query);
        assert_eq!(policy.timeout, Duration::from_millis(25_000));
    }
}
