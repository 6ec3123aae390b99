use common::{DomainError, DomainResult};
use serde::Deserialize;
use std::collections::HashSet;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_plr_interval_secs() -> u64 {
    3600
}

fn default_codec_cache_dir() -> String {
    "/var/lib/lorawan-listener/codec-cache".to_string()
}

fn default_loriot_source_label() -> String {
    "loriot".to_string()
}

/// Listener configuration, loaded from `LORAWAN_`-prefixed environment
/// variables.
///
/// `ignore` and `collect` are comma-separated raw measurement names;
/// `codec_map` is either inline JSON or a file path.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub ignore: String,
    #[serde(default)]
    pub collect: String,
    #[serde(default)]
    pub signal_strength_indicators: bool,
    #[serde(default = "default_plr_interval_secs")]
    pub plr_interval_secs: u64,
    #[serde(default)]
    pub codec_map: String,
    #[serde(default = "default_codec_cache_dir")]
    pub codec_cache_dir: String,
    #[serde(default = "default_loriot_source_label")]
    pub loriot_source_label: String,
    #[serde(default)]
    pub dry_run: bool,
}

impl ListenerConfig {
    pub fn from_env() -> DomainResult<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("LORAWAN").try_parsing(true))
            .build()
            .map_err(|e| DomainError::ConfigError(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| DomainError::ConfigError(e.to_string()))
    }

    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            ignore: split_names(&self.ignore),
            collect: split_names(&self.collect),
            signal_indicators: self.signal_strength_indicators,
        }
    }
}

/// Measurement-name filtering applied before publishing.
///
/// Both sets hold raw names as delivered by the network server, not
/// cleaned ones. An empty `collect` set means "collect everything".
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    pub ignore: HashSet<String>,
    pub collect: HashSet<String>,
    pub signal_indicators: bool,
}

fn split_names(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
