use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] ConfigError),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

/// Dataset names understood by the aggregator. Kept here so config
/// validation and the aggregator agree on spelling.
pub const KNOWN_DATASETS: &[&str] = &[
    "tokenInfo",
    "socialInfo",
    "holderStats",
    "walletTags",
    "topHolders",
    "devTrades",
    "devTokens",
    "smartMoney",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// General system settings
    pub system: SystemSettings,

    /// HTTP server configuration
    pub api: ApiConfig,

    /// Headless-browser relay configuration
    pub relay: RelayConfig,

    /// Direct fetch + CORS proxy ladder
    pub fallback: FallbackConfig,

    /// Third-party endpoints
    pub upstream: UpstreamConfig,

    /// Token-info cache
    pub cache: CacheConfig,

    /// Aggregation behaviour
    pub aggregator: AggregatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSettings {
    /// Enable debug mode
    pub debug_mode: bool,

    /// Emit logs as JSON lines instead of the human format
    pub json_logs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API server host
    pub host: String,

    /// API server port
    pub port: u16,

    /// Kill whatever holds the port before giving up on bind
    pub reclaim_port: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Chrome executable path (None = let chromiumoxide find one)
    pub chrome_executable_path: Option<String>,

    /// Run browser in headless mode
    pub headless_mode: bool,

    /// Navigation deadline for the relay endpoint
    pub navigation_timeout_ms: u64,

    /// Navigation deadline used for gmgn sub-fetches inside an aggregation
    pub gmgn_navigation_timeout_ms: u64,

    /// Extra wait after navigation so late XHRs can land
    pub settle_delay_ms: u64,

    /// Desktop user agent presented to every target
    pub user_agent: String,

    /// Upper bound on simultaneously running browsers
    pub max_concurrent_browsers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Proxy prefixes, tried in order. The target URL is URL-encoded and appended.
    pub cors_proxies: Vec<String>,

    /// Per-attempt HTTP timeout
    pub request_timeout_ms: u64,

    /// Cookie header sent with direct chain.fm requests (credentialed mode)
    pub chain_fm_cookie: Option<String>,

    /// User agent for direct and proxied requests
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub pump_fun_base_url: String,
    pub gmgn_base_url: String,
    pub chain_fm_base_url: String,
    pub pump_news_base_url: String,
    pub gmgn: GmgnClientParams,
    /// Page size of the chain.fm smart-money feed
    pub smart_money_page_size: u32,
    /// Number of creator coins requested from pump.fun
    pub dev_tokens_limit: u32,
}

/// Fixed query parameters gmgn expects on every API call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmgnClientParams {
    pub device_id: String,
    pub client_id: String,
    pub from_app: String,
    pub app_ver: String,
    pub tz_name: String,
    pub tz_offset: i32,
    pub app_lang: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Token-info TTL in seconds
    pub token_info_ttl_seconds: u64,

    /// Interval of the background eviction sweep in seconds
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Datasets that must succeed for an aggregate to report success
    pub required_datasets: Vec<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            system: SystemSettings {
                debug_mode: false,
                json_logs: false,
            },
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                reclaim_port: true,
            },
            relay: RelayConfig {
                chrome_executable_path: None,
                headless_mode: true,
                navigation_timeout_ms: 30_000,
                gmgn_navigation_timeout_ms: 10_000,
                settle_delay_ms: 2_000,
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                max_concurrent_browsers: 4,
            },
            fallback: FallbackConfig {
                cors_proxies: vec![
                    "https://corsproxy.io/?".to_string(),
                    "https://api.allorigins.win/raw?url=".to_string(),
                    "https://api.codetabs.com/v1/proxy?quest=".to_string(),
                ],
                request_timeout_ms: 10_000,
                chain_fm_cookie: None,
                user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36".to_string(),
            },
            upstream: UpstreamConfig {
                pump_fun_base_url: "https://frontend-api-v3.pump.fun".to_string(),
                gmgn_base_url: "https://gmgn.ai".to_string(),
                chain_fm_base_url: "https://chain.fm".to_string(),
                pump_news_base_url: "https://www.pump.news".to_string(),
                gmgn: GmgnClientParams {
                    device_id: "520cc162-92cd-4ee6-9add-25e40e359805".to_string(),
                    client_id: "gmgn_web_2025.0128.214338".to_string(),
                    from_app: "gmgn".to_string(),
                    app_ver: "2025.0128.214338".to_string(),
                    tz_name: "Asia/Shanghai".to_string(),
                    tz_offset: 28800,
                    app_lang: "en".to_string(),
                },
                smart_money_page_size: 30,
                dev_tokens_limit: 10,
            },
            cache: CacheConfig {
                token_info_ttl_seconds: 300,
                sweep_interval_seconds: 300,
            },
            aggregator: AggregatorConfig {
                required_datasets: vec!["tokenInfo".to_string()],
            },
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.navigation_timeout_ms == 0 || self.gmgn_navigation_timeout_ms == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Navigation timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_browsers == 0 {
            return Err(ConfigurationError::InvalidValue(
                "max_concurrent_browsers must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl FallbackConfig {
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(position) = self.cors_proxies.iter().position(|p| p.trim().is_empty()) {
            return Err(ConfigurationError::InvalidValue(format!(
                "CORS proxy entry {} is empty",
                position
            )));
        }

        Ok(())
    }
}

impl SystemConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config_builder = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&SystemConfig::default())?);

        if config_path.as_ref().exists() {
            info!(
                "Loading configuration from: {}",
                config_path.as_ref().display()
            );
            config_builder = config_builder.add_source(File::from(config_path.as_ref()));
        } else {
            debug!("Config file not found, using defaults and environment variables");
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix("PUMPSCOPE")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("fallback.cors_proxies")
                .with_list_parse_key("aggregator.required_datasets"),
        );

        let config = config_builder.build()?;
        let system_config: SystemConfig = config.try_deserialize()?;

        system_config.validate()?;

        Ok(system_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.relay.validate()?;
        self.fallback.validate()?;

        if self.api.port == 0 {
            return Err(ConfigurationError::InvalidValue(
                "API port cannot be 0".to_string(),
            ));
        }

        if self.cache.token_info_ttl_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Token-info TTL must be greater than 0".to_string(),
            ));
        }

        for dataset in &self.aggregator.required_datasets {
            if !KNOWN_DATASETS.contains(&dataset.as_str()) {
                return Err(ConfigurationError::InvalidValue(format!(
                    "Unknown dataset in aggregator.required_datasets: '{}'",
                    dataset
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SystemConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api.port, 3000);
        assert_eq!(config.cache.token_info_ttl_seconds, 300);
        assert_eq!(config.fallback.cors_proxies.len(), 3);
    }

    #[test]
    fn test_rejects_empty_proxy_entry() {
        let mut config = SystemConfig::default();
        config.fallback.cors_proxies.push("  ".to_string());

        match config.validate() {
            Err(ConfigurationError::InvalidValue(msg)) => assert!(msg.contains("CORS proxy entry 3")),
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_required_dataset() {
        let mut config = SystemConfig::default();
        config.aggregator.required_datasets = vec!["holders".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let mut config = SystemConfig::default();
        config.relay.navigation_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.fallback.request_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_path_uses_defaults() {
        let config = SystemConfig::load_from_path("definitely-not-here.toml").unwrap();
        assert_eq!(config.relay.settle_delay_ms, 2_000);
        assert_eq!(config.upstream.gmgn.tz_offset, 28800);
    }
}
