use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use config_manager::FallbackConfig;

use crate::request::UpstreamRequest;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::{FetchError, Source};

/// Header set chain.fm checks before answering API calls
const CHAIN_FM_HEADERS: &[(&str, &str)] = &[
    ("authority", "chain.fm"),
    ("accept", "*/*"),
    ("accept-language", "zh-CN,zh;q=0.9"),
    ("content-type", "application/json"),
    ("origin", "https://chain.fm"),
    ("referer", "https://chain.fm/"),
    ("sec-ch-ua", "\"Not A(Brand\";v=\"99\", \"Google Chrome\";v=\"121\", \"Chromium\";v=\"121\""),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"macOS\""),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
];

/// One rung of the ladder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    Proxy { index: usize, prefix: String },
}

impl Strategy {
    pub fn source(&self) -> Source {
        match self {
            Strategy::Direct => Source::Direct,
            Strategy::Proxy { .. } => Source::Proxy,
        }
    }

    fn describe(&self) -> String {
        match self {
            Strategy::Direct => "direct".to_string(),
            Strategy::Proxy { index, prefix } => format!("proxy #{} ({})", index + 1, prefix),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedJson {
    pub source: Source,
    /// Number of strategies tried, including the successful one
    pub attempts: usize,
    pub value: Value,
}

#[derive(Clone)]
pub struct FallbackChain {
    transport: Arc<dyn HttpTransport>,
    proxies: Vec<String>,
    chain_fm_cookie: Option<String>,
}

impl FallbackChain {
    /// Build a chain backed by reqwest
    pub fn new(config: &FallbackConfig) -> Result<Self, FetchError> {
        let transport = ReqwestTransport::new(
            Duration::from_millis(config.request_timeout_ms),
            &config.user_agent,
        )?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: &FallbackConfig) -> Self {
        Self {
            transport,
            proxies: config.cors_proxies.clone(),
            chain_fm_cookie: config.chain_fm_cookie.clone(),
        }
    }

    /// Direct first, then every configured proxy in list order
    pub fn strategies(&self) -> Vec<Strategy> {
        std::iter::once(Strategy::Direct)
            .chain(
                self.proxies
                    .iter()
                    .enumerate()
                    .map(|(index, prefix)| Strategy::Proxy {
                        index,
                        prefix: prefix.clone(),
                    }),
            )
            .collect()
    }

    /// Rewrite `request` for the given strategy
    pub fn prepare(&self, strategy: &Strategy, request: &UpstreamRequest) -> UpstreamRequest {
        let chain_fm = request.targets_chain_fm();

        match strategy {
            Strategy::Direct => {
                let mut prepared = request.clone();
                prepared.headers = vec![
                    ("Content-Type".to_string(), "application/json".to_string()),
                    ("Accept".to_string(), "application/json".to_string()),
                ];
                for (name, value) in &request.headers {
                    prepared.set_header(name.as_str(), value.as_str());
                }
                if chain_fm {
                    for (name, value) in CHAIN_FM_HEADERS {
                        prepared.set_header(*name, *value);
                    }
                    if let Some(cookie) = &self.chain_fm_cookie {
                        prepared.set_header("cookie", cookie.as_str());
                    }
                }
                prepared
            }
            Strategy::Proxy { prefix, .. } => {
                let encoded: String = url::form_urlencoded::byte_serialize(request.url.as_bytes()).collect();
                let mut prepared = UpstreamRequest {
                    method: request.method,
                    url: format!("{}{}", prefix, encoded),
                    headers: Vec::new(),
                    body: request.body.clone(),
                };
                if chain_fm {
                    for (name, value) in CHAIN_FM_HEADERS {
                        prepared.set_header(*name, *value);
                    }
                } else {
                    prepared.set_header("Content-Type", "application/json");
                    prepared.set_header("Accept", "*/*");
                }
                prepared
            }
        }
    }

    /// Run a single strategy. Non-2xx and non-JSON bodies are failures.
    pub async fn attempt(&self, strategy: &Strategy, request: &UpstreamRequest) -> Result<Value, FetchError> {
        let prepared = self.prepare(strategy, request);
        let reply = self.transport.send(&prepared).await?;

        if !reply.is_success() {
            return Err(FetchError::UpstreamHttp {
                status: reply.status,
                url: prepared.url,
            });
        }

        serde_json::from_str(&reply.body).map_err(|e| FetchError::InvalidJson {
            url: prepared.url,
            reason: e.to_string(),
        })
    }

    /// Walk the ladder until one strategy yields JSON
    pub async fn fetch_json(&self, request: &UpstreamRequest) -> Result<FetchedJson, FetchError> {
        request.parsed_url()?;

        let strategies = self.strategies();
        let total = strategies.len();
        let mut last_error: Option<FetchError> = None;

        for (attempt, strategy) in strategies.iter().enumerate() {
            debug!("🔁 Attempt {}/{} via {} for {}", attempt + 1, total, strategy.describe(), request.url);

            match self.attempt(strategy, request).await {
                Ok(value) => {
                    if attempt > 0 {
                        info!("✅ {} served {} after {} failed attempts", strategy.describe(), request.url, attempt);
                    }
                    return Ok(FetchedJson {
                        source: strategy.source(),
                        attempts: attempt + 1,
                        value,
                    });
                }
                Err(e) => {
                    warn!("⚠️  {} failed for {}: {}", strategy.describe(), request.url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(FetchError::AllSourcesExhausted {
            attempts: total,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no strategies configured".to_string()),
        })
    }
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("proxies", &self.proxies)
            .field("chain_fm_cookie", &self.chain_fm_cookie.as_ref().map(|_| "<set>"))
            .finish()
    }
}
