use chrono::{DateTime, Utc};
use futures::future::join_all;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use config_manager::SystemConfig;
use fallback_chain::{Source, UpstreamRequest};

use crate::cache::TokenCache;
use crate::datasets;
use crate::endpoints::{Endpoints, GmgnDataset};
use crate::fetcher::{JsonFetcher, SourcedJson};
use crate::AggregateError;

/// Per-dataset result inside an aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_count: Option<usize>,
}

impl DatasetOutcome {
    fn fetched(result: Result<SourcedJson, AggregateError>) -> Self {
        match result {
            Ok(fetched) => Self::succeeded(Some(fetched.source), false, fetched.value),
            Err(e) => Self::failed(&e),
        }
    }

    fn succeeded(source: Option<Source>, cached: bool, data: Value) -> Self {
        Self {
            success: true,
            source,
            cached,
            data: Some(data),
            error: None,
            transaction_count: None,
        }
    }

    fn failed(error: &AggregateError) -> Self {
        Self {
            success: false,
            source: None,
            cached: false,
            data: None,
            error: Some(error.to_string()),
            transaction_count: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResult {
    pub success: bool,
    pub source: Source,
    pub timestamp: DateTime<Utc>,
    pub data: BTreeMap<String, DatasetOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// chain.fm feed plus the transactions lifted out of it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmartMoneyFeed {
    pub source: Source,
    pub data: Value,
    pub transactions: Vec<Value>,
}

pub struct Aggregator {
    chain: Arc<dyn JsonFetcher>,
    relay: Arc<dyn JsonFetcher>,
    endpoints: Endpoints,
    cache: Arc<TokenCache>,
    required_datasets: Vec<String>,
}

impl Aggregator {
    pub fn new(
        chain: Arc<dyn JsonFetcher>,
        relay: Arc<dyn JsonFetcher>,
        endpoints: Endpoints,
        cache: Arc<TokenCache>,
        required_datasets: Vec<String>,
    ) -> Self {
        Self {
            chain,
            relay,
            endpoints,
            cache,
            required_datasets,
        }
    }

    pub fn from_config(config: &SystemConfig, chain: Arc<dyn JsonFetcher>, relay: Arc<dyn JsonFetcher>) -> Self {
        let cache = Arc::new(TokenCache::new(Duration::from_secs(
            config.cache.token_info_ttl_seconds,
        )));
        Self::new(
            chain,
            relay,
            Endpoints::new(config.upstream.clone()),
            cache,
            config.aggregator.required_datasets.clone(),
        )
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Trim and check a Solana base58 address
    pub fn validate_address(address: &str) -> Result<String, AggregateError> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(AggregateError::MissingParameter);
        }

        let re = Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$")
            .map_err(|e| AggregateError::InvalidAddress(format!("Regex error: {}", e)))?;
        if !re.is_match(trimmed) {
            return Err(AggregateError::InvalidAddress(trimmed.to_string()));
        }

        Ok(trimmed.to_string())
    }

    /// Fetch every dataset for `address`. Failures are recorded per key.
    pub async fn aggregate(&self, address: &str) -> AggregatedResult {
        let address = match Self::validate_address(address) {
            Ok(address) => address,
            Err(e) => {
                warn!("⚠️  Rejected aggregate request: {}", e);
                let data = datasets::ALL
                    .iter()
                    .map(|key| (key.to_string(), DatasetOutcome::failed(&e)))
                    .collect();
                return AggregatedResult {
                    success: false,
                    source: Source::Direct,
                    timestamp: Utc::now(),
                    data,
                    error: Some(e.to_string()),
                };
            }
        };

        info!("🔍 Aggregating token data for {}", address);

        // devTokens needs the creator out of tokenInfo
        let token_and_dev = async {
            let info = self.token_info(&address).await;
            let dev = match &info {
                Ok((token, _, _)) => match token.get("creator").and_then(Value::as_str) {
                    Some(creator) => self.dev_info(creator).await,
                    None => Err(AggregateError::CreatorUnknown),
                },
                Err(_) => Err(AggregateError::CreatorUnknown),
            };
            (info, dev)
        };

        let ((info, dev), social, gmgn, smart) = futures::join!(
            token_and_dev,
            self.social_info(&address),
            self.gmgn_datasets(&address),
            self.smart_money(&address),
        );

        let mut data = BTreeMap::new();
        data.insert(
            datasets::TOKEN_INFO.to_string(),
            match info {
                Ok((value, source, cached)) => DatasetOutcome::succeeded(source, cached, value),
                Err(e) => DatasetOutcome::failed(&e),
            },
        );
        data.insert(datasets::DEV_TOKENS.to_string(), DatasetOutcome::fetched(dev));
        data.insert(datasets::SOCIAL_INFO.to_string(), DatasetOutcome::fetched(social));
        data.extend(gmgn);
        data.insert(
            datasets::SMART_MONEY.to_string(),
            match smart {
                Ok(feed) => {
                    let mut outcome = DatasetOutcome::succeeded(Some(feed.source), false, feed.data);
                    outcome.transaction_count = Some(feed.transactions.len());
                    outcome
                }
                Err(e) => DatasetOutcome::failed(&e),
            },
        );

        let result = self.summarize(data);
        info!(
            "📦 Aggregate for {} finished: success={} source={}",
            address, result.success, result.source
        );
        result
    }

    fn summarize(&self, data: BTreeMap<String, DatasetOutcome>) -> AggregatedResult {
        let failed_required: Vec<String> = self
            .required_datasets
            .iter()
            .filter_map(|key| match data.get(key) {
                Some(outcome) if outcome.success => None,
                Some(outcome) => Some(format!(
                    "{}: {}",
                    key,
                    outcome.error.as_deref().unwrap_or("failed")
                )),
                None => Some(format!("{}: not fetched", key)),
            })
            .collect();

        // Most indirect strategy any success needed
        let source = data
            .values()
            .filter(|outcome| outcome.success)
            .filter_map(|outcome| outcome.source)
            .max()
            .unwrap_or(Source::Direct);

        AggregatedResult {
            success: failed_required.is_empty(),
            source,
            timestamp: Utc::now(),
            data,
            error: if failed_required.is_empty() {
                None
            } else {
                Some(format!("required datasets failed: {}", failed_required.join("; ")))
            },
        }
    }

    /// Only the four gmgn datasets, fetched through the relay
    pub async fn aggregate_gmgn(&self, address: &str) -> Result<BTreeMap<String, DatasetOutcome>, AggregateError> {
        let address = Self::validate_address(address)?;
        Ok(self.gmgn_datasets(&address).await.into_iter().collect())
    }

    async fn gmgn_datasets(&self, address: &str) -> Vec<(String, DatasetOutcome)> {
        let fetches = GmgnDataset::ALL.iter().map(|dataset| async move {
            let outcome = DatasetOutcome::fetched(self.gmgn_dataset(*dataset, address).await);
            (dataset.key().to_string(), outcome)
        });
        join_all(fetches).await
    }

    pub async fn gmgn_dataset(&self, dataset: GmgnDataset, address: &str) -> Result<SourcedJson, AggregateError> {
        let url = self.endpoints.gmgn(dataset, address)?;
        debug!("📡 Relaying gmgn {} for {}", dataset.key(), address);
        self.relay.fetch_json(&UpstreamRequest::get(url)).await
    }

    /// Raw pump.fun search response
    pub async fn token_search(&self, address: &str) -> Result<SourcedJson, AggregateError> {
        let address = Self::validate_address(address)?;
        let request = self.endpoints.token_search(&address)?;
        self.chain.fetch_json(&request).await
    }

    /// First search hit for the token, served from cache when fresh.
    /// Returns the token, the source when fetched, and whether it was cached.
    pub async fn token_info(&self, address: &str) -> Result<(Value, Option<Source>, bool), AggregateError> {
        if let Some(cached) = self.cache.get(address) {
            debug!("💾 Using cached token info for {}", address);
            return Ok((cached, None, true));
        }

        let fetched = self.token_search(address).await?;
        let token = fetched
            .value
            .as_array()
            .and_then(|hits| hits.first())
            .cloned()
            .ok_or_else(|| AggregateError::TokenNotFound(address.to_string()))?;

        self.cache.insert(address, token.clone());
        Ok((token, Some(fetched.source), false))
    }

    pub async fn trade_info(&self, address: &str) -> Result<Value, AggregateError> {
        let address = Self::validate_address(address)?;
        self.token_info(&address).await.map(|(token, _, _)| token)
    }

    /// Other coins launched by `creator`
    pub async fn dev_info(&self, creator: &str) -> Result<SourcedJson, AggregateError> {
        let creator = Self::validate_address(creator)?;
        let request = self.endpoints.dev_tokens(&creator)?;
        self.chain.fetch_json(&request).await
    }

    pub async fn social_info(&self, address: &str) -> Result<SourcedJson, AggregateError> {
        let request = self.endpoints.social_info(address)?;
        self.chain.fetch_json(&request).await
    }

    pub async fn smart_money(&self, address: &str) -> Result<SmartMoneyFeed, AggregateError> {
        let address = Self::validate_address(address)?;
        let request = self.endpoints.smart_money(&address)?;
        let fetched = self.chain.fetch_json(&request).await?;

        let feed = fetched
            .value
            .pointer("/0/result/data/json/data")
            .ok_or_else(|| {
                AggregateError::UnexpectedPayload("chain.fm response has no result.data.json.data".to_string())
            })?;
        let transactions = feed
            .get("parsedTransactions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        debug!("💰 {} smart money transactions for {}", transactions.len(), address);
        Ok(SmartMoneyFeed {
            source: fetched.source,
            data: fetched.value,
            transactions,
        })
    }

    /// Arbitrary GET through the fallback chain, with `params` appended
    pub async fn fetch_url(&self, url: &str, params: &HashMap<String, String>) -> Result<SourcedJson, AggregateError> {
        if url.trim().is_empty() {
            return Err(AggregateError::MissingParameter);
        }

        let mut target = url::Url::parse(url.trim()).map_err(|e| {
            AggregateError::Fetch(fallback_chain::FetchError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })
        })?;
        if !params.is_empty() {
            let sorted: BTreeMap<_, _> = params.iter().collect();
            let mut pairs = target.query_pairs_mut();
            for (name, value) in sorted {
                pairs.append_pair(name, value);
            }
        }

        self.chain.fetch_json(&UpstreamRequest::get(target.to_string())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use browser_relay::RelayError;
    use fallback_chain::FetchError;
    use serde_json::json;
    use std::sync::Mutex;

    const MINT: &str = "So11111111111111111111111111111111111111112";
    const CREATOR: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    /// Answers by URL substring and records every call
    struct ScriptedFetcher {
        source: Source,
        routes: Vec<(&'static str, Result<Value, AggregateError>)>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(source: Source, routes: Vec<(&'static str, Result<Value, AggregateError>)>) -> Arc<Self> {
            Arc::new(Self {
                source,
                routes,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls_matching(&self, needle: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|url| url.contains(needle))
                .count()
        }
    }

    #[async_trait]
    impl JsonFetcher for ScriptedFetcher {
        async fn fetch_json(&self, request: &UpstreamRequest) -> Result<SourcedJson, AggregateError> {
            self.calls.lock().unwrap().push(request.url.clone());
            for (needle, reply) in &self.routes {
                if request.url.contains(needle) {
                    return reply.clone().map(|value| SourcedJson {
                        source: self.source,
                        value,
                    });
                }
            }
            Err(AggregateError::Fetch(FetchError::UpstreamHttp {
                status: 404,
                url: request.url.clone(),
            }))
        }
    }

    fn chain_routes() -> Vec<(&'static str, Result<Value, AggregateError>)> {
        vec![
            ("coins/search", Ok(json!([{"mint": MINT, "name": "Wrapped", "creator": CREATOR}]))),
            ("user-created-coins", Ok(json!([{"mint": "other"}]))),
            ("tweets.getTweetsByTokenAddress", Ok(json!({"result": {"data": []}}))),
            (
                "parsedTransaction.list",
                Ok(json!([{"result": {"data": {"json": {"data": {"parsedTransactions": [{"sig": 1}, {"sig": 2}]}}}}}])),
            ),
        ]
    }

    fn gmgn_routes() -> Vec<(&'static str, Result<Value, AggregateError>)> {
        vec![
            ("token_stat", Ok(json!({"holder_count": 10}))),
            ("token_wallet_tags_stat", Ok(json!({"smart_wallets": 2}))),
            ("mutil_window_token_security_launchpad", Ok(json!({"top_10_holder_rate": 0.3}))),
            (
                "token_trades",
                Err(AggregateError::Relay(RelayError::NavigationTimeout {
                    url: "https://gmgn.ai".to_string(),
                    timeout_ms: 10_000,
                })),
            ),
        ]
    }

    fn aggregator(chain: Arc<ScriptedFetcher>, relay: Arc<ScriptedFetcher>) -> Aggregator {
        Aggregator::from_config(&SystemConfig::default(), chain, relay)
    }

    #[tokio::test]
    async fn test_aggregate_reports_every_dataset() {
        let chain = ScriptedFetcher::new(Source::Direct, chain_routes());
        let relay = ScriptedFetcher::new(Source::Relay, gmgn_routes());
        let result = aggregator(chain, relay).aggregate(MINT).await;

        assert!(result.success);
        assert_eq!(result.source, Source::Relay);
        for key in datasets::ALL {
            assert!(result.data.contains_key(key), "missing {}", key);
        }

        assert_eq!(result.data["tokenInfo"].data.as_ref().unwrap()["creator"], CREATOR);
        assert!(result.data["devTokens"].success);
        assert_eq!(result.data["smartMoney"].transaction_count, Some(2));
        assert!(!result.data["devTrades"].success);
        assert!(result.data["devTrades"].error.as_ref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_token_fails_required_dataset_only() {
        let mut routes = chain_routes();
        routes[0] = ("coins/search", Ok(json!([])));
        let chain = ScriptedFetcher::new(Source::Proxy, routes);
        let relay = ScriptedFetcher::new(Source::Relay, gmgn_routes());

        let result = aggregator(chain.clone(), relay).aggregate(MINT).await;

        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("tokenInfo"));
        assert_eq!(result.data["devTokens"].error.as_deref(), Some("creator unknown"));
        assert!(result.data["smartMoney"].success);
        assert_eq!(chain.calls_matching("user-created-coins"), 0);
    }

    #[tokio::test]
    async fn test_token_info_is_cached_between_aggregates() {
        let chain = ScriptedFetcher::new(Source::Direct, chain_routes());
        let relay = ScriptedFetcher::new(Source::Relay, gmgn_routes());
        let aggregator = aggregator(chain.clone(), relay);

        let first = aggregator.aggregate(MINT).await;
        let second = aggregator.aggregate(MINT).await;

        assert_eq!(chain.calls_matching("coins/search"), 1);
        assert!(!first.data["tokenInfo"].cached);
        assert!(second.data["tokenInfo"].cached);
        assert_eq!(first.data["tokenInfo"].data, second.data["tokenInfo"].data);
        // Smart money and dev history are never cached
        assert_eq!(chain.calls_matching("parsedTransaction.list"), 2);
        assert_eq!(chain.calls_matching("user-created-coins"), 2);
    }

    #[tokio::test]
    async fn test_invalid_address_never_hits_network() {
        let chain = ScriptedFetcher::new(Source::Direct, chain_routes());
        let relay = ScriptedFetcher::new(Source::Relay, gmgn_routes());
        let result = aggregator(chain.clone(), relay.clone()).aggregate("not-an-address!").await;

        assert!(!result.success);
        assert_eq!(result.data.len(), datasets::ALL.len());
        assert!(result.data.values().all(|outcome| !outcome.success));
        assert!(chain.calls.lock().unwrap().is_empty());
        assert!(relay.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_smart_money_rejects_unexpected_shape() {
        let mut routes = chain_routes();
        routes[3] = ("parsedTransaction.list", Ok(json!([{"error": "unauthorized"}])));
        let chain = ScriptedFetcher::new(Source::Direct, routes);
        let relay = ScriptedFetcher::new(Source::Relay, gmgn_routes());

        let err = aggregator(chain, relay).smart_money(MINT).await.unwrap_err();
        assert_eq!(err.kind(), "UnexpectedPayload");
    }

    #[tokio::test]
    async fn test_aggregate_gmgn_returns_four_keys() {
        let chain = ScriptedFetcher::new(Source::Direct, chain_routes());
        let relay = ScriptedFetcher::new(Source::Relay, gmgn_routes());
        let gmgn = aggregator(chain.clone(), relay.clone()).aggregate_gmgn(MINT).await.unwrap();

        assert_eq!(gmgn.len(), 4);
        assert!(gmgn["holderStats"].success);
        assert_eq!(gmgn["holderStats"].source, Some(Source::Relay));
        assert_eq!(relay.calls_matching("device_id="), 4);
        assert!(chain.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_url_appends_params() {
        let chain = ScriptedFetcher::new(Source::Direct, vec![("chain.fm", Ok(json!({"ok": true})))]);
        let relay = ScriptedFetcher::new(Source::Relay, Vec::new());
        let mut params = HashMap::new();
        params.insert("batch".to_string(), "1".to_string());

        let fetched = aggregator(chain.clone(), relay)
            .fetch_url("https://chain.fm/api/trpc/x", &params)
            .await
            .unwrap();

        assert_eq!(fetched.value["ok"], true);
        assert_eq!(chain.calls.lock().unwrap()[0], "https://chain.fm/api/trpc/x?batch=1");
    }

    #[test]
    fn test_validate_address() {
        assert_eq!(Aggregator::validate_address(&format!("  {}  ", MINT)).unwrap(), MINT);
        assert_eq!(Aggregator::validate_address(""), Err(AggregateError::MissingParameter));
        assert!(matches!(
            Aggregator::validate_address("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl"),
            Err(AggregateError::InvalidAddress(_))
        ));
    }
}
