use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use config_manager::SystemConfig;
use fallback_chain::{FallbackChain, FetchError, HttpReply, HttpTransport, Source, UpstreamRequest};
use token_aggregator::{AggregateError, Aggregator, JsonFetcher, SourcedJson};

const MINT: &str = "So11111111111111111111111111111111111111112";

/// pump.fun and chain.fm refuse direct calls; the second proxy answers
struct ProxyOnlyTransport {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl HttpTransport for ProxyOnlyTransport {
    async fn send(&self, request: &UpstreamRequest) -> Result<HttpReply, FetchError> {
        self.seen.lock().unwrap().push(request.url.clone());

        if !request.url.starts_with("https://api.allorigins.win") {
            return Ok(HttpReply {
                status: 403,
                body: "forbidden".to_string(),
            });
        }

        let body = if request.url.contains("coins%2Fsearch") {
            json!([{ "mint": MINT, "symbol": "WSOL" }])
        } else if request.url.contains("parsedTransaction.list") {
            json!([{ "result": { "data": { "json": { "data": { "parsedTransactions": [] } } } } }])
        } else {
            json!({ "ok": true })
        };

        Ok(HttpReply {
            status: 200,
            body: body.to_string(),
        })
    }
}

struct NoRelay;

#[async_trait]
impl JsonFetcher for NoRelay {
    async fn fetch_json(&self, request: &UpstreamRequest) -> Result<SourcedJson, AggregateError> {
        Err(AggregateError::Relay(browser_relay::RelayError::BrowserLaunch(format!(
            "no browser available for {}",
            request.url
        ))))
    }
}

fn aggregator(transport: Arc<ProxyOnlyTransport>) -> Aggregator {
    let config = SystemConfig::default();
    let chain = FallbackChain::with_transport(transport, &config.fallback);
    Aggregator::from_config(&config, Arc::new(chain), Arc::new(NoRelay))
}

#[tokio::test]
async fn proxied_token_info_marks_aggregate_as_proxy() {
    let transport = Arc::new(ProxyOnlyTransport {
        seen: Mutex::new(Vec::new()),
    });
    let result = aggregator(transport.clone()).aggregate(MINT).await;

    assert!(result.success);
    assert_eq!(result.source, Source::Proxy);
    assert_eq!(result.data["tokenInfo"].source, Some(Source::Proxy));
    assert_eq!(result.data["tokenInfo"].data.as_ref().unwrap()["symbol"], "WSOL");

    // No creator in the search hit, so dev history is skipped
    assert!(!result.data["devTokens"].success);
    assert!(!result.data["holderStats"].success);

    let seen = transport.seen.lock().unwrap();
    let search_calls: Vec<_> = seen.iter().filter(|url| url.contains("search")).collect();
    // direct, corsproxy.io, allorigins; codetabs never reached
    assert_eq!(search_calls.len(), 3);
    assert!(!search_calls.iter().any(|url| url.contains("codetabs")));
}

#[tokio::test(start_paused = true)]
async fn cache_expiry_triggers_fresh_fetch() {
    let transport = Arc::new(ProxyOnlyTransport {
        seen: Mutex::new(Vec::new()),
    });
    let aggregator = aggregator(transport.clone());
    let searches = || {
        transport
            .seen
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains("search"))
            .count()
    };

    aggregator.trade_info(MINT).await.unwrap();
    let after_first = searches();

    tokio::time::advance(Duration::from_secs(299)).await;
    aggregator.trade_info(MINT).await.unwrap();
    assert_eq!(searches(), after_first);

    tokio::time::advance(Duration::from_millis(1001)).await;
    aggregator.trade_info(MINT).await.unwrap();
    assert_eq!(searches(), after_first * 2);
}
