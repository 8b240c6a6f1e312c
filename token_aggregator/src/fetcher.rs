use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use browser_relay::{FetchRequest, PageFetcher};
use fallback_chain::{FallbackChain, Source, UpstreamRequest};

use crate::AggregateError;

/// A JSON payload and the strategy that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedJson {
    pub source: Source,
    pub value: Value,
}

/// Anything that can turn an upstream request into JSON
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn fetch_json(&self, request: &UpstreamRequest) -> Result<SourcedJson, AggregateError>;
}

#[async_trait]
impl JsonFetcher for FallbackChain {
    async fn fetch_json(&self, request: &UpstreamRequest) -> Result<SourcedJson, AggregateError> {
        let fetched = FallbackChain::fetch_json(self, request).await?;
        Ok(SourcedJson {
            source: fetched.source,
            value: fetched.value,
        })
    }
}

/// Routes requests through the headless-browser relay
pub struct RelayFetcher {
    fetcher: Arc<PageFetcher>,
    navigation_timeout: Duration,
}

impl RelayFetcher {
    pub fn new(fetcher: Arc<PageFetcher>, navigation_timeout: Duration) -> Self {
        Self {
            fetcher,
            navigation_timeout,
        }
    }
}

#[async_trait]
impl JsonFetcher for RelayFetcher {
    async fn fetch_json(&self, request: &UpstreamRequest) -> Result<SourcedJson, AggregateError> {
        let relay_request = FetchRequest::new(&request.url)?;
        let captured = self
            .fetcher
            .fetch_with_timeout(&relay_request, self.navigation_timeout)
            .await?;
        Ok(SourcedJson {
            source: Source::Relay,
            value: captured.data,
        })
    }
}
