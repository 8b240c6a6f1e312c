// Token Aggregator - fans out per-token upstream requests and merges the
// results into one payload with per-dataset success/failure

pub mod aggregator;
pub mod cache;
pub mod endpoints;
pub mod fetcher;

pub use aggregator::{AggregatedResult, Aggregator, DatasetOutcome, SmartMoneyFeed};
pub use cache::TokenCache;
pub use endpoints::{Endpoints, GmgnDataset};
pub use fetcher::{JsonFetcher, RelayFetcher, SourcedJson};

use browser_relay::RelayError;
use fallback_chain::FetchError;
use thiserror::Error;

/// Dataset keys as they appear in aggregated payloads
pub mod datasets {
    pub const TOKEN_INFO: &str = "tokenInfo";
    pub const SOCIAL_INFO: &str = "socialInfo";
    pub const HOLDER_STATS: &str = "holderStats";
    pub const WALLET_TAGS: &str = "walletTags";
    pub const TOP_HOLDERS: &str = "topHolders";
    pub const DEV_TRADES: &str = "devTrades";
    pub const DEV_TOKENS: &str = "devTokens";
    pub const SMART_MONEY: &str = "smartMoney";

    pub const ALL: [&str; 8] = [
        TOKEN_INFO,
        SOCIAL_INFO,
        HOLDER_STATS,
        WALLET_TAGS,
        TOP_HOLDERS,
        DEV_TRADES,
        DEV_TOKENS,
        SMART_MONEY,
    ];
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    #[error("missing address parameter")]
    MissingParameter,
    #[error("Invalid token address: {0}")]
    InvalidAddress(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("token not found: {0}")]
    TokenNotFound(String),
    #[error("Unexpected payload: {0}")]
    UnexpectedPayload(String),
    #[error("creator unknown")]
    CreatorUnknown,
}

impl AggregateError {
    pub fn kind(&self) -> &'static str {
        match self {
            AggregateError::MissingParameter => "MissingParameter",
            AggregateError::InvalidAddress(_) => "InvalidAddress",
            AggregateError::Fetch(FetchError::AllSourcesExhausted { .. }) => "AllSourcesExhausted",
            AggregateError::Fetch(FetchError::UpstreamHttp { .. }) => "UpstreamHttpError",
            AggregateError::Fetch(_) => "Fetch",
            AggregateError::Relay(e) => e.kind(),
            AggregateError::TokenNotFound(_) => "TokenNotFound",
            AggregateError::UnexpectedPayload(_) => "UnexpectedPayload",
            AggregateError::CreatorUnknown => "CreatorUnknown",
        }
    }

    /// Caller-side mistakes, as opposed to upstream failures
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AggregateError::MissingParameter | AggregateError::InvalidAddress(_)
        ) || matches!(
            self,
            AggregateError::Relay(RelayError::MissingParameter | RelayError::InvalidUrl { .. })
        ) || matches!(self, AggregateError::Fetch(FetchError::InvalidUrl { .. }))
    }
}
