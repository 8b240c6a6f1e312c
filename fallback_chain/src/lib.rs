// Fallback Chain - direct request first, then each CORS proxy in order
// Used for upstream JSON APIs that reject cross-origin callers

pub mod chain;
pub mod request;
pub mod transport;

pub use chain::{FallbackChain, FetchedJson, Strategy};
pub use request::{HttpMethod, UpstreamRequest};
pub use transport::{HttpReply, HttpTransport, ReqwestTransport};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("HTTP request failed: {0}")]
    Transport(String),
    #[error("Upstream returned HTTP {status} for {url}")]
    UpstreamHttp { status: u16, url: String },
    #[error("Response from {url} is not valid JSON: {reason}")]
    InvalidJson { url: String, reason: String },
    #[error("All {attempts} sources exhausted, last error: {last_error}")]
    AllSourcesExhausted { attempts: usize, last_error: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Transport(format!("request timed out: {}", e))
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Which strategy ended up serving a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Direct,
    Proxy,
    Relay,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Source::Direct => "direct",
            Source::Proxy => "proxy",
            Source::Relay => "relay",
        };
        f.write_str(name)
    }
}
