// Browser Relay - loads a target URL in an isolated headless browser and
// relays the first matching JSON response back to the caller

pub mod chromium;
pub mod engine;
pub mod interceptor;
pub mod page_fetcher;
pub mod request;

pub use chromium::{ChromiumEngine, ChromiumSettings};
pub use engine::{BrowserEngine, BrowserSession};
pub use interceptor::{InterceptedResponse, ResourceKind, ResponseInterceptor};
pub use page_fetcher::{FetchEvent, FetcherSettings, PageFetcher};
pub use request::{CapturedResponse, FetchRequest};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("missing URL parameter")]
    MissingParameter,
    #[error("Invalid target URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Browser launch failed: {0}")]
    BrowserLaunch(String),
    #[error("Browser automation error: {0}")]
    Browser(String),
    #[error("Navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },
    #[error("No target data captured for {url}")]
    NoTargetDataCaptured { url: String },
}

impl RelayError {
    /// Stable variant name reported to API callers
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::MissingParameter => "MissingParameter",
            RelayError::InvalidUrl { .. } => "InvalidUrl",
            RelayError::BrowserLaunch(_) => "BrowserLaunch",
            RelayError::Browser(_) => "Browser",
            RelayError::NavigationTimeout { .. } => "NavigationTimeout",
            RelayError::NoTargetDataCaptured { .. } => "NoTargetDataCaptured",
        }
    }
}
