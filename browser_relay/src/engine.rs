use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::interceptor::InterceptedResponse;
use crate::RelayError;

/// Launches one isolated browser per call. No session reuse.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, RelayError>;
}

/// A live browser with a single page
#[async_trait]
pub trait BrowserSession: Send {
    /// Apply the user agent and extra request headers before navigating
    async fn prepare(&mut self, user_agent: &str, headers: &[(String, String)]) -> Result<(), RelayError>;

    /// Navigate to `url`, pushing every observed response into `responses`.
    /// Resolves once the navigation itself completes; responses may keep
    /// arriving afterwards until the session is closed.
    async fn navigate(
        &mut self,
        url: &str,
        responses: mpsc::UnboundedSender<InterceptedResponse>,
    ) -> Result<(), RelayError>;

    /// Tear the browser down. Called exactly once per session.
    async fn close(self: Box<Self>) -> Result<(), RelayError>;
}
