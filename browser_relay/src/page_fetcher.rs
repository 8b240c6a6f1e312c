use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use config_manager::RelayConfig;

use crate::engine::{BrowserEngine, BrowserSession};
use crate::interceptor::ResponseInterceptor;
use crate::request::{CapturedResponse, FetchRequest};
use crate::RelayError;

/// Lifecycle notifications for external observers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FetchEvent {
    NavigationStarted { url: String, at: DateTime<Utc> },
    ResponseCaptured { url: String, status: u16, at: DateTime<Utc> },
    CaptureFailed { url: String, error: String, at: DateTime<Utc> },
    TornDown { url: String, at: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub user_agent: String,
    pub navigation_timeout: Duration,
    pub settle_delay: Duration,
    pub max_concurrent_browsers: usize,
}

impl From<&RelayConfig> for FetcherSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            navigation_timeout: Duration::from_millis(config.navigation_timeout_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            max_concurrent_browsers: config.max_concurrent_browsers,
        }
    }
}

/// Loads a page in a fresh browser and hands back the intercepted JSON
pub struct PageFetcher {
    engine: Arc<dyn BrowserEngine>,
    settings: FetcherSettings,
    events: broadcast::Sender<FetchEvent>,
    permits: Arc<Semaphore>,
}

impl PageFetcher {
    pub fn new(engine: Arc<dyn BrowserEngine>, settings: FetcherSettings) -> Self {
        let (events, _) = broadcast::channel(256);
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_browsers.max(1)));
        Self {
            engine,
            settings,
            events,
            permits,
        }
    }

    pub fn settings(&self) -> &FetcherSettings {
        &self.settings
    }

    /// Receive lifecycle events for every subsequent fetch
    pub fn subscribe(&self) -> broadcast::Receiver<FetchEvent> {
        self.events.subscribe()
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<CapturedResponse, RelayError> {
        self.fetch_with_timeout(request, self.settings.navigation_timeout).await
    }

    pub async fn fetch_with_timeout(
        &self,
        request: &FetchRequest,
        navigation_timeout: Duration,
    ) -> Result<CapturedResponse, RelayError> {
        let target = request.target_url().to_string();
        let mut interceptor = ResponseInterceptor::new(&target)?;

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RelayError::Browser("browser pool is closed".to_string()))?;

        let session = match self.engine.launch().await {
            Ok(session) => session,
            Err(e) => {
                error!("❌ Failed to launch browser for {}: {}", target, e);
                self.emit(FetchEvent::CaptureFailed {
                    url: target,
                    error: e.to_string(),
                    at: Utc::now(),
                });
                return Err(e);
            }
        };
        let mut guard = SessionGuard {
            session: Some(session),
            permit: Some(permit),
            url: target.clone(),
            events: self.events.clone(),
        };

        info!("🧭 Loading {} (data type: {})", target, request.data_type().unwrap_or("unspecified"));
        self.emit(FetchEvent::NavigationStarted {
            url: target.clone(),
            at: Utc::now(),
        });

        let driven = match guard.session.as_deref_mut() {
            Some(session) => {
                self.drive(session, &mut interceptor, request, navigation_timeout)
                    .await
            }
            None => Err(RelayError::Browser("browser session already closed".to_string())),
        };

        // Teardown runs before anything is reported upward
        guard.close().await;

        let outcome = driven.and_then(|_| interceptor.finish());

        match &outcome {
            Ok(captured) => {
                info!("✅ Relay captured {} (HTTP {})", captured.url, captured.status);
                self.emit(FetchEvent::ResponseCaptured {
                    url: captured.url.clone(),
                    status: captured.status,
                    at: Utc::now(),
                });
            }
            Err(e) => {
                error!("❌ Relay failed for {}: {}", target, e);
                self.emit(FetchEvent::CaptureFailed {
                    url: target,
                    error: e.to_string(),
                    at: Utc::now(),
                });
            }
        }

        outcome
    }

    /// Listen, navigate, then race {matching response, navigation done, deadline}.
    /// A capture ends the race early; otherwise late responses are drained
    /// for the settle delay.
    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        interceptor: &mut ResponseInterceptor,
        request: &FetchRequest,
        navigation_timeout: Duration,
    ) -> Result<(), RelayError> {
        session
            .prepare(&self.settings.user_agent, &request.site_headers())
            .await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let deadline = tokio::time::sleep(navigation_timeout);
        tokio::pin!(deadline);

        {
            let navigation = session.navigate(request.target_url(), tx);
            tokio::pin!(navigation);

            loop {
                tokio::select! {
                    biased;
                    Some(response) = rx.recv() => {
                        if interceptor.offer(response) {
                            return Ok(());
                        }
                    }
                    result = &mut navigation => {
                        result?;
                        break;
                    }
                    _ = &mut deadline => {
                        return Err(RelayError::NavigationTimeout {
                            url: request.target_url().to_string(),
                            timeout_ms: navigation_timeout.as_millis() as u64,
                        });
                    }
                }
            }
        }

        debug!("⏳ Navigation settled, waiting {:?} for late responses", self.settings.settle_delay);
        let settle = tokio::time::sleep(self.settings.settle_delay);
        tokio::pin!(settle);

        loop {
            tokio::select! {
                biased;
                received = rx.recv() => match received {
                    Some(response) => {
                        if interceptor.offer(response) {
                            return Ok(());
                        }
                    }
                    None => break,
                },
                _ = &mut settle => break,
            }
        }

        Ok(())
    }

    fn emit(&self, event: FetchEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Owns a live browser until it is closed. Dropping it with the session
/// still open (the fetch future was cancelled) closes it on a spawned task.
struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
    permit: Option<OwnedSemaphorePermit>,
    url: String,
    events: broadcast::Sender<FetchEvent>,
}

impl SessionGuard {
    async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            teardown(session, &self.url, &self.events).await;
        }
        self.permit.take();
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        warn!("⚠️  Fetch for {} was cancelled, closing its browser in the background", self.url);

        let permit = self.permit.take();
        let url = std::mem::take(&mut self.url);
        let events = self.events.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    teardown(session, &url, &events).await;
                    drop(permit);
                });
            }
            Err(_) => error!("❌ No runtime left to close the browser for {}", url),
        }
    }
}

async fn teardown(session: Box<dyn BrowserSession>, url: &str, events: &broadcast::Sender<FetchEvent>) {
    if let Err(e) = session.close().await {
        warn!("⚠️  Browser teardown for {} reported: {}", url, e);
    }
    debug!("🧹 Browser closed for {}", url);
    let _ = events.send(FetchEvent::TornDown {
        url: url.to_string(),
        at: Utc::now(),
    });
}
