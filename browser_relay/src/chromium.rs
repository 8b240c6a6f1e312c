use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventResponseReceived, GetResponseBodyParams,
    Headers, RequestId, ResourceType, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use config_manager::RelayConfig;

use crate::engine::{BrowserEngine, BrowserSession};
use crate::interceptor::{InterceptedResponse, ResourceKind};
use crate::RelayError;

#[derive(Debug, Clone)]
pub struct ChromiumSettings {
    pub chrome_executable_path: Option<String>,
    pub headless_mode: bool,
    pub profile_root: PathBuf,
}

impl From<&RelayConfig> for ChromiumSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            chrome_executable_path: config.chrome_executable_path.clone(),
            headless_mode: config.headless_mode,
            profile_root: std::env::temp_dir(),
        }
    }
}

/// Launches a throwaway Chromium with its own profile directory per fetch
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    settings: ChromiumSettings,
}

impl ChromiumEngine {
    pub fn new(settings: ChromiumSettings) -> Self {
        Self { settings }
    }

    fn launch_args() -> Vec<String> {
        vec![
            "--no-sandbox".to_string(),
            "--disable-setuid-sandbox".to_string(),
            "--disable-web-security".to_string(),
            "--disable-features=IsolateOrigins,site-per-process".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--exclude-switches=enable-automation".to_string(),
            "--disable-infobars".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--window-size=1920,1080".to_string(),
        ]
    }

    fn profile_dir(&self) -> PathBuf {
        let random_id: u64 = rand::thread_rng().gen();
        self.settings
            .profile_root
            .join(format!("pumpscope-chrome-{}", random_id))
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, RelayError> {
        let profile_dir = self.profile_dir();
        debug!("🔧 Launching Chromium with profile {}", profile_dir.display());

        let mut builder = BrowserConfig::builder();
        if let Some(ref chrome_path) = self.settings.chrome_executable_path {
            builder = builder.chrome_executable(chrome_path);
        }
        if !self.settings.headless_mode {
            builder = builder.with_head();
        }
        builder = builder.user_data_dir(&profile_dir).args(Self::launch_args());

        let config = builder
            .build()
            .map_err(|e| RelayError::BrowserLaunch(format!("Browser config error: {}", e)))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RelayError::BrowserLaunch(format!("Failed to launch browser: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                remove_profile(&profile_dir).await;
                return Err(RelayError::BrowserLaunch(format!("Failed to open page: {}", e)));
            }
        };

        info!("✅ Chromium launched");
        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task: Some(handler_task),
            forward_task: None,
            profile_dir: Some(profile_dir),
        }))
    }
}

/// Whatever `close` has not already released is released on drop
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
    forward_task: Option<JoinHandle<()>>,
    profile_dir: Option<PathBuf>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn prepare(&mut self, user_agent: &str, headers: &[(String, String)]) -> Result<(), RelayError> {
        self.page
            .set_user_agent(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map_err(|e| RelayError::Browser(format!("Failed to set user agent: {}", e)))?;

        let extra: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
            .collect();

        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(serde_json::Value::Object(extra))))
            .await
            .map_err(|e| RelayError::Browser(format!("Failed to set request headers: {}", e)))?;

        self.page
            .execute(EnableParams::default())
            .await
            .map_err(|e| RelayError::Browser(format!("Failed to enable network events: {}", e)))?;

        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        responses: mpsc::UnboundedSender<InterceptedResponse>,
    ) -> Result<(), RelayError> {
        let received = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| RelayError::Browser(format!("Failed to listen for responses: {}", e)))?;
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|e| RelayError::Browser(format!("Failed to listen for responses: {}", e)))?;
        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|e| RelayError::Browser(format!("Failed to listen for responses: {}", e)))?;

        let page = self.page.clone();
        self.forward_task = Some(tokio::spawn(async move {
            forward_responses(page, received, finished, failed, responses).await;
        }));

        self.page
            .goto(url)
            .await
            .map_err(|e| RelayError::Browser(format!("Navigation to {} failed: {}", url, e)))?;

        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<(), RelayError> {
        if let Some(task) = self.forward_task.take() {
            task.abort();
        }

        let closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| RelayError::Browser(format!("Failed to close browser: {}", e)));
        if let Err(e) = self.browser.wait().await {
            warn!("⚠️  Browser process did not exit cleanly: {}", e);
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        if let Some(profile_dir) = self.profile_dir.take() {
            remove_profile(&profile_dir).await;
        }

        closed
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(task) = self.forward_task.take() {
            task.abort();
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        if let Some(profile_dir) = self.profile_dir.take() {
            debug!("🧹 Chromium session dropped without close, removing {}", profile_dir.display());
            // `Browser` kills its child process when it is dropped
            if let Err(e) = std::fs::remove_dir_all(&profile_dir) {
                debug!("Profile directory {} not removed: {}", profile_dir.display(), e);
            }
        }
    }
}

/// Pair each response with its body once loading finishes. Non-JSON
/// responses are forwarded straight away without a body.
async fn forward_responses<R, F, X>(
    page: Page,
    mut received: R,
    mut finished: F,
    mut failed: X,
    responses: mpsc::UnboundedSender<InterceptedResponse>,
) where
    R: futures::Stream<Item = std::sync::Arc<EventResponseReceived>> + Unpin,
    F: futures::Stream<Item = std::sync::Arc<EventLoadingFinished>> + Unpin,
    X: futures::Stream<Item = std::sync::Arc<EventLoadingFailed>> + Unpin,
{
    let mut pending: HashMap<RequestId, InterceptedResponse> = HashMap::new();

    loop {
        tokio::select! {
            biased;
            event = received.next() => {
                let Some(event) = event else { break };
                let response = observed_response(&event);
                if response.is_json() {
                    pending.insert(event.request_id.clone(), response);
                } else if responses.send(response).is_err() {
                    break;
                }
            }
            event = finished.next() => {
                let Some(event) = event else { break };
                if let Some(mut response) = pending.remove(&event.request_id) {
                    response.body = read_body(&page, event.request_id.clone()).await;
                    if responses.send(response).is_err() {
                        break;
                    }
                }
            }
            event = failed.next() => {
                let Some(event) = event else { break };
                if let Some(response) = pending.remove(&event.request_id) {
                    debug!("Loading failed for {}: {}", response.url, event.error_text);
                    if responses.send(response).is_err() {
                        break;
                    }
                }
            }
        }
    }
}

fn observed_response(event: &EventResponseReceived) -> InterceptedResponse {
    let headers = event
        .response
        .headers
        .inner()
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(name, value)| {
                    let value = value
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| value.to_string());
                    (name.to_ascii_lowercase(), value)
                })
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();

    let mut response = InterceptedResponse {
        url: event.response.url.clone(),
        status: u16::try_from(event.response.status).unwrap_or(0),
        headers,
        resource: if event.r#type == ResourceType::Document {
            ResourceKind::Document
        } else {
            ResourceKind::Other
        },
        body: None,
    };

    // Some servers omit content-type; Chrome still reports a mime type
    if response.content_type().is_none() && !event.response.mime_type.is_empty() {
        response
            .headers
            .insert("content-type".to_string(), event.response.mime_type.clone());
    }

    response
}

async fn read_body(page: &Page, request_id: RequestId) -> Option<String> {
    match page.execute(GetResponseBodyParams::new(request_id)).await {
        Ok(reply) => {
            if reply.result.base64_encoded {
                match base64::engine::general_purpose::STANDARD.decode(&reply.result.body) {
                    Ok(bytes) => String::from_utf8(bytes).ok(),
                    Err(e) => {
                        warn!("⚠️  Could not decode response body: {}", e);
                        None
                    }
                }
            } else {
                Some(reply.result.body.clone())
            }
        }
        Err(e) => {
            warn!("⚠️  Could not read response body: {}", e);
            None
        }
    }
}

async fn remove_profile(profile_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(profile_dir).await {
        debug!("Profile directory {} not removed: {}", profile_dir.display(), e);
    }
}
