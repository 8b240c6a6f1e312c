use std::collections::HashMap;
use tracing::{debug, info, warn};
use url::Url;

use crate::request::CapturedResponse;
use crate::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Main-frame navigation response
    Document,
    Other,
}

/// A network response observed while the page loads. `body` is only
/// populated for JSON-typed responses.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedResponse {
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub resource: ResourceKind,
    pub body: Option<String>,
}

impl InterceptedResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|ct| {
                let ct = ct.to_ascii_lowercase();
                ct.contains("application/json") || ct.contains("+json")
            })
            .unwrap_or(false)
    }

    fn into_captured(self) -> Result<CapturedResponse, String> {
        let body = self.body.ok_or_else(|| "response body unavailable".to_string())?;
        let data = serde_json::from_str(&body).map_err(|e| e.to_string())?;
        Ok(CapturedResponse {
            url: self.url,
            status: self.status,
            headers: self.headers,
            data,
        })
    }
}

/// Picks the target payload out of a page's response stream.
///
/// The first response whose URL matches the target and whose content-type
/// is JSON wins; everything offered afterwards is ignored. The first
/// main-document response is kept aside and used by [`finish`] when
/// nothing matched.
///
/// [`finish`]: ResponseInterceptor::finish
#[derive(Debug)]
pub struct ResponseInterceptor {
    target_raw: String,
    target: Url,
    captured: Option<CapturedResponse>,
    top_level: Option<InterceptedResponse>,
    observed: usize,
}

impl ResponseInterceptor {
    pub fn new(target_url: &str) -> Result<Self, RelayError> {
        let target = Url::parse(target_url).map_err(|e| RelayError::InvalidUrl {
            url: target_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            target_raw: target_url.to_string(),
            target,
            captured: None,
            top_level: None,
            observed: 0,
        })
    }

    /// Exact match, or same host with a path under the target's path
    pub fn matches_target(&self, url: &str) -> bool {
        if url == self.target_raw || url == self.target.as_str() {
            return true;
        }

        match Url::parse(url) {
            Ok(candidate) => {
                candidate.host_str() == self.target.host_str()
                    && candidate.path().starts_with(self.target.path())
            }
            Err(_) => false,
        }
    }

    /// Feed one response. Returns true once a capture exists.
    pub fn offer(&mut self, response: InterceptedResponse) -> bool {
        self.observed += 1;

        if self.captured.is_some() {
            return true;
        }

        if response.resource == ResourceKind::Document && self.top_level.is_none() {
            self.top_level = Some(response.clone());
        }

        if !self.matches_target(&response.url) {
            return false;
        }

        if !response.is_json() {
            debug!(
                "⏭️  Skipping non-JSON response for target: {} ({})",
                response.url,
                response.content_type().unwrap_or("no content-type")
            );
            return false;
        }

        let url = response.url.clone();
        match response.into_captured() {
            Ok(captured) => {
                info!("🎯 Captured target response: {} (HTTP {})", captured.url, captured.status);
                self.captured = Some(captured);
                true
            }
            Err(reason) => {
                warn!("⚠️  Matching response from {} could not be parsed: {}", url, reason);
                false
            }
        }
    }

    pub fn captured(&self) -> Option<&CapturedResponse> {
        self.captured.as_ref()
    }

    pub fn observed(&self) -> usize {
        self.observed
    }

    /// Resolve to the capture, else the top-level document if it is JSON
    pub fn finish(self) -> Result<CapturedResponse, RelayError> {
        if let Some(captured) = self.captured {
            return Ok(captured);
        }

        if let Some(top_level) = self.top_level {
            if top_level.is_json() {
                let url = top_level.url.clone();
                match top_level.into_captured() {
                    Ok(captured) => {
                        info!("🎯 Using top-level document response for {}", url);
                        return Ok(captured);
                    }
                    Err(reason) => warn!("⚠️  Top-level response from {} could not be parsed: {}", url, reason),
                }
            }
        }

        Err(RelayError::NoTargetDataCaptured { url: self.target_raw })
    }
}
