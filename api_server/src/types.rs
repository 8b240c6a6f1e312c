use browser_relay::CapturedResponse;
use chrono::{DateTime, Utc};
use fallback_chain::Source;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use token_aggregator::DatasetOutcome;

/// Standard API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub cache_entries: usize,
}

/// Body of `POST /`. `url` and `targetUrl` are interchangeable.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub url: Option<String>,
    pub target_url: Option<String>,
    pub data_type: Option<String>,
    #[serde(default)]
    pub extra_params: HashMap<String, String>,
}

impl RelayRequest {
    pub fn target<'a>(&'a self) -> Option<&'a str> {
        let given = |field: &'a Option<String>| -> Option<&'a str> {
            field
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
        };
        given(&self.url).or_else(|| given(&self.target_url))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySuccess {
    pub success: bool,
    pub source: Source,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub data_type: Option<String>,
    pub response: CapturedResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayFailure {
    pub success: bool,
    pub source: Source,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub data_type: Option<String>,
    pub error: String,
    pub kind: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddressRequest {
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GmgnResponse {
    pub success: bool,
    pub data: BTreeMap<String, DatasetOutcome>,
    pub timestamp: DateTime<Utc>,
}

/// Extension-style message envelope for `POST /api/message`
#[derive(Debug, Default, Deserialize)]
pub struct MessageRequest {
    #[serde(rename = "type", default)]
    pub message_type: String,
    pub address: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Value>>,
    pub timestamp: DateTime<Utc>,
}

impl MessageResponse {
    pub fn data(data: Value) -> Self {
        Self {
            success: true,
            data,
            transactions: None,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_request_accepts_either_url_field() {
        let by_url: RelayRequest = serde_json::from_str(r#"{"url":"https://a.example/x"}"#).unwrap();
        let by_target: RelayRequest =
            serde_json::from_str(r#"{"targetUrl":" https://a.example/y ","dataType":"holders"}"#).unwrap();
        let blank: RelayRequest = serde_json::from_str(r#"{"url":"   "}"#).unwrap();

        assert_eq!(by_url.target(), Some("https://a.example/x"));
        assert_eq!(by_target.target(), Some("https://a.example/y"));
        assert_eq!(by_target.data_type.as_deref(), Some("holders"));
        assert_eq!(blank.target(), None);
    }

    #[test]
    fn test_blank_url_falls_through_to_target_url() {
        let request: RelayRequest =
            serde_json::from_str(r#"{"url":"  ","targetUrl":"https://gmgn.ai/x"}"#).unwrap();
        assert_eq!(request.target(), Some("https://gmgn.ai/x"));
    }
}
