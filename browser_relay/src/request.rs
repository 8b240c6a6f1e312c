use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use url::Url;

use crate::RelayError;

/// One relay call. Built per inbound request and dropped afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    target: Url,
    data_type: Option<String>,
}

impl FetchRequest {
    pub fn new(target_url: &str) -> Result<Self, RelayError> {
        Self::with_params(target_url, None, &HashMap::new())
    }

    /// `extra_params` are appended to the target's query string
    pub fn with_params(
        target_url: &str,
        data_type: Option<String>,
        extra_params: &HashMap<String, String>,
    ) -> Result<Self, RelayError> {
        let trimmed = target_url.trim();
        if trimmed.is_empty() {
            return Err(RelayError::MissingParameter);
        }

        let mut target = Url::parse(trimmed).map_err(|e| RelayError::InvalidUrl {
            url: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(target.scheme(), "http" | "https") {
            return Err(RelayError::InvalidUrl {
                url: trimmed.to_string(),
                reason: format!("unsupported scheme '{}'", target.scheme()),
            });
        }

        if !extra_params.is_empty() {
            // Sorted so the resulting URL is stable
            let sorted: BTreeMap<_, _> = extra_params.iter().collect();
            let mut pairs = target.query_pairs_mut();
            for (name, value) in sorted {
                pairs.append_pair(name, value);
            }
        }

        Ok(Self {
            target,
            data_type: data_type.filter(|d| !d.is_empty()),
        })
    }

    pub fn target_url(&self) -> &str {
        self.target.as_str()
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn data_type(&self) -> Option<&str> {
        self.data_type.as_deref()
    }

    /// Headers that make the request look like it came from the target site
    pub fn site_headers(&self) -> Vec<(String, String)> {
        let origin = self.target.origin().ascii_serialization();
        vec![
            ("Accept".to_string(), "application/json".to_string()),
            ("Origin".to_string(), origin.clone()),
            ("Referer".to_string(), format!("{}/", origin)),
            (
                "sec-ch-ua".to_string(),
                "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"".to_string(),
            ),
            ("sec-ch-ua-mobile".to_string(), "?0".to_string()),
            ("sec-ch-ua-platform".to_string(), "\"Windows\"".to_string()),
        ]
    }
}

/// The JSON payload lifted out of the page's network traffic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub url: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_url_is_missing_parameter() {
        assert_eq!(FetchRequest::new("   ").unwrap_err(), RelayError::MissingParameter);
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let err = FetchRequest::new("file:///etc/passwd").unwrap_err();
        assert_eq!(err.kind(), "InvalidUrl");
    }

    #[test]
    fn test_extra_params_appended_in_order() {
        let mut params = HashMap::new();
        params.insert("tag".to_string(), "creator".to_string());
        params.insert("limit".to_string(), "100".to_string());

        let request = FetchRequest::with_params("https://gmgn.ai/api/v1/token_trades/sol/abc?app_lang=en", Some("devTrades".to_string()), &params).unwrap();

        assert_eq!(
            request.target_url(),
            "https://gmgn.ai/api/v1/token_trades/sol/abc?app_lang=en&limit=100&tag=creator"
        );
        assert_eq!(request.data_type(), Some("devTrades"));
    }

    #[test]
    fn test_site_headers_follow_target_origin() {
        let request = FetchRequest::new("https://gmgn.ai/api/v1/token_stat/sol/abc").unwrap();
        let headers = request.site_headers();
        assert!(headers.contains(&("Origin".to_string(), "https://gmgn.ai".to_string())));
        assert!(headers.contains(&("Referer".to_string(), "https://gmgn.ai/".to_string())));
    }
}
