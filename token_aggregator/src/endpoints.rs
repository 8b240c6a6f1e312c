use serde_json::{json, Value};
use url::Url;

use config_manager::UpstreamConfig;
use fallback_chain::UpstreamRequest;

use crate::AggregateError;

/// The four gmgn token endpoints served through the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GmgnDataset {
    HolderStats,
    WalletTags,
    TopHolders,
    DevTrades,
}

impl GmgnDataset {
    pub const ALL: [GmgnDataset; 4] = [
        GmgnDataset::HolderStats,
        GmgnDataset::WalletTags,
        GmgnDataset::TopHolders,
        GmgnDataset::DevTrades,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            GmgnDataset::HolderStats => "holderStats",
            GmgnDataset::WalletTags => "walletTags",
            GmgnDataset::TopHolders => "topHolders",
            GmgnDataset::DevTrades => "devTrades",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            GmgnDataset::HolderStats => "token_stat",
            GmgnDataset::WalletTags => "token_wallet_tags_stat",
            GmgnDataset::TopHolders => "mutil_window_token_security_launchpad",
            GmgnDataset::DevTrades => "token_trades",
        }
    }
}

/// Builds upstream request URLs from the configured base URLs
#[derive(Debug, Clone)]
pub struct Endpoints {
    upstream: UpstreamConfig,
}

impl Endpoints {
    pub fn new(upstream: UpstreamConfig) -> Self {
        Self { upstream }
    }

    fn base(raw: &str) -> &str {
        raw.trim_end_matches('/')
    }

    fn parse(raw: String) -> Result<Url, AggregateError> {
        Url::parse(&raw).map_err(|e| AggregateError::InvalidAddress(format!("{}: {}", raw, e)))
    }

    /// pump.fun exact-match coin search
    pub fn token_search(&self, address: &str) -> Result<UpstreamRequest, AggregateError> {
        let mut url = Self::parse(format!(
            "{}/coins/search",
            Self::base(&self.upstream.pump_fun_base_url)
        ))?;
        url.query_pairs_mut()
            .append_pair("offset", "0")
            .append_pair("limit", "50")
            .append_pair("sort", "market_cap")
            .append_pair("includeNsfw", "false")
            .append_pair("order", "DESC")
            .append_pair("searchTerm", address)
            .append_pair("type", "exact");
        Ok(self.pump_fun_request(url))
    }

    /// Coins created by `creator` on pump.fun
    pub fn dev_tokens(&self, creator: &str) -> Result<UpstreamRequest, AggregateError> {
        let mut url = Self::parse(format!(
            "{}/coins/user-created-coins/{}",
            Self::base(&self.upstream.pump_fun_base_url),
            creator
        ))?;
        url.query_pairs_mut()
            .append_pair("offset", "0")
            .append_pair("limit", &self.upstream.dev_tokens_limit.to_string())
            .append_pair("includeNsfw", "false");
        Ok(self.pump_fun_request(url))
    }

    fn pump_fun_request(&self, url: Url) -> UpstreamRequest {
        let site = Self::base(&self.upstream.pump_fun_base_url).replace("frontend-api-v3.", "www.");
        UpstreamRequest::get(url.to_string())
            .with_header("Accept", "*/*")
            .with_header("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8")
            .with_header("Origin", site.clone())
            .with_header("Referer", format!("{}/", site))
    }

    /// gmgn token endpoint with the fixed client query parameters
    pub fn gmgn(&self, dataset: GmgnDataset, address: &str) -> Result<String, AggregateError> {
        let gmgn = &self.upstream.gmgn;
        let mut url = Self::parse(format!(
            "{}/api/v1/{}/sol/{}",
            Self::base(&self.upstream.gmgn_base_url),
            dataset.path(),
            address
        ))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("device_id", &gmgn.device_id)
                .append_pair("client_id", &gmgn.client_id)
                .append_pair("from_app", &gmgn.from_app)
                .append_pair("app_ver", &gmgn.app_ver)
                .append_pair("tz_name", &gmgn.tz_name)
                .append_pair("tz_offset", &gmgn.tz_offset.to_string())
                .append_pair("app_lang", &gmgn.app_lang);
            if dataset == GmgnDataset::DevTrades {
                pairs.append_pair("limit", "100").append_pair("tag", "creator");
            }
        }
        Ok(url.to_string())
    }

    /// chain.fm smart-money feed (tRPC batch envelope)
    pub fn smart_money(&self, token: &str) -> Result<UpstreamRequest, AggregateError> {
        let input = json!({
            "0": {
                "json": {
                    "page": 1,
                    "pageSize": self.upstream.smart_money_page_size,
                    "dateRange": null,
                    "token": token,
                    "address": [],
                    "useFollowing": true,
                    "includeChannels": [],
                    "lastUpdateTime": null,
                    "events": []
                },
                "meta": {
                    "values": {
                        "dateRange": ["undefined"],
                        "lastUpdateTime": ["undefined"]
                    }
                }
            }
        });
        let url = self.trpc_url(
            &self.upstream.chain_fm_base_url,
            "parsedTransaction.list",
            &[("batch", "1")],
            &input,
        )?;
        Ok(UpstreamRequest::get(url)
            .with_header("Accept", "application/json")
            .with_header("Content-Type", "application/json"))
    }

    /// pump.news top tweets mentioning the token
    pub fn social_info(&self, address: &str) -> Result<UpstreamRequest, AggregateError> {
        let input = json!({
            "json": {
                "tokenAddress": address,
                "type": "filter",
                "category": "top"
            }
        });
        let url = self.trpc_url(
            &self.upstream.pump_news_base_url,
            "tweets.getTweetsByTokenAddress",
            &[],
            &input,
        )?;
        Ok(UpstreamRequest::get(url).with_header("Accept", "application/json"))
    }

    fn trpc_url(
        &self,
        base_url: &str,
        procedure: &str,
        leading: &[(&str, &str)],
        input: &Value,
    ) -> Result<String, AggregateError> {
        let mut url = Self::parse(format!("{}/api/trpc/{}", Self::base(base_url), procedure))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in leading {
                pairs.append_pair(name, value);
            }
            pairs.append_pair("input", &input.to_string());
        }
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_manager::SystemConfig;

    fn endpoints() -> Endpoints {
        Endpoints::new(SystemConfig::default().upstream)
    }

    #[test]
    fn test_token_search_url() {
        let request = endpoints().token_search("Mint111").unwrap();
        assert_eq!(
            request.url,
            "https://frontend-api-v3.pump.fun/coins/search?offset=0&limit=50&sort=market_cap&includeNsfw=false&order=DESC&searchTerm=Mint111&type=exact"
        );
        assert_eq!(request.header("Origin"), Some("https://www.pump.fun"));
    }

    #[test]
    fn test_dev_tokens_url_uses_configured_limit() {
        let request = endpoints().dev_tokens("Creator1").unwrap();
        assert_eq!(
            request.url,
            "https://frontend-api-v3.pump.fun/coins/user-created-coins/Creator1?offset=0&limit=10&includeNsfw=false"
        );
    }

    #[test]
    fn test_gmgn_urls_carry_client_params() {
        let url = endpoints().gmgn(GmgnDataset::HolderStats, "Mint111").unwrap();
        assert!(url.starts_with("https://gmgn.ai/api/v1/token_stat/sol/Mint111?device_id="));
        assert!(url.contains("tz_name=Asia%2FShanghai"));
        assert!(url.contains("tz_offset=28800"));
        assert!(!url.contains("tag=creator"));

        let trades = endpoints().gmgn(GmgnDataset::DevTrades, "Mint111").unwrap();
        assert!(trades.contains("/token_trades/sol/Mint111"));
        assert!(trades.ends_with("&limit=100&tag=creator"));
    }

    #[test]
    fn test_smart_money_envelope() {
        let request = endpoints().smart_money("Mint111").unwrap();
        let url = Url::parse(&request.url).unwrap();
        assert_eq!(url.path(), "/api/trpc/parsedTransaction.list");

        let input = url
            .query_pairs()
            .find(|(name, _)| name == "input")
            .map(|(_, value)| value.into_owned())
            .unwrap();
        let envelope: Value = serde_json::from_str(&input).unwrap();
        assert_eq!(envelope["0"]["json"]["token"], "Mint111");
        assert_eq!(envelope["0"]["json"]["pageSize"], 30);
        assert_eq!(envelope["0"]["meta"]["values"]["dateRange"][0], "undefined");
        assert!(request.targets_chain_fm());
    }

    #[test]
    fn test_social_info_input() {
        let request = endpoints().social_info("Mint111").unwrap();
        assert!(request
            .url
            .starts_with("https://www.pump.news/api/trpc/tweets.getTweetsByTokenAddress?input="));
        assert!(request.url.contains("tokenAddress"));
    }
}
