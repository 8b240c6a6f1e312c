use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use browser_relay::{CapturedResponse, ChromiumEngine, ChromiumSettings, FetchRequest, FetcherSettings, PageFetcher};
use config_manager::SystemConfig;
use fallback_chain::{FallbackChain, UpstreamRequest};
use token_aggregator::{Aggregator, RelayFetcher};

mod cli;

use cli::{Cli, Command};

fn relay_fetcher(config: &SystemConfig) -> Arc<PageFetcher> {
    let engine = Arc::new(ChromiumEngine::new(ChromiumSettings::from(&config.relay)));
    Arc::new(PageFetcher::new(engine, FetcherSettings::from(&config.relay)))
}

/// The captured payload, with the caller's data type label alongside
fn relay_output(data_type: Option<String>, captured: CapturedResponse) -> serde_json::Value {
    serde_json::json!({
        "dataType": data_type,
        "response": captured,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,pumpscope=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SystemConfig::load_from_path(&cli.config)?;

    let output = match cli.command {
        Command::Aggregate { address } => {
            info!("🔍 Aggregating {}", address);
            let chain = Arc::new(FallbackChain::new(&config.fallback)?);
            let relay = Arc::new(RelayFetcher::new(
                relay_fetcher(&config),
                Duration::from_millis(config.relay.gmgn_navigation_timeout_ms),
            ));
            let aggregator = Aggregator::from_config(&config, chain, relay);
            serde_json::to_value(aggregator.aggregate(&address).await)?
        }
        Command::Relay { url, data_type } => {
            info!("🌐 Relaying {}", url);
            let request = FetchRequest::with_params(&url, data_type.clone(), &Default::default())?;
            let captured = relay_fetcher(&config).fetch(&request).await?;
            relay_output(data_type, captured)
        }
        Command::Fetch { url } => {
            info!("🔁 Fetching {} through the fallback chain", url);
            let chain = FallbackChain::new(&config.fallback)?;
            let fetched = chain.fetch_json(&UpstreamRequest::get(url)).await?;
            info!("Served by {} after {} attempt(s)", fetched.source, fetched.attempts);
            fetched.value
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
