use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use browser_relay::{ChromiumEngine, ChromiumSettings, FetcherSettings, PageFetcher, RelayError};
use config_manager::SystemConfig;
use fallback_chain::FallbackChain;
use std::sync::Arc;
use std::time::{Duration, Instant};
use token_aggregator::{AggregateError, Aggregator, RelayFetcher};
use tokio::sync::broadcast::error::RecvError;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

mod extract;
mod handlers;
mod port;
mod types;

use handlers::*;
use types::*;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<PageFetcher>,
    pub aggregator: Arc<Aggregator>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(relay: Arc<PageFetcher>, aggregator: Arc<Aggregator>) -> Self {
        Self {
            relay,
            aggregator,
            started_at: Instant::now(),
        }
    }

    /// Wire the Chromium relay, the fallback chain and the aggregator
    pub fn from_config(config: &SystemConfig) -> anyhow::Result<Self> {
        let engine = Arc::new(ChromiumEngine::new(ChromiumSettings::from(&config.relay)));
        let relay = Arc::new(PageFetcher::new(engine, FetcherSettings::from(&config.relay)));

        let chain = Arc::new(FallbackChain::new(&config.fallback)?);
        let gmgn_relay = Arc::new(RelayFetcher::new(
            relay.clone(),
            Duration::from_millis(config.relay.gmgn_navigation_timeout_ms),
        ));
        let aggregator = Arc::new(Aggregator::from_config(config, chain, gmgn_relay));

        Ok(Self::new(relay, aggregator))
    }
}

/// Main application error type
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    #[error("failed to encode response: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::Relay(e) => (relay_status(e), e.kind()),
            ApiError::Aggregate(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.kind()),
            ApiError::Aggregate(e @ AggregateError::TokenNotFound(_)) => (StatusCode::NOT_FOUND, e.kind()),
            ApiError::Aggregate(e) => (StatusCode::BAD_GATEWAY, e.kind()),
            ApiError::UnknownMessageType(_) => (StatusCode::BAD_REQUEST, "UnknownMessageType"),
            ApiError::MalformedBody(_) => (StatusCode::BAD_REQUEST, "MalformedBody"),
            ApiError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Serialization"),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: self.to_string(),
            kind: Some(kind.to_string()),
            timestamp: chrono::Utc::now(),
        });

        (status, body).into_response()
    }
}

fn default_log_filter(debug_mode: bool) -> &'static str {
    if debug_mode {
        "debug"
    } else {
        "info,api_server=debug"
    }
}

fn init_tracing(json_logs: bool, debug_mode: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_log_filter(debug_mode).into());

    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Mirror relay lifecycle events into the log
fn spawn_event_logger(relay: &PageFetcher) {
    let mut events = relay.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(event = ?event, "relay event"),
                Err(RecvError::Lagged(skipped)) => warn!("⚠️  Relay event logger skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = SystemConfig::load()?;
    init_tracing(config.system.json_logs, config.system.debug_mode);

    info!("Starting PumpScope relay server...");
    info!("Configuration loaded successfully");

    let app_state = AppState::from_config(&config)?;
    info!("🌐 Relay ready (max {} concurrent browsers)", config.relay.max_concurrent_browsers);

    let _sweeper = app_state
        .aggregator
        .cache()
        .spawn_sweeper(Duration::from_secs(config.cache.sweep_interval_seconds));
    spawn_event_logger(&app_state.relay);

    let app = create_router(app_state);

    info!("📋 Available endpoints:");
    info!("   • POST / - Relay a URL through a headless browser");
    info!("   • POST /api/aggregate - All datasets for a token");
    info!("   • POST /api/gmgn - gmgn datasets for a token");
    info!("   • POST /api/message - Extension message surface");
    info!("   • GET /health - Health check");

    // Bind and serve
    let listener = match port::bind_with_reclaim(&config.api.host, config.api.port, config.api.reclaim_port).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("❌ Could not bind {}:{}: {:#}", config.api.host, config.api.port, e);
            std::process::exit(1);
        }
    };
    info!("🚀 Server listening on {}:{}", config.api.host, config.api.port);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(relay))
        .route("/health", get(health_check))
        .route("/api/aggregate", post(aggregate))
        .route("/api/gmgn", post(gmgn))
        .route("/api/message", post(message))
        // Add CORS middleware
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
        .with_state(state)
}
