use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use browser_relay::{FetchRequest, RelayError};
use chrono::Utc;
use fallback_chain::Source;
use token_aggregator::Aggregator;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::extract::JsonBody;
use crate::types::*;
use crate::{ApiError, AppState};

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        cache_entries: state.aggregator.cache().len(),
    })
}

/// Relay a target URL through a fresh headless browser
pub async fn relay(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RelayRequest>,
) -> Result<Response, ApiError> {
    let target = request.target().ok_or(ApiError::Relay(RelayError::MissingParameter))?;
    let fetch_request = FetchRequest::with_params(target, request.data_type.clone(), &request.extra_params)?;

    let request_id = Uuid::new_v4();
    info!("📥 [{}] Relay request for {}", request_id, fetch_request.target_url());

    match state.relay.fetch(&fetch_request).await {
        Ok(captured) => {
            info!("📤 [{}] Relayed HTTP {} from {}", request_id, captured.status, captured.url);
            Ok(Json(RelaySuccess {
                success: true,
                source: Source::Relay,
                url: fetch_request.target_url().to_string(),
                timestamp: Utc::now(),
                data_type: request.data_type,
                response: captured,
            })
            .into_response())
        }
        Err(e) => {
            error!("❌ [{}] Relay failed ({}): {}", request_id, e.kind(), e);
            let body = RelayFailure {
                success: false,
                source: Source::Relay,
                url: fetch_request.target_url().to_string(),
                timestamp: Utc::now(),
                data_type: request.data_type,
                error: e.to_string(),
                kind: e.kind().to_string(),
            };
            Ok((relay_status(&e), Json(body)).into_response())
        }
    }
}

pub fn relay_status(error: &RelayError) -> StatusCode {
    match error {
        RelayError::MissingParameter | RelayError::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
        RelayError::NavigationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        RelayError::NoTargetDataCaptured { .. } | RelayError::Browser(_) => StatusCode::BAD_GATEWAY,
        RelayError::BrowserLaunch(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Every dataset for one token
pub async fn aggregate(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<AddressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let address = Aggregator::validate_address(request.address.as_deref().unwrap_or_default())?;
    Ok(Json(state.aggregator.aggregate(&address).await))
}

/// The four gmgn datasets for one token
pub async fn gmgn(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<AddressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let address = request.address.as_deref().unwrap_or_default();
    let data = state.aggregator.aggregate_gmgn(address).await?;

    let success = data.values().any(|outcome| outcome.success);
    if !success {
        warn!("⚠️  No gmgn dataset could be fetched for {}", address);
    }

    Ok(Json(GmgnResponse {
        success,
        data,
        timestamp: Utc::now(),
    }))
}

/// Extension message surface
pub async fn message(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<MessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!("📨 Message {}", request.message_type);

    let address = || request.address.as_deref().unwrap_or_default();
    let aggregator = &state.aggregator;

    let response = match request.message_type.as_str() {
        "FETCH_PUMP_FUN" => MessageResponse::data(aggregator.token_search(address()).await?.value),
        "FETCH_TRADE_INFO" => MessageResponse::data(aggregator.trade_info(address()).await?),
        "FETCH_DEV_INFO" => MessageResponse::data(aggregator.dev_info(address()).await?.value),
        "FETCH_SMART_MONEY" => {
            let feed = aggregator.smart_money(address()).await?;
            MessageResponse {
                success: true,
                data: feed.data,
                transactions: Some(feed.transactions),
                timestamp: Utc::now(),
            }
        }
        "FETCH_CHAIN_FM" => {
            let url = request.url.as_deref().unwrap_or_default();
            MessageResponse::data(aggregator.fetch_url(url, &request.params).await?.value)
        }
        "FETCH_GMGN_DATA" => {
            let data = aggregator.aggregate_gmgn(address()).await?;
            MessageResponse::data(serde_json::to_value(data)?)
        }
        other => {
            warn!("⚠️  Unknown message type: {}", other);
            return Err(ApiError::UnknownMessageType(other.to_string()));
        }
    };

    Ok(Json(response))
}
