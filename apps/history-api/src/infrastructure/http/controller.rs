//! HTTP Controller (Driver Adapter)
//!
//! Axum router delegating to the [`HistoryService`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{MatchedPath, Path, Query, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use serde::Deserialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::application::dto::{CandleRecord, CoinSummary, HistoryResponse};
use crate::application::services::HistoryService;
use crate::domain::candle::SeriesLookup;
use crate::error::HistoryError;
use crate::infrastructure::health::{self, HealthState};
use crate::infrastructure::metrics;

use super::response::ApiError;

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// History queries against the configured backend.
    pub history: HistoryService,
}

/// Optional query parameters of the history routes.
///
/// `limit` is kept raw so that malformed values fall back to the default.
#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    limit: Option<String>,
}

/// Create the HTTP router with all endpoints.
pub fn create_router(state: AppState, health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/api/v1/coins", get(list_coins))
        .route("/api/v1/history/{symbol}/{timeframe}", get(history))
        .route(
            "/api/v1/history/external_id/{id}/{timeframe}",
            get(history_by_external_id),
        )
        .route("/api/v1/history/zap_id/{id}/{timeframe}", get(history_by_zap_id))
        .with_state(state)
        .merge(health::router(health_state))
        .route_layer(middleware::from_fn(track_request))
}

async fn track_request(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_string(), |p| p.as_str().to_string());
    let span = tracing::info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        route = %route,
    );

    let response = next.run(request).instrument(span.clone()).await;
    metrics::record_request(&route, response.status().as_u16());
    span.in_scope(|| tracing::debug!(status = response.status().as_u16(), "Request served"));
    response
}

async fn list_coins(State(state): State<AppState>) -> Result<Json<Vec<CoinSummary>>, ApiError> {
    Ok(Json(state.history.coins().await?))
}

async fn history(
    State(state): State<AppState>,
    Path((symbol, timeframe)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let response = state
        .history
        .history(&symbol, &timeframe, query.limit.as_deref())
        .await?;
    Ok(Json(response))
}

async fn history_by_external_id(
    State(state): State<AppState>,
    Path((id, timeframe)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<CandleRecord>>, ApiError> {
    let records = state
        .history
        .history_by_id(SeriesLookup::ExternalId(id), &timeframe, query.limit.as_deref())
        .await?;
    Ok(Json(records))
}

async fn history_by_zap_id(
    State(state): State<AppState>,
    Path((id, timeframe)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<CandleRecord>>, ApiError> {
    let zap_id: i64 = id
        .parse()
        .map_err(|_| HistoryError::Validation(format!("Invalid zap_id: {id}")))?;
    let records = state
        .history
        .history_by_id(SeriesLookup::ZapId(zap_id), &timeframe, query.limit.as_deref())
        .await?;
    Ok(Json(records))
}
