//! HTTP handlers for the intake and reporting APIs (spec.md §4.1, §4.5,
//! §6). Mirrors the teacher's `app-rs/src/handlers.rs` shape: thin
//! validate-then-delegate bodies, `{"detail": ...}` error payloads, and a
//! `http_requests_total{handler,method,status_code}` counter per route.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use tyr_types::{GroupBy, TyrError};

use crate::error::ApiError;
use crate::models::{
    CalculateYesterdayMetricsResponse, CampaignStatisticsQuery, ClickCreateRequest, ClickCreateResponse,
    ClickMessage, ConversionCreateRequest, ConversionCreateResponse, ConversionMessage, HealthResponse,
    HealthStatus,
};
use crate::state::AppState;

fn require_non_empty(value: &str, field: &str) -> Result<(), TyrError> {
    if value.trim().is_empty() {
        Err(TyrError::validation(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

// ── POST /api/clicks ─────────────────────────────────────────────────────

pub async fn create_click(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClickCreateRequest>,
) -> Result<Response, ApiError> {
    require_non_empty(&req.source, "source")?;

    let click_id = req.click_id.unwrap_or_else(Uuid::new_v4);
    let message = ClickMessage {
        click_id,
        campaign_id: req.campaign_id,
        user_id: req.user_id,
        click_date: req.click_date,
        source: req.source,
        created_at: Utc::now(),
    };

    match tyr_broker::publish(
        &state.kafka_producer,
        &state.config.kafka.click_topic,
        &click_id.to_string(),
        &message,
    )
    .await
    {
        Ok(()) => {
            state
                .metrics
                .publish_total
                .with_label_values(&[&state.config.kafka.click_topic])
                .inc();
            state
                .metrics
                .http_requests_total
                .with_label_values(&["click-create", "POST", "201"])
                .inc();
            Ok((StatusCode::CREATED, Json(ClickCreateResponse { click_id, status: "success" })).into_response())
        }
        Err(e) => {
            state
                .metrics
                .publish_failures_total
                .with_label_values(&[&state.config.kafka.click_topic])
                .inc();
            Err(TyrError::TransientBackend(e).into())
        }
    }
}

// ── POST /api/conversions ────────────────────────────────────────────────

pub async fn create_conversion(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConversionCreateRequest>,
) -> Result<Response, ApiError> {
    require_non_empty(&req.source, "source")?;
    require_non_empty(&req.kind, "type")?;

    let conversion_id = req.conversion_id.unwrap_or_else(Uuid::new_v4);
    let message = ConversionMessage {
        conversion_id,
        campaign_id: req.campaign_id,
        user_id: req.user_id,
        conversion_date: req.conversion_date,
        value: req.value,
        kind: req.kind,
        source: req.source,
        created_at: Utc::now(),
    };

    match tyr_broker::publish(
        &state.kafka_producer,
        &state.config.kafka.conversion_topic,
        &conversion_id.to_string(),
        &message,
    )
    .await
    {
        Ok(()) => {
            state
                .metrics
                .publish_total
                .with_label_values(&[&state.config.kafka.conversion_topic])
                .inc();
            state
                .metrics
                .http_requests_total
                .with_label_values(&["conversion-create", "POST", "201"])
                .inc();
            Ok((
                StatusCode::CREATED,
                Json(ConversionCreateResponse { conversion_id, status: "success" }),
            )
                .into_response())
        }
        Err(e) => {
            state
                .metrics
                .publish_failures_total
                .with_label_values(&[&state.config.kafka.conversion_topic])
                .inc();
            Err(TyrError::TransientBackend(e).into())
        }
    }
}

// ── POST /api/calculate-yesterday-metrics ────────────────────────────────

pub async fn calculate_yesterday_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CalculateYesterdayMetricsResponse>, ApiError> {
    let rolled_up = tyr_engine::run_daily_rollup(
        state.click_store.as_ref(),
        state.campaign_store.as_ref(),
        state.conversion_store.as_ref(),
        state.journal_store.as_ref(),
        state.counter_cache.as_ref(),
        &state.clock,
    )
    .await?;

    state.metrics.journal_rollups_total.inc_by(rolled_up as u64);
    state
        .metrics
        .http_requests_total
        .with_label_values(&["calculate-yesterday-metrics", "POST", "200"])
        .inc();

    Ok(Json(CalculateYesterdayMetricsResponse {
        message: format!("rolled up {rolled_up} campaign(s)"),
        status: "success",
    }))
}

// ── GET /api/campaign-statistics ─────────────────────────────────────────

pub async fn campaign_statistics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CampaignStatisticsQuery>,
) -> Result<Json<tyr_types::CampaignStatisticsResponse>, ApiError> {
    let group_by = match query.group_by {
        Some(raw) => GroupBy::from_str(&raw).map_err(TyrError::validation)?,
        None => GroupBy::default(),
    };

    let response = tyr_engine::get_campaign_statistics(
        state.journal_store.as_ref(),
        state.conversion_store.as_ref(),
        state.counter_cache.as_ref(),
        query.campaign_id,
        group_by,
        &state.clock,
    )
    .await?;

    state
        .metrics
        .http_requests_total
        .with_label_values(&["campaign-statistics", "GET", "200"])
        .inc();

    Ok(Json(response))
}

// ── GET /health ───────────────────────────────────────────────────────────

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let cache_status = match state.counter_cache.ping().await {
        Ok(()) => HealthStatus::Healthy,
        Err(_) => HealthStatus::Unhealthy,
    };

    // The store traits don't expose a raw ping; a cheap historical query
    // against a campaign that cannot exist doubles as a DB reachability
    // check without a direct `sqlx::PgPool` dependency in this module.
    let db_status = match state
        .journal_store
        .historical(Uuid::nil(), GroupBy::Daily, Utc::now().date_naive())
        .await
    {
        Ok(_) => HealthStatus::Healthy,
        Err(_) => HealthStatus::Unhealthy,
    };

    let overall = if db_status == HealthStatus::Healthy && cache_status == HealthStatus::Healthy {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };

    Json(HealthResponse {
        status: overall,
        database: db_status,
        cache: cache_status,
    })
}

// ── GET /metrics ──────────────────────────────────────────────────────────

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    crate::metrics::gather(&state.registry)
}
