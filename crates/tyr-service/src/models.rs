//! Wire schemas for the intake API, reporting API, and Kafka topics
//! (spec.md §6). Kept separate from `tyr_types`' durable entities because
//! the HTTP boundary is more permissive than the broker/DB wire format —
//! in particular, `value` arrives as a JSON number here but travels the
//! broker and binds to Postgres as a decimal string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tyr_types::{deserialize_money_opt, Money};

#[derive(Debug, Deserialize)]
pub struct ClickCreateRequest {
    pub click_id: Option<Uuid>,
    pub campaign_id: Uuid,
    pub user_id: Uuid,
    pub click_date: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct ClickCreateResponse {
    pub click_id: Uuid,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ConversionCreateRequest {
    pub conversion_id: Option<Uuid>,
    pub user_id: Uuid,
    pub campaign_id: Uuid,
    pub conversion_date: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_money_opt")]
    pub value: Option<Money>,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct ConversionCreateResponse {
    pub conversion_id: Uuid,
    pub status: &'static str,
}

/// Kafka payload for the `CLICKS` topic: the request body plus the
/// assigned `click_id` and `created_at` (spec.md §6).
#[derive(Debug, Serialize, Deserialize)]
pub struct ClickMessage {
    pub click_id: Uuid,
    pub campaign_id: Uuid,
    pub user_id: Uuid,
    pub click_date: DateTime<Utc>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// Kafka payload for the `CONVERSIONS` topic. `value` serializes as a
/// decimal-formatted string via `Money`'s own `Serialize`/`Deserialize`
/// (the `rust_decimal` `serde-with-str` feature), so it survives the wire
/// exactly.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversionMessage {
    pub conversion_id: Uuid,
    pub campaign_id: Uuid,
    pub user_id: Uuid,
    pub conversion_date: DateTime<Utc>,
    pub value: Option<Money>,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CampaignStatisticsQuery {
    pub campaign_id: Uuid,
    #[serde(default)]
    pub group_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CalculateYesterdayMetricsResponse {
    pub message: String,
    pub status: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub database: HealthStatus,
    pub cache: HealthStatus,
}
