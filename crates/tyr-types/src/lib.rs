//! Shared data model for the click/conversion attribution pipeline.
//!
//! Mirrors the Postgres schema (`campaign`, `click_event`, `conversion_event`,
//! `campaign_journal`) and the JSON wire format used on the HTTP intake, the
//! Kafka topics, and the reporting API.

mod entity;
mod error;
mod money;
mod stats;

pub use entity::{Campaign, CampaignJournal, ClickEvent, ConversionEvent};
pub use error::TyrError;
pub use money::{deserialize_money_opt, normalize_scale, Money};
pub use stats::{CampaignStatisticsResponse, GroupBy, StatisticsDataItem};
