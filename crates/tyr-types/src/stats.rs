use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Reporting granularity for `GET /api/campaign-statistics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Daily,
    Weekly,
    Monthly,
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!(
                "invalid group_by parameter: {other}. Must be daily, weekly, or monthly"
            )),
        }
    }
}

impl Default for GroupBy {
    fn default() -> Self {
        Self::Daily
    }
}

/// One row of a campaign statistics series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsDataItem {
    pub period: String,
    pub total_clicks: i64,
    pub total_conversions: i64,
    pub total_value: Money,
    pub conversion_rate: f64,
}

impl StatisticsDataItem {
    /// `conversion_rate = (conversions / clicks) * 100`, or `0` when there
    /// were no clicks.
    pub fn conversion_rate(total_clicks: i64, total_conversions: i64) -> f64 {
        if total_clicks == 0 {
            0.0
        } else {
            (total_conversions as f64 / total_clicks as f64) * 100.0
        }
    }
}

/// `GET /api/campaign-statistics` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStatisticsResponse {
    pub campaign_id: uuid::Uuid,
    pub group_by: String,
    pub data: Vec<StatisticsDataItem>,
}
