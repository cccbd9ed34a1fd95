use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

/// Database row — `campaign` table.
///
/// Invariant: any `campaign_id` referenced by a click or conversion event
/// must exist here; the journal builder materializes a placeholder row
/// (`Name = "Campaign <first-8-chars-of-ID>"`) the first time it sees an
/// otherwise-unknown campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn placeholder(id: Uuid, created_at: DateTime<Utc>) -> Self {
        let full = id.to_string();
        Self {
            id,
            name: format!("Campaign {}", &full[..8]),
            created_at,
        }
    }
}

/// Database row — `click_event` table. Immutable after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub click_id: Uuid,
    pub campaign_id: Uuid,
    pub user_id: Uuid,
    pub click_date: DateTime<Utc>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// Database row — `conversion_event` table. Every field but `click_id` is
/// immutable after insert; `click_id` transitions exactly once, from `None`
/// to `Some(_)`, when the attribution engine finds a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionEvent {
    pub conversion_id: Uuid,
    pub campaign_id: Uuid,
    pub user_id: Uuid,
    pub click_id: Option<Uuid>,
    pub conversion_date: DateTime<Utc>,
    pub value: Option<Money>,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// Database row — `campaign_journal` table, unique per (`campaign_id`, `date`).
///
/// `total_conversion_value` is `None` when the journal builder has never run
/// for that day — distinct from `Some(Decimal::ZERO)`, which means it ran
/// and found no attributed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignJournal {
    pub campaign_journal_id: Uuid,
    pub campaign_id: Uuid,
    pub date: NaiveDate,
    pub number_of_click: Option<i64>,
    pub number_of_conversion: Option<i64>,
    pub total_conversion_value: Option<Money>,
    pub created_at: DateTime<Utc>,
}
