use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use tyr_types::{Campaign, CampaignJournal, ClickEvent, ConversionEvent, GroupBy, Money,
    StatisticsDataItem, TyrError};

/// Durable storage for immutable click events and the attribution lookup.
#[async_trait]
pub trait ClickStore: Send + Sync {
    /// Insert a click. A primary-key collision (redelivery of the same
    /// `click_id`) is treated as success, not an error.
    async fn insert(&self, click: &ClickEvent) -> Result<(), TyrError>;

    /// The attribution lookup (spec.md §4.3): the click matching
    /// `campaign_id`/`user_id`/`source` whose `click_date` falls in
    /// `[conversion_date - window, conversion_date + window]`, ordered by
    /// `click_date DESC` (ties broken by `click_id DESC` for a
    /// deterministic, if arbitrary, tiebreak).
    async fn find_for_attribution(
        &self,
        campaign_id: Uuid,
        user_id: Uuid,
        source: &str,
        conversion_date: chrono::DateTime<chrono::Utc>,
        window_hours: i64,
    ) -> Result<Option<ClickEvent>, TyrError>;

    /// Distinct campaigns with at least one click on `day` — the journal
    /// builder's seed set (spec.md §4.4, with its documented limitation:
    /// campaigns with conversions but no clicks are not included).
    async fn distinct_campaigns_with_clicks_on(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<Uuid>, TyrError>;
}

/// Durable storage for conversion events, mutable only in their `click_id`.
#[async_trait]
pub trait ConversionStore: Send + Sync {
    /// Insert a conversion with `click_id` absent. PK collision on
    /// redelivery is treated as success.
    async fn insert(&self, conversion: &ConversionEvent) -> Result<(), TyrError>;

    /// Set `click_id` on a previously-inserted, not-yet-attributed
    /// conversion. Not wrapped in a transaction with the insert or the
    /// lookup (spec.md §5) — a crash between the three leaves an
    /// unattributed row, which is tolerable and self-healing.
    async fn set_click_id(&self, conversion_id: Uuid, click_id: Uuid) -> Result<(), TyrError>;

    /// Sum of `value` across conversions for `campaign_id` whose
    /// `conversion_date` falls on `day` and whose `click_id` is non-null.
    /// `0` when there are none.
    async fn sum_attributed_value(
        &self,
        campaign_id: Uuid,
        day: NaiveDate,
    ) -> Result<Money, TyrError>;
}

/// Durable storage for the `campaign` table.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn get(&self, campaign_id: Uuid) -> Result<Option<Campaign>, TyrError>;

    /// Create a campaign row. Used both by the intake's implicit campaign
    /// creation path (none — campaigns are created lazily by the journal
    /// builder) and by the journal builder's placeholder-materialization
    /// rule (spec.md §3).
    async fn create(&self, campaign: &Campaign) -> Result<(), TyrError>;

    async fn ensure_exists(&self, campaign_id: Uuid, now: chrono::DateTime<chrono::Utc>) -> Result<(), TyrError> {
        if self.get(campaign_id).await?.is_some() {
            return Ok(());
        }
        self.create(&Campaign::placeholder(campaign_id, now)).await
    }
}

/// Durable storage for the `campaign_journal` rollup table.
#[async_trait]
pub trait JournalStore: Send + Sync {
    async fn get(
        &self,
        campaign_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<CampaignJournal>, TyrError>;

    /// Insert or update the (`campaign_id`, `date`) row's three metric
    /// fields (spec.md §4.4's upsert rule).
    async fn upsert(&self, journal: &CampaignJournal) -> Result<(), TyrError>;

    /// Historical series for the statistics assembler (spec.md §4.5):
    /// rows strictly before `today`, grouped/limited per `group_by`.
    async fn historical(
        &self,
        campaign_id: Uuid,
        group_by: GroupBy,
        today: NaiveDate,
    ) -> Result<Vec<StatisticsDataItem>, TyrError>;
}
