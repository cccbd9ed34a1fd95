use chrono::NaiveDate;
use mockable::Clock;
use tyr_cache::CounterCache;
use tyr_store::{CampaignStore, ClickStore, ConversionStore, JournalStore};
use tyr_types::CampaignJournal;
use uuid::Uuid;

/// Build (or rebuild) the `campaign_journal` row for one campaign on `day`
/// (spec.md §4.4, step 2): ensure the campaign exists, read counts from the
/// cache (miss counted as 0), compute the exact attributed conversion value
/// from the event store, and upsert.
///
/// Re-running for the same day with no new events reproduces the same row
/// (spec.md §8's idempotence property), since every input here is either a
/// pure read or a cache read with no side effect on the counters themselves.
pub async fn build_journal_for_campaign(
    campaign_store: &dyn CampaignStore,
    conversion_store: &dyn ConversionStore,
    journal_store: &dyn JournalStore,
    counter_cache: &dyn CounterCache,
    campaign_id: Uuid,
    day: NaiveDate,
    now: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<CampaignJournal> {
    campaign_store.ensure_exists(campaign_id, now).await?;

    let number_of_click = counter_cache
        .get_click_count(campaign_id, day)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(%campaign_id, error = %e, "click counter read failed, treating as 0");
            0
        });

    let number_of_conversion = counter_cache
        .get_conversion_count(campaign_id, day)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(%campaign_id, error = %e, "conversion counter read failed, treating as 0");
            0
        });

    let total_conversion_value = conversion_store.sum_attributed_value(campaign_id, day).await?;

    let existing = journal_store.get(campaign_id, day).await?;
    let journal = CampaignJournal {
        campaign_journal_id: existing
            .as_ref()
            .map(|j| j.campaign_journal_id)
            .unwrap_or_else(Uuid::new_v4),
        campaign_id,
        date: day,
        number_of_click: Some(number_of_click),
        number_of_conversion: Some(number_of_conversion),
        total_conversion_value: Some(total_conversion_value),
        created_at: existing.map(|j| j.created_at).unwrap_or(now),
    };

    journal_store.upsert(&journal).await?;
    Ok(journal)
}

/// Daily rollup trigger (spec.md §4.4): for every campaign with a click
/// yesterday, build its journal row. A failure on one campaign is logged
/// and does not stop the others (spec.md §7).
pub async fn run_daily_rollup(
    click_store: &dyn ClickStore,
    campaign_store: &dyn CampaignStore,
    conversion_store: &dyn ConversionStore,
    journal_store: &dyn JournalStore,
    counter_cache: &dyn CounterCache,
    clock: &impl Clock,
) -> anyhow::Result<usize> {
    let today = clock.utc().date_naive();
    let yesterday = today - chrono::Duration::days(1);
    rollup_for_day(
        click_store,
        campaign_store,
        conversion_store,
        journal_store,
        counter_cache,
        yesterday,
        clock.utc(),
    )
    .await
}

/// The day-parameterized core of [`run_daily_rollup`], split out so tests
/// can drive it for a fixed day without depending on wall-clock time.
pub async fn rollup_for_day(
    click_store: &dyn ClickStore,
    campaign_store: &dyn CampaignStore,
    conversion_store: &dyn ConversionStore,
    journal_store: &dyn JournalStore,
    counter_cache: &dyn CounterCache,
    day: NaiveDate,
    now: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<usize> {
    let campaign_ids = click_store.distinct_campaigns_with_clicks_on(day).await?;
    let mut rolled_up = 0;

    for campaign_id in campaign_ids {
        match build_journal_for_campaign(
            campaign_store,
            conversion_store,
            journal_store,
            counter_cache,
            campaign_id,
            day,
            now,
        )
        .await
        {
            Ok(_) => rolled_up += 1,
            Err(e) => tracing::error!(%campaign_id, error = %e, "journal rollup failed for campaign"),
        }
    }

    Ok(rolled_up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use tyr_store::{InMemoryCampaignStore, InMemoryClickStore, InMemoryConversionStore, InMemoryJournalStore};
    use tyr_types::{ClickEvent, ConversionEvent};
    use uuid::Uuid;

    struct FakeCache {
        clicks: std::collections::HashMap<String, i64>,
        conversions: std::collections::HashMap<String, i64>,
    }

    impl FakeCache {
        fn new() -> Self {
            Self {
                clicks: std::collections::HashMap::new(),
                conversions: std::collections::HashMap::new(),
            }
        }

        fn with_click_count(mut self, campaign_id: Uuid, day: NaiveDate, count: i64) -> Self {
            self.clicks.insert(format!("{campaign_id}:{day}"), count);
            self
        }

        fn with_conversion_count(mut self, campaign_id: Uuid, day: NaiveDate, count: i64) -> Self {
            self.conversions.insert(format!("{campaign_id}:{day}"), count);
            self
        }
    }

    #[async_trait::async_trait]
    impl CounterCache for FakeCache {
        async fn incr_click_count(&self, _campaign_id: Uuid, _day: NaiveDate) -> anyhow::Result<i64> {
            unreachable!("journal builder only reads counters")
        }

        async fn incr_conversion_count(&self, _campaign_id: Uuid, _day: NaiveDate) -> anyhow::Result<i64> {
            unreachable!("journal builder only reads counters")
        }

        async fn get_click_count(&self, campaign_id: Uuid, day: NaiveDate) -> anyhow::Result<i64> {
            Ok(*self.clicks.get(&format!("{campaign_id}:{day}")).unwrap_or(&0))
        }

        async fn get_conversion_count(&self, campaign_id: Uuid, day: NaiveDate) -> anyhow::Result<i64> {
            Ok(*self.conversions.get(&format!("{campaign_id}:{day}")).unwrap_or(&0))
        }

        async fn ping(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn attributed_conversion(campaign_id: Uuid, day: NaiveDate, value: rust_decimal::Decimal) -> ConversionEvent {
        let conversion_date = day.and_hms_opt(12, 0, 0).unwrap().and_utc();
        ConversionEvent {
            conversion_id: Uuid::new_v4(),
            campaign_id,
            user_id: Uuid::new_v4(),
            click_id: Some(Uuid::new_v4()),
            conversion_date,
            value: Some(value),
            kind: "purchase".to_string(),
            source: "email".to_string(),
            created_at: conversion_date,
        }
    }

    fn click_on(campaign_id: Uuid, day: NaiveDate) -> ClickEvent {
        let click_date = day.and_hms_opt(9, 0, 0).unwrap().and_utc();
        ClickEvent {
            click_id: Uuid::new_v4(),
            campaign_id,
            user_id: Uuid::new_v4(),
            click_date,
            source: "email".to_string(),
            created_at: click_date,
        }
    }

    #[tokio::test]
    async fn journal_rollup_aggregates_counts_and_exact_value() {
        let clicks = InMemoryClickStore::new();
        let campaigns = InMemoryCampaignStore::new();
        let conversions = InMemoryConversionStore::new();
        let journals = InMemoryJournalStore::new();

        let campaign_id = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        for _ in 0..3 {
            clicks.seed(click_on(campaign_id, day));
        }
        conversions.insert(&attributed_conversion(campaign_id, day, dec!(10.00))).await.unwrap();
        conversions.insert(&attributed_conversion(campaign_id, day, dec!(20.00))).await.unwrap();

        let cache = FakeCache::new()
            .with_click_count(campaign_id, day, 3)
            .with_conversion_count(campaign_id, day, 2);

        let now = fixed_now();
        let rolled_up = rollup_for_day(&clicks, &campaigns, &conversions, &journals, &cache, day, now)
            .await
            .unwrap();
        assert_eq!(rolled_up, 1);

        let journal = journals.get(campaign_id, day).await.unwrap().unwrap();
        assert_eq!(journal.number_of_click, Some(3));
        assert_eq!(journal.number_of_conversion, Some(2));
        assert_eq!(journal.total_conversion_value, Some(dec!(30.00)));
    }

    #[tokio::test]
    async fn rerunning_rollup_for_same_day_is_idempotent() {
        let clicks = InMemoryClickStore::new();
        let campaigns = InMemoryCampaignStore::new();
        let conversions = InMemoryConversionStore::new();
        let journals = InMemoryJournalStore::new();

        let campaign_id = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        clicks.seed(click_on(campaign_id, day));
        let cache = FakeCache::new().with_click_count(campaign_id, day, 1);
        let now = fixed_now();

        rollup_for_day(&clicks, &campaigns, &conversions, &journals, &cache, day, now)
            .await
            .unwrap();
        let first = journals.get(campaign_id, day).await.unwrap().unwrap();

        rollup_for_day(&clicks, &campaigns, &conversions, &journals, &cache, day, now)
            .await
            .unwrap();
        let second = journals.get(campaign_id, day).await.unwrap().unwrap();

        assert_eq!(first.campaign_journal_id, second.campaign_journal_id);
        assert_eq!(first.number_of_click, second.number_of_click);
        assert_eq!(first.total_conversion_value, second.total_conversion_value);
    }

    #[tokio::test]
    async fn unknown_campaign_gets_placeholder_name() {
        let clicks = InMemoryClickStore::new();
        let campaigns = InMemoryCampaignStore::new();
        let conversions = InMemoryConversionStore::new();
        let journals = InMemoryJournalStore::new();

        let campaign_id = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        clicks.seed(click_on(campaign_id, day));
        let cache = FakeCache::new();
        let now = fixed_now();

        rollup_for_day(&clicks, &campaigns, &conversions, &journals, &cache, day, now)
            .await
            .unwrap();

        let campaign = campaigns.get(campaign_id).await.unwrap().unwrap();
        assert_eq!(campaign.name, format!("Campaign {}", &campaign_id.to_string()[..8]));
    }

    fn fixed_now() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2024, 1, 15, 1, 0, 0).unwrap()
    }
}
