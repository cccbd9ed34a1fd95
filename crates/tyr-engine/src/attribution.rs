use chrono::Utc;
use tyr_cache::CounterCache;
use tyr_store::{ClickStore, ConversionStore};
use tyr_types::{ClickEvent, ConversionEvent, TyrError};

/// Record an ingested click (spec.md §4.2): persist it, then bump the daily
/// click counter. A cache failure is logged by the caller and is not fatal —
/// this function still reports it so the ingestor loop can log it, but it
/// does not roll back the insert.
pub async fn record_click(
    click_store: &dyn ClickStore,
    counter_cache: &dyn CounterCache,
    click: &ClickEvent,
) -> Result<(), TyrError> {
    click_store.insert(click).await?;

    if let Err(e) = counter_cache
        .incr_click_count(click.campaign_id, click.click_date.date_naive())
        .await
    {
        tracing::warn!(click_id = %click.click_id, error = %e, "failed to increment click counter");
    }

    Ok(())
}

/// Record an ingested conversion and run the attribution lookup (spec.md
/// §4.3): persist the conversion unattributed, then search for the best
/// matching click within `window_hours` in either direction of
/// `conversion_date`. On a match, set `click_id` and bump the daily
/// conversion counter; the counter is incremented only for attributed
/// conversions.
pub async fn record_conversion_and_attribute(
    click_store: &dyn ClickStore,
    conversion_store: &dyn ConversionStore,
    counter_cache: &dyn CounterCache,
    conversion: &ConversionEvent,
    window_hours: i64,
) -> Result<Option<ClickEvent>, TyrError> {
    conversion_store.insert(conversion).await?;

    let matched = click_store
        .find_for_attribution(
            conversion.campaign_id,
            conversion.user_id,
            &conversion.source,
            conversion.conversion_date,
            window_hours,
        )
        .await?;

    if let Some(click) = &matched {
        conversion_store
            .set_click_id(conversion.conversion_id, click.click_id)
            .await?;

        if let Err(e) = counter_cache
            .incr_conversion_count(conversion.campaign_id, conversion.conversion_date.date_naive())
            .await
        {
            tracing::warn!(
                conversion_id = %conversion.conversion_id,
                error = %e,
                "failed to increment conversion counter"
            );
        }
    }

    Ok(matched)
}

/// Current wall-clock time, split out so callers that need "now" for a
/// `created_at` stamp (the intake API) don't each reach for `chrono::Utc`
/// directly — kept here rather than threaded through `mockable::Clock`
/// since intake timestamps are not part of any testable date arithmetic.
pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use tyr_cache::CounterCache as _;
    use tyr_store::{InMemoryClickStore, InMemoryConversionStore};
    use uuid::Uuid;

    struct FakeCache {
        clicks: std::sync::Mutex<std::collections::HashMap<String, i64>>,
        conversions: std::sync::Mutex<std::collections::HashMap<String, i64>>,
    }

    impl FakeCache {
        fn new() -> Self {
            Self {
                clicks: std::sync::Mutex::new(std::collections::HashMap::new()),
                conversions: std::sync::Mutex::new(std::collections::HashMap::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl CounterCache for FakeCache {
        async fn incr_click_count(&self, campaign_id: Uuid, day: chrono::NaiveDate) -> anyhow::Result<i64> {
            let key = format!("{campaign_id}:{day}");
            let mut m = self.clicks.lock().unwrap();
            let v = m.entry(key).or_insert(0);
            *v += 1;
            Ok(*v)
        }

        async fn incr_conversion_count(&self, campaign_id: Uuid, day: chrono::NaiveDate) -> anyhow::Result<i64> {
            let key = format!("{campaign_id}:{day}");
            let mut m = self.conversions.lock().unwrap();
            let v = m.entry(key).or_insert(0);
            *v += 1;
            Ok(*v)
        }

        async fn get_click_count(&self, campaign_id: Uuid, day: chrono::NaiveDate) -> anyhow::Result<i64> {
            let key = format!("{campaign_id}:{day}");
            Ok(*self.clicks.lock().unwrap().get(&key).unwrap_or(&0))
        }

        async fn get_conversion_count(&self, campaign_id: Uuid, day: chrono::NaiveDate) -> anyhow::Result<i64> {
            let key = format!("{campaign_id}:{day}");
            Ok(*self.conversions.lock().unwrap().get(&key).unwrap_or(&0))
        }

        async fn ping(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn click(campaign_id: Uuid, user_id: Uuid, source: &str, click_date: chrono::DateTime<Utc>) -> ClickEvent {
        ClickEvent {
            click_id: Uuid::new_v4(),
            campaign_id,
            user_id,
            click_date,
            source: source.to_string(),
            created_at: click_date,
        }
    }

    fn conversion(
        campaign_id: Uuid,
        user_id: Uuid,
        source: &str,
        conversion_date: chrono::DateTime<Utc>,
    ) -> ConversionEvent {
        ConversionEvent {
            conversion_id: Uuid::new_v4(),
            campaign_id,
            user_id,
            click_id: None,
            conversion_date,
            value: Some(dec!(49.99)),
            kind: "purchase".to_string(),
            source: source.to_string(),
            created_at: conversion_date,
        }
    }

    #[tokio::test]
    async fn basic_attribution_matches_and_increments_counter() {
        let clicks = InMemoryClickStore::new();
        let conversions = InMemoryConversionStore::new();
        let cache = FakeCache::new();

        let campaign_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let click_date = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let c = click(campaign_id, user_id, "email", click_date);
        record_click(&clicks, &cache, &c).await.unwrap();

        let conv_date = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let conv = conversion(campaign_id, user_id, "email", conv_date);
        let matched = record_conversion_and_attribute(&clicks, &conversions, &cache, &conv, 24)
            .await
            .unwrap();

        assert_eq!(matched.unwrap().click_id, c.click_id);
        assert_eq!(
            cache.get_conversion_count(campaign_id, conv_date.date_naive()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn out_of_window_conversion_is_not_attributed() {
        let clicks = InMemoryClickStore::new();
        let conversions = InMemoryConversionStore::new();
        let cache = FakeCache::new();

        let campaign_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let click_date = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        record_click(&clicks, &cache, &click(campaign_id, user_id, "email", click_date))
            .await
            .unwrap();

        let conv_date = Utc.with_ymd_and_hms(2024, 1, 16, 11, 0, 0).unwrap();
        let conv = conversion(campaign_id, user_id, "email", conv_date);
        let matched = record_conversion_and_attribute(&clicks, &conversions, &cache, &conv, 24)
            .await
            .unwrap();

        assert!(matched.is_none());
        assert_eq!(
            cache.get_conversion_count(campaign_id, conv_date.date_naive()).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn source_mismatch_is_not_attributed() {
        let clicks = InMemoryClickStore::new();
        let conversions = InMemoryConversionStore::new();
        let cache = FakeCache::new();

        let campaign_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let click_date = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        record_click(&clicks, &cache, &click(campaign_id, user_id, "email", click_date))
            .await
            .unwrap();

        let conv_date = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let conv = conversion(campaign_id, user_id, "sms", conv_date);
        let matched = record_conversion_and_attribute(&clicks, &conversions, &cache, &conv, 24)
            .await
            .unwrap();

        assert!(matched.is_none());
    }

    #[tokio::test]
    async fn latest_click_in_window_wins() {
        let clicks = InMemoryClickStore::new();
        let conversions = InMemoryConversionStore::new();
        let cache = FakeCache::new();

        let campaign_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let older = t - chrono::Duration::hours(6);
        let newer = t - chrono::Duration::hours(1);
        record_click(&clicks, &cache, &click(campaign_id, user_id, "email", older))
            .await
            .unwrap();
        record_click(&clicks, &cache, &click(campaign_id, user_id, "email", newer))
            .await
            .unwrap();

        let conv = conversion(campaign_id, user_id, "email", t);
        let matched = record_conversion_and_attribute(&clicks, &conversions, &cache, &conv, 24)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(matched.click_date, newer);
    }
}
