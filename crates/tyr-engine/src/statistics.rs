use chrono::NaiveDate;
use mockable::Clock;
use tyr_cache::CounterCache;
use tyr_store::{ConversionStore, JournalStore};
use tyr_types::{CampaignStatisticsResponse, GroupBy, StatisticsDataItem};
use uuid::Uuid;

use crate::period::period_label;

/// Assemble the statistics series for one campaign (spec.md §4.5): the
/// historical series from the journal, merged with today-so-far counters
/// for the daily view.
///
/// Split from [`get_campaign_statistics`] so tests can supply `today`
/// directly instead of depending on wall-clock time.
pub async fn assemble_statistics(
    journal_store: &dyn JournalStore,
    conversion_store: &dyn ConversionStore,
    counter_cache: &dyn CounterCache,
    campaign_id: Uuid,
    group_by: GroupBy,
    today: NaiveDate,
) -> anyhow::Result<CampaignStatisticsResponse> {
    let mut data = journal_store.historical(campaign_id, group_by, today).await?;

    if group_by == GroupBy::Daily {
        if let Some(today_item) = todays_item(conversion_store, counter_cache, campaign_id, today).await? {
            merge_today(&mut data, today_item, today, group_by);
        }
    }

    Ok(CampaignStatisticsResponse {
        campaign_id,
        group_by: group_by_label(group_by),
        data,
    })
}

/// Wraps [`assemble_statistics`] with "today" taken from the clock — the
/// entry point the reporting API calls.
pub async fn get_campaign_statistics(
    journal_store: &dyn JournalStore,
    conversion_store: &dyn ConversionStore,
    counter_cache: &dyn CounterCache,
    campaign_id: Uuid,
    group_by: GroupBy,
    clock: &impl Clock,
) -> anyhow::Result<CampaignStatisticsResponse> {
    let today = clock.utc().date_naive();
    assemble_statistics(journal_store, conversion_store, counter_cache, campaign_id, group_by, today).await
}

fn group_by_label(group_by: GroupBy) -> String {
    match group_by {
        GroupBy::Daily => "daily",
        GroupBy::Weekly => "weekly",
        GroupBy::Monthly => "monthly",
    }
    .to_string()
}

/// Today's live counters plus the exact attributed value summed from the
/// event store. `None` when there has been no activity at all today — the
/// merge step then leaves the historical series untouched.
async fn todays_item(
    conversion_store: &dyn ConversionStore,
    counter_cache: &dyn CounterCache,
    campaign_id: Uuid,
    today: NaiveDate,
) -> anyhow::Result<Option<StatisticsDataItem>> {
    let clicks = counter_cache.get_click_count(campaign_id, today).await.unwrap_or(0);
    let conversions = counter_cache
        .get_conversion_count(campaign_id, today)
        .await
        .unwrap_or(0);

    if clicks == 0 && conversions == 0 {
        return Ok(None);
    }

    let total_value = conversion_store.sum_attributed_value(campaign_id, today).await?;

    Ok(Some(StatisticsDataItem {
        period: today.to_string(),
        total_clicks: clicks,
        total_conversions: conversions,
        total_value,
        conversion_rate: StatisticsDataItem::conversion_rate(clicks, conversions),
    }))
}

fn merge_today(
    data: &mut Vec<StatisticsDataItem>,
    today_item: StatisticsDataItem,
    today: NaiveDate,
    group_by: GroupBy,
) {
    let today_period = period_label(today, group_by);

    if let Some(existing) = data.iter_mut().find(|item| item.period == today_period) {
        existing.total_clicks += today_item.total_clicks;
        existing.total_conversions += today_item.total_conversions;
        existing.total_value += today_item.total_value;
        existing.conversion_rate =
            StatisticsDataItem::conversion_rate(existing.total_clicks, existing.total_conversions);
    } else {
        data.insert(0, today_item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tyr_store::{InMemoryConversionStore, InMemoryJournalStore};
    use tyr_types::CampaignJournal;

    struct FakeCache {
        click_count: i64,
        conversion_count: i64,
    }

    #[async_trait]
    impl CounterCache for FakeCache {
        async fn incr_click_count(&self, _c: Uuid, _d: NaiveDate) -> anyhow::Result<i64> {
            unreachable!()
        }
        async fn incr_conversion_count(&self, _c: Uuid, _d: NaiveDate) -> anyhow::Result<i64> {
            unreachable!()
        }
        async fn get_click_count(&self, _c: Uuid, _d: NaiveDate) -> anyhow::Result<i64> {
            Ok(self.click_count)
        }
        async fn get_conversion_count(&self, _c: Uuid, _d: NaiveDate) -> anyhow::Result<i64> {
            Ok(self.conversion_count)
        }
        async fn ping(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn merges_today_as_new_leading_row_when_no_historical_match() {
        let journals = InMemoryJournalStore::new();
        let conversions = InMemoryConversionStore::new();
        let campaign_id = Uuid::new_v4();
        let yesterday = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();

        journals.seed(CampaignJournal {
            campaign_journal_id: Uuid::new_v4(),
            campaign_id,
            date: yesterday,
            number_of_click: Some(10),
            number_of_conversion: Some(2),
            total_conversion_value: Some(dec!(50.00)),
            created_at: yesterday.and_hms_opt(0, 0, 0).unwrap().and_utc(),
        });

        let conv = tyr_types::ConversionEvent {
            conversion_id: Uuid::new_v4(),
            campaign_id,
            user_id: Uuid::new_v4(),
            click_id: Some(Uuid::new_v4()),
            conversion_date: today.and_hms_opt(9, 0, 0).unwrap().and_utc(),
            value: Some(dec!(25.00)),
            kind: "purchase".to_string(),
            source: "email".to_string(),
            created_at: today.and_hms_opt(9, 0, 0).unwrap().and_utc(),
        };
        conversions.insert(&conv).await.unwrap();

        let cache = FakeCache {
            click_count: 5,
            conversion_count: 1,
        };

        let response = assemble_statistics(&journals, &conversions, &cache, campaign_id, GroupBy::Daily, today)
            .await
            .unwrap();

        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[0].period, "2024-01-15");
        assert_eq!(response.data[0].total_clicks, 5);
        assert_eq!(response.data[0].total_conversions, 1);
        assert_eq!(response.data[0].total_value, dec!(25.00));
        assert_eq!(response.data[0].conversion_rate, 20.0);
        assert_eq!(response.data[1].period, "2024-01-14");
    }

    #[tokio::test]
    async fn no_activity_today_leaves_historical_series_untouched() {
        let journals = InMemoryJournalStore::new();
        let conversions = InMemoryConversionStore::new();
        let campaign_id = Uuid::new_v4();
        let yesterday = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();

        journals.seed(CampaignJournal {
            campaign_journal_id: Uuid::new_v4(),
            campaign_id,
            date: yesterday,
            number_of_click: Some(10),
            number_of_conversion: Some(2),
            total_conversion_value: Some(dec!(50.00)),
            created_at: yesterday.and_hms_opt(0, 0, 0).unwrap().and_utc(),
        });

        let cache = FakeCache {
            click_count: 0,
            conversion_count: 0,
        };

        let response = assemble_statistics(&journals, &conversions, &cache, campaign_id, GroupBy::Daily, today)
            .await
            .unwrap();

        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0].period, "2024-01-14");
    }

    #[test]
    fn conversion_rate_is_zero_with_no_clicks() {
        assert_eq!(StatisticsDataItem::conversion_rate(0, 0), 0.0);
    }
}
