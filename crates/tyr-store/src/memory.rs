use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use tyr_types::{
    Campaign, CampaignJournal, ClickEvent, ConversionEvent, GroupBy, Money, StatisticsDataItem,
    TyrError,
};

use crate::traits::{CampaignStore, ClickStore, ConversionStore, JournalStore};

/// Plain in-memory fakes for the four store traits, used by `tyr-engine`'s
/// unit tests in place of a running Postgres instance. Not optimized; a
/// linear scan per call is fine at test scale.
#[derive(Default)]
pub struct InMemoryClickStore {
    clicks: Mutex<Vec<ClickEvent>>,
}

impl InMemoryClickStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, click: ClickEvent) {
        self.clicks.lock().unwrap().push(click);
    }
}

#[async_trait]
impl ClickStore for InMemoryClickStore {
    async fn insert(&self, click: &ClickEvent) -> Result<(), TyrError> {
        let mut clicks = self.clicks.lock().unwrap();
        if clicks.iter().any(|c| c.click_id == click.click_id) {
            return Ok(());
        }
        clicks.push(click.clone());
        Ok(())
    }

    async fn find_for_attribution(
        &self,
        campaign_id: Uuid,
        user_id: Uuid,
        source: &str,
        conversion_date: DateTime<Utc>,
        window_hours: i64,
    ) -> Result<Option<ClickEvent>, TyrError> {
        let window = chrono::Duration::hours(window_hours);
        let lower = conversion_date - window;
        let upper = conversion_date + window;

        let clicks = self.clicks.lock().unwrap();
        let best = clicks
            .iter()
            .filter(|c| {
                c.campaign_id == campaign_id
                    && c.user_id == user_id
                    && c.source == source
                    && c.click_date >= lower
                    && c.click_date <= upper
            })
            .max_by(|a, b| {
                a.click_date
                    .cmp(&b.click_date)
                    .then(a.click_id.cmp(&b.click_id))
            })
            .cloned();
        Ok(best)
    }

    async fn distinct_campaigns_with_clicks_on(&self, day: NaiveDate) -> Result<Vec<Uuid>, TyrError> {
        let clicks = self.clicks.lock().unwrap();
        let mut ids: Vec<Uuid> = clicks
            .iter()
            .filter(|c| c.click_date.date_naive() == day)
            .map(|c| c.campaign_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[derive(Default)]
pub struct InMemoryConversionStore {
    conversions: Mutex<Vec<ConversionEvent>>,
}

impl InMemoryConversionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversionStore for InMemoryConversionStore {
    async fn insert(&self, conversion: &ConversionEvent) -> Result<(), TyrError> {
        let mut conversions = self.conversions.lock().unwrap();
        if conversions
            .iter()
            .any(|c| c.conversion_id == conversion.conversion_id)
        {
            return Ok(());
        }
        conversions.push(conversion.clone());
        Ok(())
    }

    async fn set_click_id(&self, conversion_id: Uuid, click_id: Uuid) -> Result<(), TyrError> {
        let mut conversions = self.conversions.lock().unwrap();
        match conversions
            .iter_mut()
            .find(|c| c.conversion_id == conversion_id)
        {
            Some(c) => {
                c.click_id = Some(click_id);
                Ok(())
            }
            None => Err(TyrError::not_found(format!(
                "conversion {conversion_id} not found"
            ))),
        }
    }

    async fn sum_attributed_value(&self, campaign_id: Uuid, day: NaiveDate) -> Result<Money, TyrError> {
        let conversions = self.conversions.lock().unwrap();
        let sum = conversions
            .iter()
            .filter(|c| {
                c.campaign_id == campaign_id
                    && c.conversion_date.date_naive() == day
                    && c.click_id.is_some()
            })
            .filter_map(|c| c.value)
            .fold(Money::ZERO, |acc, v| acc + v);
        Ok(sum)
    }
}

#[derive(Default)]
pub struct InMemoryCampaignStore {
    campaigns: Mutex<Vec<Campaign>>,
}

impl InMemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, campaign: Campaign) {
        self.campaigns.lock().unwrap().push(campaign);
    }
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn get(&self, campaign_id: Uuid) -> Result<Option<Campaign>, TyrError> {
        Ok(self
            .campaigns
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == campaign_id)
            .cloned())
    }

    async fn create(&self, campaign: &Campaign) -> Result<(), TyrError> {
        let mut campaigns = self.campaigns.lock().unwrap();
        if campaigns.iter().any(|c| c.id == campaign.id) {
            return Ok(());
        }
        campaigns.push(campaign.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryJournalStore {
    journals: Mutex<Vec<CampaignJournal>>,
}

impl InMemoryJournalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, journal: CampaignJournal) {
        self.journals.lock().unwrap().push(journal);
    }
}

#[async_trait]
impl JournalStore for InMemoryJournalStore {
    async fn get(&self, campaign_id: Uuid, date: NaiveDate) -> Result<Option<CampaignJournal>, TyrError> {
        Ok(self
            .journals
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.campaign_id == campaign_id && j.date == date)
            .cloned())
    }

    async fn upsert(&self, journal: &CampaignJournal) -> Result<(), TyrError> {
        let mut journals = self.journals.lock().unwrap();
        match journals
            .iter_mut()
            .find(|j| j.campaign_id == journal.campaign_id && j.date == journal.date)
        {
            Some(existing) => *existing = journal.clone(),
            None => journals.push(journal.clone()),
        }
        Ok(())
    }

    async fn historical(
        &self,
        campaign_id: Uuid,
        group_by: GroupBy,
        today: NaiveDate,
    ) -> Result<Vec<StatisticsDataItem>, TyrError> {
        let journals = self.journals.lock().unwrap();
        let mut rows: Vec<&CampaignJournal> = journals
            .iter()
            .filter(|j| j.campaign_id == campaign_id && j.date < today)
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));

        match group_by {
            GroupBy::Daily => Ok(rows
                .into_iter()
                .take(30)
                .map(|j| to_item(j.date.to_string(), j))
                .collect()),
            GroupBy::Weekly => Ok(group_and_limit(rows, week_start_date, |d| d.to_string(), 12)),
            GroupBy::Monthly => Ok(group_and_limit(
                rows,
                |d| NaiveDate::from_ymd_opt(d.year(), d.month(), 1).unwrap(),
                |d| format!("{:04}-{:02}", d.year(), d.month()),
                12,
            )),
        }
    }
}

use chrono::Datelike;

/// Monday of the ISO week containing `date`, mirroring Postgres's
/// `DATE_TRUNC('week', date)` so the in-memory fake groups weeks exactly
/// like [`crate::postgres::PgJournalStore`].
fn week_start_date(date: NaiveDate) -> NaiveDate {
    let days_since_monday = date.weekday().num_days_from_monday();
    date - chrono::Duration::days(days_since_monday as i64)
}

fn to_item(period: String, j: &CampaignJournal) -> StatisticsDataItem {
    let clicks = j.number_of_click.unwrap_or(0);
    let conversions = j.number_of_conversion.unwrap_or(0);
    StatisticsDataItem {
        period,
        total_clicks: clicks,
        total_conversions: conversions,
        total_value: j.total_conversion_value.unwrap_or(Money::ZERO),
        conversion_rate: StatisticsDataItem::conversion_rate(clicks, conversions),
    }
}

fn group_and_limit(
    rows: Vec<&CampaignJournal>,
    bucket: impl Fn(NaiveDate) -> NaiveDate,
    format_period: impl Fn(NaiveDate) -> String,
    limit: usize,
) -> Vec<StatisticsDataItem> {
    let mut buckets: Vec<(NaiveDate, i64, i64, Money)> = Vec::new();
    for j in rows {
        let period = bucket(j.date);
        let clicks = j.number_of_click.unwrap_or(0);
        let conversions = j.number_of_conversion.unwrap_or(0);
        let value = j.total_conversion_value.unwrap_or(Money::ZERO);
        match buckets.iter_mut().find(|(p, _, _, _)| *p == period) {
            Some((_, c, v, val)) => {
                *c += clicks;
                *v += conversions;
                *val += value;
            }
            None => buckets.push((period, clicks, conversions, value)),
        }
    }
    buckets.sort_by(|a, b| b.0.cmp(&a.0));
    buckets
        .into_iter()
        .take(limit)
        .map(|(period, clicks, conversions, value)| StatisticsDataItem {
            period: format_period(period),
            total_clicks: clicks,
            total_conversions: conversions,
            total_value: value,
            conversion_rate: StatisticsDataItem::conversion_rate(clicks, conversions),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn click(campaign_id: Uuid, user_id: Uuid, source: &str, click_date: DateTime<Utc>) -> ClickEvent {
        ClickEvent {
            click_id: Uuid::new_v4(),
            campaign_id,
            user_id,
            click_date,
            source: source.to_string(),
            created_at: click_date,
        }
    }

    #[tokio::test]
    async fn attribution_picks_most_recent_click_in_window() {
        let store = InMemoryClickStore::new();
        let campaign_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        store.seed(click(campaign_id, user_id, "email", older));
        store.seed(click(campaign_id, user_id, "email", newer));

        let conversion_date = Utc.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap();
        let found = store
            .find_for_attribution(campaign_id, user_id, "email", conversion_date, 72)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.click_date, newer);
    }

    #[tokio::test]
    async fn attribution_ignores_clicks_outside_window() {
        let store = InMemoryClickStore::new();
        let campaign_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let far = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        store.seed(click(campaign_id, user_id, "email", far));

        let conversion_date = Utc.with_ymd_and_hms(2024, 1, 10, 10, 0, 0).unwrap();
        let found = store
            .find_for_attribution(campaign_id, user_id, "email", conversion_date, 72)
            .await
            .unwrap();

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn duplicate_click_insert_is_a_no_op() {
        let store = InMemoryClickStore::new();
        let c = click(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "email",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );
        store.insert(&c).await.unwrap();
        store.insert(&c).await.unwrap();
        assert_eq!(store.clicks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sum_attributed_value_excludes_unattributed_conversions() {
        let store = InMemoryConversionStore::new();
        let campaign_id = Uuid::new_v4();
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let attributed = ConversionEvent {
            conversion_id: Uuid::new_v4(),
            campaign_id,
            user_id: Uuid::new_v4(),
            click_id: Some(Uuid::new_v4()),
            conversion_date: date,
            value: Some(dec!(10.00)),
            kind: "purchase".to_string(),
            source: "email".to_string(),
            created_at: date,
        };
        let mut unattributed = attributed.clone();
        unattributed.conversion_id = Uuid::new_v4();
        unattributed.click_id = None;
        unattributed.value = Some(dec!(99.00));

        store.insert(&attributed).await.unwrap();
        store.insert(&unattributed).await.unwrap();

        let sum = store
            .sum_attributed_value(campaign_id, date.date_naive())
            .await
            .unwrap();
        assert_eq!(sum, dec!(10.00));
    }

    #[test]
    fn week_start_date_is_monday() {
        let wednesday = NaiveDate::from_ymd_opt(2024, 1, 17).unwrap();
        assert_eq!(
            week_start_date(wednesday),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }
}
