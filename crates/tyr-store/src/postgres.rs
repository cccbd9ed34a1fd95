use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tyr_types::{
    Campaign, CampaignJournal, ClickEvent, ConversionEvent, GroupBy, Money, StatisticsDataItem,
    TyrError,
};

use crate::traits::{CampaignStore, ClickStore, ConversionStore, JournalStore};

fn backend(err: sqlx::Error) -> TyrError {
    TyrError::TransientBackend(err.into())
}

/// A unique constraint violation on the event's primary key: the message
/// was redelivered (spec.md §5's at-least-once guarantee) and the insert
/// should be treated as a no-op rather than an error.
fn is_pk_conflict(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// Advisory lock id so only one replica runs DDL when several instances start
// simultaneously, mirroring the teacher's `db::migrate`.
const MIGRATION_LOCK_ID: i64 = 87_612_309;

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(pool)
        .await?;

    let result = run_migrations(pool).await;

    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(pool)
        .await?;

    result
}

async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaign (
            id          UUID PRIMARY KEY,
            name        TEXT NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS click_event (
            click_id    UUID PRIMARY KEY,
            campaign_id UUID NOT NULL,
            user_id     UUID NOT NULL,
            click_date  TIMESTAMPTZ NOT NULL,
            source      TEXT NOT NULL,
            created_at  TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_click_event_attribution \
         ON click_event (campaign_id, user_id, source, click_date)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_click_event_click_date ON click_event (click_date)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversion_event (
            conversion_id   UUID PRIMARY KEY,
            campaign_id     UUID NOT NULL,
            user_id         UUID NOT NULL,
            click_id        UUID REFERENCES click_event(click_id),
            conversion_date TIMESTAMPTZ NOT NULL,
            value           DECIMAL(10,2),
            type            TEXT NOT NULL,
            source          TEXT NOT NULL,
            created_at      TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversion_event_click_id ON conversion_event (click_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversion_event_date \
         ON conversion_event (campaign_id, conversion_date)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS campaign_journal (
            campaign_journal_id    UUID PRIMARY KEY,
            campaign_id            UUID NOT NULL,
            date                   DATE NOT NULL,
            number_of_click        BIGINT,
            number_of_conversion   BIGINT,
            total_conversion_value DECIMAL(10,2),
            created_at             TIMESTAMPTZ NOT NULL,
            UNIQUE (campaign_id, date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub struct PgClickStore {
    pool: PgPool,
}

impl PgClickStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClickStore for PgClickStore {
    async fn insert(&self, click: &ClickEvent) -> Result<(), TyrError> {
        let result = sqlx::query(
            "INSERT INTO click_event \
             (click_id, campaign_id, user_id, click_date, source, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(click.click_id)
        .bind(click.campaign_id)
        .bind(click.user_id)
        .bind(click.click_date)
        .bind(&click.source)
        .bind(click.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_pk_conflict(&e) => {
                tracing::debug!(click_id = %click.click_id, "duplicate click, ignoring");
                Ok(())
            }
            Err(e) => Err(backend(e)),
        }
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

        let row = sqlx::query_as::<_, (Uuid, Uuid, Uuid, DateTime<Utc>, String, DateTime<Utc>)>(
            "SELECT click_id, campaign_id, user_id, click_date, source, created_at \
             FROM click_event \
             WHERE campaign_id = $1 AND user_id = $2 AND source = $3 \
               AND click_date BETWEEN $4 AND $5 \
             ORDER BY click_date DESC, click_id DESC \
             LIMIT 1",
        )
        .bind(campaign_id)
        .bind(user_id)
        .bind(source)
        .bind(lower)
        .bind(upper)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(
            |(click_id, campaign_id, user_id, click_date, source, created_at)| ClickEvent {
                click_id,
                campaign_id,
                user_id,
                click_date,
                source,
                created_at,
            },
        ))
    }

    async fn distinct_campaigns_with_clicks_on(&self, day: NaiveDate) -> Result<Vec<Uuid>, TyrError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT DISTINCT campaign_id FROM click_event WHERE click_date::date = $1",
        )
        .bind(day)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

pub struct PgConversionStore {
    pool: PgPool,
}

impl PgConversionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversionStore for PgConversionStore {
    async fn insert(&self, conversion: &ConversionEvent) -> Result<(), TyrError> {
        let result = sqlx::query(
            "INSERT INTO conversion_event \
             (conversion_id, campaign_id, user_id, click_id, conversion_date, value, type, source, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(conversion.conversion_id)
        .bind(conversion.campaign_id)
        .bind(conversion.user_id)
        .bind(conversion.click_id)
        .bind(conversion.conversion_date)
        .bind(conversion.value)
        .bind(&conversion.kind)
        .bind(&conversion.source)
        .bind(conversion.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_pk_conflict(&e) => {
                tracing::debug!(conversion_id = %conversion.conversion_id, "duplicate conversion, ignoring");
                Ok(())
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn set_click_id(&self, conversion_id: Uuid, click_id: Uuid) -> Result<(), TyrError> {
        sqlx::query("UPDATE conversion_event SET click_id = $1 WHERE conversion_id = $2")
            .bind(click_id)
            .bind(conversion_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn sum_attributed_value(&self, campaign_id: Uuid, day: NaiveDate) -> Result<Money, TyrError> {
        let (sum,): (Option<Money>,) = sqlx::query_as(
            "SELECT SUM(value) FROM conversion_event \
             WHERE campaign_id = $1 AND conversion_date::date = $2 AND click_id IS NOT NULL",
        )
        .bind(campaign_id)
        .bind(day)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(sum.unwrap_or(Money::ZERO))
    }
}

pub struct PgCampaignStore {
    pool: PgPool,
}

impl PgCampaignStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignStore for PgCampaignStore {
    async fn get(&self, campaign_id: Uuid) -> Result<Option<Campaign>, TyrError> {
        let row: Option<(Uuid, String, DateTime<Utc>)> =
            sqlx::query_as("SELECT id, name, created_at FROM campaign WHERE id = $1")
                .bind(campaign_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        Ok(row.map(|(id, name, created_at)| Campaign {
            id,
            name,
            created_at,
        }))
    }

    async fn create(&self, campaign: &Campaign) -> Result<(), TyrError> {
        let result = sqlx::query(
            "INSERT INTO campaign (id, name, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(campaign.id)
        .bind(&campaign.name)
        .bind(campaign.created_at)
        .execute(&self.pool)
        .await;

        result.map(|_| ()).map_err(backend)
    }
}

pub struct PgJournalStore {
    pool: PgPool,
}

impl PgJournalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JournalStore for PgJournalStore {
    async fn get(&self, campaign_id: Uuid, date: NaiveDate) -> Result<Option<CampaignJournal>, TyrError> {
        let row: Option<(Uuid, Uuid, NaiveDate, Option<i64>, Option<i64>, Option<Money>, DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT campaign_journal_id, campaign_id, date, number_of_click, \
                 number_of_conversion, total_conversion_value, created_at \
                 FROM campaign_journal WHERE campaign_id = $1 AND date = $2",
            )
            .bind(campaign_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        Ok(row.map(
            |(
                campaign_journal_id,
                campaign_id,
                date,
                number_of_click,
                number_of_conversion,
                total_conversion_value,
                created_at,
            )| CampaignJournal {
                campaign_journal_id,
                campaign_id,
                date,
                number_of_click,
                number_of_conversion,
                total_conversion_value,
                created_at,
            },
        ))
    }

    async fn upsert(&self, journal: &CampaignJournal) -> Result<(), TyrError> {
        sqlx::query(
            "INSERT INTO campaign_journal \
             (campaign_journal_id, campaign_id, date, number_of_click, number_of_conversion, \
              total_conversion_value, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (campaign_id, date) DO UPDATE SET \
               number_of_click = EXCLUDED.number_of_click, \
               number_of_conversion = EXCLUDED.number_of_conversion, \
               total_conversion_value = EXCLUDED.total_conversion_value",
        )
        .bind(journal.campaign_journal_id)
        .bind(journal.campaign_id)
        .bind(journal.date)
        .bind(journal.number_of_click)
        .bind(journal.number_of_conversion)
        .bind(journal.total_conversion_value)
        .bind(journal.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn historical(
        &self,
        campaign_id: Uuid,
        group_by: GroupBy,
        today: NaiveDate,
    ) -> Result<Vec<StatisticsDataItem>, TyrError> {
        match group_by {
            GroupBy::Daily => {
                let rows: Vec<(NaiveDate, Option<i64>, Option<i64>, Option<Money>)> = sqlx::query_as(
                    "SELECT date, number_of_click, number_of_conversion, total_conversion_value \
                     FROM campaign_journal WHERE campaign_id = $1 AND date < $2 \
                     ORDER BY date DESC LIMIT 30",
                )
                .bind(campaign_id)
                .bind(today)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

                Ok(rows
                    .into_iter()
                    .map(|(date, clicks, conversions, value)| {
                        build_item(date.to_string(), clicks, conversions, value)
                    })
                    .collect())
            }
            GroupBy::Weekly => {
                let rows: Vec<(NaiveDate, Option<i64>, Option<i64>, Option<Money>)> = sqlx::query_as(
                    "SELECT DATE_TRUNC('week', date)::date AS period, \
                            SUM(number_of_click), SUM(number_of_conversion), SUM(total_conversion_value) \
                     FROM campaign_journal WHERE campaign_id = $1 AND date < $2 \
                     GROUP BY period ORDER BY period DESC LIMIT 12",
                )
                .bind(campaign_id)
                .bind(today)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

                Ok(rows
                    .into_iter()
                    .map(|(date, clicks, conversions, value)| {
                        build_item(date.to_string(), clicks, conversions, value)
                    })
                    .collect())
            }
            GroupBy::Monthly => {
                let rows: Vec<(NaiveDate, Option<i64>, Option<i64>, Option<Money>)> = sqlx::query_as(
                    "SELECT DATE_TRUNC('month', date)::date AS period, \
                            SUM(number_of_click), SUM(number_of_conversion), SUM(total_conversion_value) \
                     FROM campaign_journal WHERE campaign_id = $1 AND date < $2 \
                     GROUP BY period ORDER BY period DESC LIMIT 12",
                )
                .bind(campaign_id)
                .bind(today)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

                Ok(rows
                    .into_iter()
                    .map(|(date, clicks, conversions, value)| {
                        let period = format!("{:04}-{:02}", date.year(), date.month());
                        build_item(period, clicks, conversions, value)
                    })
                    .collect())
            }
        }
    }
}

fn build_item(
    period: String,
    clicks: Option<i64>,
    conversions: Option<i64>,
    value: Option<Money>,
) -> StatisticsDataItem {
    let clicks = clicks.unwrap_or(0);
    let conversions = conversions.unwrap_or(0);
    StatisticsDataItem {
        period,
        total_clicks: clicks,
        total_conversions: conversions,
        total_value: value.unwrap_or(Money::ZERO),
        conversion_rate: StatisticsDataItem::conversion_rate(clicks, conversions),
    }
}
