//! Fast per-(campaign, day) counters, backed by Redis `INCR`/`EXPIRE`.
//!
//! Key format and TTL policy are exactly spec.md §3's:
//! `click_count:<campaign>:<YYYY-MM-DD>` / `conversion_count:<campaign>:<YYYY-MM-DD>`,
//! with TTL set on the *first* increment so the key survives through the end
//! of the following calendar day — long enough for tomorrow's rollup and
//! today's live reporting, then it expires.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

pub fn click_count_key(campaign_id: Uuid, day: NaiveDate) -> String {
    format!("click_count:{campaign_id}:{day}")
}

pub fn conversion_count_key(campaign_id: Uuid, day: NaiveDate) -> String {
    format!("conversion_count:{campaign_id}:{day}")
}

/// Seconds from `now` until 23:59:59 local time on the day after `now`.
///
/// This is the TTL set the first time a counter key is touched: it keeps the
/// key alive through "the end of the following calendar day", matching
/// spec.md §3's expiry rule.
pub fn seconds_until_end_of_tomorrow(now: DateTime<Local>) -> i64 {
    let tomorrow = now.date_naive().succ_opt().unwrap_or(now.date_naive());
    let end_of_tomorrow = tomorrow.and_hms_opt(23, 59, 59).expect("valid time");
    let end_of_tomorrow = Local
        .from_local_datetime(&end_of_tomorrow)
        .single()
        .unwrap_or(now);
    (end_of_tomorrow - now).num_seconds().max(0)
}

/// Capability interface over the counter cache, so the attribution engine
/// and journal builder can be exercised against an in-memory fake in tests.
#[async_trait]
pub trait CounterCache: Send + Sync {
    /// Increment the click counter for (campaign, day) and return the new
    /// value. Sets the expiry policy above when the counter was just created.
    async fn incr_click_count(&self, campaign_id: Uuid, day: NaiveDate) -> anyhow::Result<i64>;

    /// Increment the conversion counter for (campaign, day). Only called for
    /// *attributed* conversions.
    async fn incr_conversion_count(&self, campaign_id: Uuid, day: NaiveDate)
        -> anyhow::Result<i64>;

    /// Current click count, or `0` on cache miss.
    async fn get_click_count(&self, campaign_id: Uuid, day: NaiveDate) -> anyhow::Result<i64>;

    /// Current conversion count, or `0` on cache miss.
    async fn get_conversion_count(&self, campaign_id: Uuid, day: NaiveDate)
        -> anyhow::Result<i64>;

    async fn ping(&self) -> anyhow::Result<()>;
}

/// Redis-backed implementation. Shares a single [`ConnectionManager`] guarded
/// by a `tokio::sync::Mutex`, exactly as `app-rs/src/state.rs` wraps its
/// write-path Redis connection.
pub struct RedisCounterCache {
    conn: tokio::sync::Mutex<ConnectionManager>,
}

impl RedisCounterCache {
    pub async fn connect(connection_string: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(connection_string)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn: tokio::sync::Mutex::new(conn),
        })
    }

    async fn incr_with_expiry(&self, key: &str) -> anyhow::Result<i64> {
        let mut conn = self.conn.lock().await;
        let count: i64 = conn.incr(key, 1i64).await?;
        if count == 1 {
            let ttl = seconds_until_end_of_tomorrow(Local::now());
            if let Err(e) = conn.expire::<_, ()>(key, ttl).await {
                tracing::warn!(%key, error = %e, "failed to set TTL on counter key");
            }
        }
        Ok(count)
    }

    async fn get(&self, key: &str) -> anyhow::Result<i64> {
        let mut conn = self.conn.lock().await;
        let raw: Option<String> = conn.get(key).await?;
        Ok(raw.and_then(|s| s.parse().ok()).unwrap_or(0))
    }
}

#[async_trait]
impl CounterCache for RedisCounterCache {
    async fn incr_click_count(&self, campaign_id: Uuid, day: NaiveDate) -> anyhow::Result<i64> {
        self.incr_with_expiry(&click_count_key(campaign_id, day))
            .await
    }

    async fn incr_conversion_count(
        &self,
        campaign_id: Uuid,
        day: NaiveDate,
    ) -> anyhow::Result<i64> {
        self.incr_with_expiry(&conversion_count_key(campaign_id, day))
            .await
    }

    async fn get_click_count(&self, campaign_id: Uuid, day: NaiveDate) -> anyhow::Result<i64> {
        self.get(&click_count_key(campaign_id, day)).await
    }

    async fn get_conversion_count(
        &self,
        campaign_id: Uuid,
        day: NaiveDate,
    ) -> anyhow::Result<i64> {
        self.get(&conversion_count_key(campaign_id, day)).await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().await;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn key_format_matches_spec() {
        let id = Uuid::nil();
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(
            click_count_key(id, day),
            "click_count:00000000-0000-0000-0000-000000000000:2024-01-15"
        );
        assert_eq!(
            conversion_count_key(id, day),
            "conversion_count:00000000-0000-0000-0000-000000000000:2024-01-15"
        );
    }

    #[test]
    fn ttl_extends_through_end_of_tomorrow() {
        let now = Local.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let ttl = seconds_until_end_of_tomorrow(now);
        // 2024-01-15 10:00:00 -> 2024-01-16 23:59:59 is 37h59m59s.
        assert_eq!(ttl, 37 * 3600 + 59 * 60 + 59);
    }

    #[test]
    fn ttl_just_after_midnight_is_almost_two_full_days() {
        let now = Local.with_ymd_and_hms(2024, 1, 15, 0, 0, 1).unwrap();
        let ttl = seconds_until_end_of_tomorrow(now);
        assert_eq!(ttl, 47 * 3600 + 59 * 60 + 58);
    }
}
