//! Attribution engine, journal builder, and statistics assembler — the
//! three algorithmic cores of the pipeline (spec.md §4.3, §4.4, §4.5).
//! Every function here is pure with respect to its storage/cache
//! arguments (capability traits from `tyr-store`/`tyr-cache`), so it is
//! unit-testable with the in-memory fakes without a running Postgres,
//! Redis, or Kafka.

pub mod attribution;
pub mod journal;
pub mod period;
pub mod statistics;

pub use attribution::{now, record_click, record_conversion_and_attribute};
pub use journal::{build_journal_for_campaign, rollup_for_day, run_daily_rollup};
pub use period::{month_start_date, period_label, week_start_date};
pub use statistics::{assemble_statistics, get_campaign_statistics};
