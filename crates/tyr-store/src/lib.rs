//! Durable storage for campaigns, click/conversion events, and campaign
//! journals, expressed as capability traits (spec.md §9's re-architecture
//! guidance) with a Postgres implementation and, for tests, plain
//! in-memory fakes.

mod memory;
mod postgres;
mod traits;

pub use memory::{InMemoryCampaignStore, InMemoryClickStore, InMemoryConversionStore, InMemoryJournalStore};
pub use postgres::{migrate, PgCampaignStore, PgClickStore, PgConversionStore, PgJournalStore};
pub use traits::{CampaignStore, ClickStore, ConversionStore, JournalStore};
