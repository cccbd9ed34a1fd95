use std::sync::Arc;

use mockable::DefaultClock;
use prometheus::Registry;
use rdkafka::producer::FutureProducer;
use tyr_cache::CounterCache;
use tyr_config::Config;
use tyr_store::{CampaignStore, ClickStore, ConversionStore, JournalStore};

use crate::metrics::AppMetrics;

/// Shared application state injected into every handler and consumer loop,
/// in the style of the teacher's `app-rs/src/state.rs`. Stores and the
/// counter cache are held as trait objects so the capability interfaces
/// from `tyr-store`/`tyr-cache` stay the seam between this binary and its
/// backends — swapping Postgres or Redis for a test double never touches
/// this type.
pub struct AppState {
    pub config: Config,
    pub click_store: Arc<dyn ClickStore>,
    pub conversion_store: Arc<dyn ConversionStore>,
    pub campaign_store: Arc<dyn CampaignStore>,
    pub journal_store: Arc<dyn JournalStore>,
    pub counter_cache: Arc<dyn CounterCache>,
    pub kafka_producer: FutureProducer,
    pub metrics: &'static AppMetrics,
    pub registry: Registry,
    pub clock: DefaultClock,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        click_store: Arc<dyn ClickStore>,
        conversion_store: Arc<dyn ConversionStore>,
        campaign_store: Arc<dyn CampaignStore>,
        journal_store: Arc<dyn JournalStore>,
        counter_cache: Arc<dyn CounterCache>,
        kafka_producer: FutureProducer,
        metrics: &'static AppMetrics,
        registry: Registry,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            click_store,
            conversion_store,
            campaign_store,
            journal_store,
            counter_cache,
            kafka_producer,
            metrics,
            registry,
            clock: DefaultClock,
        })
    }
}
