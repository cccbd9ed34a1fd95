//! Prometheus counters exposed on `GET /metrics`, in the style of the
//! teacher's `app-rs/src/metrics.rs` / `rust/app-rs/src/metrics.rs`.

use std::sync::OnceLock;

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

pub struct AppMetrics {
    pub http_requests_total: IntCounterVec,
    pub publish_total: IntCounterVec,
    pub publish_failures_total: IntCounterVec,
    pub clicks_ingested_total: IntCounter,
    pub conversions_ingested_total: IntCounter,
    pub conversions_attributed_total: IntCounter,
    pub decode_failures_total: IntCounterVec,
    pub journal_rollups_total: IntCounter,
}

static METRICS: OnceLock<AppMetrics> = OnceLock::new();

pub fn init(registry: &Registry) -> &'static AppMetrics {
    METRICS.get_or_init(|| {
        let http_requests_total = IntCounterVec::new(
            Opts::new("tyr_http_requests_total", "HTTP requests by handler and status"),
            &["handler", "method", "status_code"],
        )
        .unwrap();
        let publish_total = IntCounterVec::new(
            Opts::new("tyr_kafka_publish_total", "Successful publishes by topic"),
            &["topic"],
        )
        .unwrap();
        let publish_failures_total = IntCounterVec::new(
            Opts::new("tyr_kafka_publish_failures_total", "Failed publishes by topic"),
            &["topic"],
        )
        .unwrap();
        let clicks_ingested_total = IntCounter::with_opts(Opts::new(
            "tyr_clicks_ingested_total",
            "Click events persisted by the click ingestor",
        ))
        .unwrap();
        let conversions_ingested_total = IntCounter::with_opts(Opts::new(
            "tyr_conversions_ingested_total",
            "Conversion events persisted by the conversion ingestor",
        ))
        .unwrap();
        let conversions_attributed_total = IntCounter::with_opts(Opts::new(
            "tyr_conversions_attributed_total",
            "Conversions that matched a click in the attribution lookup",
        ))
        .unwrap();
        let decode_failures_total = IntCounterVec::new(
            Opts::new("tyr_decode_failures_total", "Poison messages by topic"),
            &["topic"],
        )
        .unwrap();
        let journal_rollups_total = IntCounter::with_opts(Opts::new(
            "tyr_journal_rollups_total",
            "Campaign journal rows written by the daily rollup",
        ))
        .unwrap();

        registry.register(Box::new(http_requests_total.clone())).ok();
        registry.register(Box::new(publish_total.clone())).ok();
        registry.register(Box::new(publish_failures_total.clone())).ok();
        registry.register(Box::new(clicks_ingested_total.clone())).ok();
        registry.register(Box::new(conversions_ingested_total.clone())).ok();
        registry.register(Box::new(conversions_attributed_total.clone())).ok();
        registry.register(Box::new(decode_failures_total.clone())).ok();
        registry.register(Box::new(journal_rollups_total.clone())).ok();

        AppMetrics {
            http_requests_total,
            publish_total,
            publish_failures_total,
            clicks_ingested_total,
            conversions_ingested_total,
            conversions_attributed_total,
            decode_failures_total,
            journal_rollups_total,
        }
    })
}

pub fn gather(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buf = Vec::new();
    encoder.encode(&registry.gather(), &mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}
