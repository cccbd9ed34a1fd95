//! Synthetic traffic generator for the intake API (spec.md §4.1), grounded
//! on the teacher's `traffic-generator-rs`: a worker pool hammering a target
//! host at a configured rate, with a warmup phase and a periodic stats
//! reporter. Adapted here to post clicks and conversions instead of
//! shorten/redirect requests, and to remember recently-sent clicks so
//! conversions can reference a campaign/user/source pair that has a real
//! chance of being attributed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use rand::Rng;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[derive(Parser, Clone)]
#[command(name = "tyr-loadgen")]
#[command(about = "Traffic generator for the click/conversion intake API")]
struct Args {
    /// Target base URL (e.g., http://localhost:8080)
    #[arg(short, long, default_value = "http://localhost:8080")]
    target: String,

    /// Target requests per second
    #[arg(short, long, default_value = "200")]
    rps: u64,

    /// Test duration in seconds
    #[arg(short, long, default_value = "60")]
    duration: u64,

    /// Traffic pattern: click, conversion, mixed
    #[arg(short, long, default_value = "mixed")]
    pattern: String,

    /// Number of worker tasks
    #[arg(short, long, default_value = "20")]
    workers: usize,

    /// Warmup duration in seconds
    #[arg(long, default_value = "5")]
    warmup: u64,

    /// Number of distinct synthetic campaigns to spread traffic across
    #[arg(long, default_value = "5")]
    campaigns: usize,
}

#[derive(Debug, Clone, Copy)]
enum TrafficPattern {
    Click,
    Conversion,
    Mixed,
}

impl TrafficPattern {
    fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "click" => Self::Click,
            "conversion" => Self::Conversion,
            _ => Self::Mixed,
        }
    }
}

const SOURCES: &[&str] = &["google", "facebook", "tiktok", "newsletter", "direct"];
const CONVERSION_KINDS: &[&str] = &["purchase", "signup", "lead"];

#[derive(Clone)]
struct SeenClick {
    campaign_id: Uuid,
    user_id: Uuid,
    source: String,
}

#[derive(Debug, Default)]
struct Metrics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_latency_ms: AtomicU64,
    clicks_sent: AtomicU64,
    conversions_sent: AtomicU64,
}

impl Metrics {
    fn record(&self, success: bool, latency_ms: u64, is_click: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
            self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
            if is_click {
                self.clicks_sent.fetch_add(1, Ordering::Relaxed);
            } else {
                self.conversions_sent.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> Stats {
        let total = self.total_requests.load(Ordering::Relaxed);
        let successful = self.successful_requests.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);
        Stats {
            total,
            successful,
            failed: self.failed_requests.load(Ordering::Relaxed),
            success_rate: if total > 0 { successful as f64 / total as f64 * 100.0 } else { 0.0 },
            avg_latency_ms: if successful > 0 { total_latency / successful } else { 0 },
            clicks_sent: self.clicks_sent.load(Ordering::Relaxed),
            conversions_sent: self.conversions_sent.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Serialize)]
struct Stats {
    total: u64,
    successful: u64,
    failed: u64,
    success_rate: f64,
    avg_latency_ms: u64,
    clicks_sent: u64,
    conversions_sent: u64,
}

struct Generator {
    client: Client,
    metrics: Arc<Metrics>,
    recent_clicks: Arc<RwLock<Vec<SeenClick>>>,
    args: Args,
    pattern: TrafficPattern,
    campaign_ids: Arc<Vec<Uuid>>,
}

impl Generator {
    fn new(args: Args) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(100)
            .build()
            .expect("failed to build http client");

        let campaign_ids = (0..args.campaigns).map(|_| Uuid::new_v4()).collect();
        let pattern = TrafficPattern::from_str(&args.pattern);

        Self {
            client,
            metrics: Arc::new(Metrics::default()),
            recent_clicks: Arc::new(RwLock::new(Vec::new())),
            args,
            pattern,
            campaign_ids: Arc::new(campaign_ids),
        }
    }

    fn clone_for_worker(&self) -> Self {
        Self {
            client: self.client.clone(),
            metrics: Arc::clone(&self.metrics),
            recent_clicks: Arc::clone(&self.recent_clicks),
            args: self.args.clone(),
            pattern: self.pattern,
            campaign_ids: Arc::clone(&self.campaign_ids),
        }
    }

    async fn run(&self) -> Result<()> {
        info!(target = %self.args.target, rps = self.args.rps, duration = self.args.duration, pattern = ?self.pattern, workers = self.args.workers, "starting load generator");

        if self.args.warmup > 0 {
            info!(seconds = self.args.warmup, "warming up");
            self.warmup().await;
        }

        let reporter_metrics = Arc::clone(&self.metrics);
        let duration = self.args.duration;
        let reporter = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(5));
            let start = Instant::now();
            loop {
                ticker.tick().await;
                let elapsed = start.elapsed().as_secs();
                let stats = reporter_metrics.snapshot();
                info!(
                    elapsed_s = elapsed,
                    rps = stats.total as f64 / elapsed.max(1) as f64,
                    success_rate = stats.success_rate,
                    avg_latency_ms = stats.avg_latency_ms,
                    clicks = stats.clicks_sent,
                    conversions = stats.conversions_sent,
                    "progress"
                );
                if elapsed >= duration {
                    break;
                }
            }
        });

        self.generate_traffic().await?;
        reporter.abort();
        self.print_final_report();
        Ok(())
    }

    async fn warmup(&self) {
        let start = Instant::now();
        let warmup_duration = Duration::from_secs(self.args.warmup);
        while start.elapsed() < warmup_duration {
            for _ in 0..5 {
                self.send_request().await;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn generate_traffic(&self) -> Result<()> {
        let start_time = Instant::now();
        let duration = Duration::from_secs(self.args.duration);
        let interval_between_requests =
            Duration::from_nanos(1_000_000_000 / self.args.rps.max(1) / self.args.workers.max(1) as u64);

        let mut handles = Vec::new();
        for _ in 0..self.args.workers {
            let generator = self.clone_for_worker();
            handles.push(tokio::spawn(async move {
                generator.worker_loop(start_time, duration, interval_between_requests).await;
            }));
        }

        for handle in handles {
            handle.await?;
        }
        Ok(())
    }

    async fn worker_loop(&self, start_time: Instant, duration: Duration, interval: Duration) {
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..100));
        let mut next_request_time = start_time + jitter;

        while start_time.elapsed() < duration {
            let now = Instant::now();
            if now >= next_request_time {
                self.send_request().await;
                next_request_time = now + interval;
            } else {
                tokio::time::sleep(next_request_time - now).await;
            }
        }
    }

    async fn send_request(&self) {
        let start = Instant::now();
        let send_click = match self.pattern {
            TrafficPattern::Click => true,
            TrafficPattern::Conversion => false,
            TrafficPattern::Mixed => rand::thread_rng().gen_range(0..100) < 70,
        };

        let success = if send_click {
            self.send_click().await
        } else {
            self.send_conversion().await
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        self.metrics.record(success, latency_ms, send_click);
    }

    async fn send_click(&self) -> bool {
        let campaign_id = self.random_campaign();
        let user_id = Uuid::new_v4();
        let source = SOURCES[rand::thread_rng().gen_range(0..SOURCES.len())].to_string();

        let body = serde_json::json!({
            "campaign_id": campaign_id,
            "user_id": user_id,
            "click_date": Utc::now().to_rfc3339(),
            "source": source,
        });

        match self.client.post(format!("{}/api/clicks", self.args.target)).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                self.recent_clicks
                    .write()
                    .await
                    .push(SeenClick { campaign_id, user_id, source });
                let mut clicks = self.recent_clicks.write().await;
                if clicks.len() > 10_000 {
                    let overflow = clicks.len() - 10_000;
                    clicks.drain(0..overflow);
                }
                true
            }
            Ok(response) => {
                warn!(status = %response.status(), "click request failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "click request error");
                false
            }
        }
    }

    async fn send_conversion(&self) -> bool {
        let recent = self.recent_clicks.read().await;
        let (campaign_id, user_id, source) = if recent.is_empty() || rand::thread_rng().gen_range(0..100) < 20 {
            // Occasionally conversions never match a real click, exercising
            // the attribution engine's "no matching click" path.
            (self.random_campaign(), Uuid::new_v4(), SOURCES[0].to_string())
        } else {
            let pick = &recent[rand::thread_rng().gen_range(0..recent.len())];
            (pick.campaign_id, pick.user_id, pick.source.clone())
        };
        drop(recent);

        let kind = CONVERSION_KINDS[rand::thread_rng().gen_range(0..CONVERSION_KINDS.len())];
        let value = rand::thread_rng().gen_range(5..500) as f64 / 100.0 * 100.0;

        let body = serde_json::json!({
            "campaign_id": campaign_id,
            "user_id": user_id,
            "conversion_date": Utc::now().to_rfc3339(),
            "value": value,
            "type": kind,
            "source": source,
        });

        match self.client.post(format!("{}/api/conversions", self.args.target)).json(&body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "conversion request failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "conversion request error");
                false
            }
        }
    }

    fn random_campaign(&self) -> Uuid {
        self.campaign_ids[rand::thread_rng().gen_range(0..self.campaign_ids.len())]
    }

    fn print_final_report(&self) {
        let stats = self.metrics.snapshot();
        info!(
            total = stats.total,
            successful = stats.successful,
            failed = stats.failed,
            success_rate = stats.success_rate,
            avg_latency_ms = stats.avg_latency_ms,
            clicks_sent = stats.clicks_sent,
            conversions_sent = stats.conversions_sent,
            target_rps = self.args.rps,
            actual_rps = stats.total as f64 / self.args.duration.max(1) as f64,
            "load generation complete"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let generator = Generator::new(args);
    generator.run().await
}
