mod click_ingestor;
mod conversion_ingestor;
mod error;
mod handlers;
mod metrics;
mod models;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = tyr_config::Config::from_env()?;
    tracing::info!("starting tyr-service");

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.db.max_connections)
        .min_connections(config.db.min_connections)
        .connect(&config.db.connection_string())
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to database, exiting");
            std::process::exit(1);
        }
    };

    if let Err(e) = tyr_store::migrate(&pool).await {
        tracing::error!(error = %e, "failed to run migrations, exiting");
        std::process::exit(1);
    }
    tracing::info!("database ready");

    let counter_cache = match tyr_cache::RedisCounterCache::connect(&config.redis.connection_string()).await {
        Ok(cache) => cache,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to redis, exiting");
            std::process::exit(1);
        }
    };
    match tokio::time::timeout(Duration::from_secs(5), counter_cache.ping()).await {
        Ok(Ok(())) => tracing::info!("redis ready"),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "redis ping failed, exiting");
            std::process::exit(1);
        }
        Err(_) => {
            tracing::error!("redis ping timed out after 5s, exiting");
            std::process::exit(1);
        }
    }

    let kafka_producer = match tyr_broker::create_producer(&config.kafka.broker_url) {
        Ok(producer) => producer,
        Err(e) => {
            tracing::error!(error = %e, "failed to create kafka producer, exiting");
            std::process::exit(1);
        }
    };
    tracing::info!("kafka producer ready");

    let registry = Registry::new();
    let app_metrics = metrics::init(&registry);

    let click_store = Arc::new(tyr_store::PgClickStore::new(pool.clone()));
    let conversion_store = Arc::new(tyr_store::PgConversionStore::new(pool.clone()));
    let campaign_store = Arc::new(tyr_store::PgCampaignStore::new(pool.clone()));
    let journal_store = Arc::new(tyr_store::PgJournalStore::new(pool.clone()));

    let http_port = config.http_port;
    let app_state = AppState::new(
        config,
        click_store,
        conversion_store,
        campaign_store,
        journal_store,
        Arc::new(counter_cache),
        kafka_producer,
        app_metrics,
        registry,
    );

    let cancellation = CancellationToken::new();

    let metrics_enabled = app_state.config.metrics_enabled;
    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/clicks", post(handlers::create_click))
        .route("/api/conversions", post(handlers::create_conversion))
        .route(
            "/api/calculate-yesterday-metrics",
            post(handlers::calculate_yesterday_metrics),
        )
        .route("/api/campaign-statistics", get(handlers::campaign_statistics));

    if metrics_enabled {
        app = app.route("/metrics", get(handlers::metrics));
    }

    let app = app.layer(CorsLayer::permissive()).with_state(Arc::clone(&app_state));

    let addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");

    let server_cancellation = cancellation.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                server_cancellation.cancelled().await;
                tracing::info!("http server draining (10s grace period)");
            })
            .await
    });

    let click_ingestor = tokio::spawn(click_ingestor::run(Arc::clone(&app_state), cancellation.clone()));
    let conversion_ingestor =
        tokio::spawn(conversion_ingestor::run(Arc::clone(&app_state), cancellation.clone()));

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, cancelling tasks");
    cancellation.cancel();

    let grace = tokio::time::timeout(Duration::from_secs(10), server);
    match grace.await {
        Ok(Ok(Ok(()))) => tracing::info!("http server stopped cleanly"),
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "http server exited with error"),
        Ok(Err(e)) => tracing::error!(error = %e, "http server task panicked"),
        Err(_) => tracing::warn!("http server did not stop within the 10s grace period"),
    }

    let _ = click_ingestor.await;
    let _ = conversion_ingestor.await;

    tracing::info!("tyr-service stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
