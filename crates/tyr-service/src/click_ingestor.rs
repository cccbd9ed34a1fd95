//! Click ingestor (spec.md §4.2): drains the `CLICKS` topic under the
//! stable `tyr` consumer group, persists each click, and bumps the daily
//! click counter. Poison messages and DB failures are both logged and the
//! offset is marked consumed regardless — forward progress over perfect
//! delivery, per spec.md §4.2 and §7.

use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use tokio_util::sync::CancellationToken;

use tyr_types::ClickEvent;

use crate::models::ClickMessage;
use crate::state::AppState;

pub async fn run(state: std::sync::Arc<AppState>, cancellation: CancellationToken) -> anyhow::Result<()> {
    let consumer = tyr_broker::create_consumer(
        &state.config.kafka.broker_url,
        &state.config.kafka.consumer_group,
        "tyr-click-ingestor",
    )?;
    tyr_broker::subscribe(&consumer, &[&state.config.kafka.click_topic])?;
    tracing::info!(topic = %state.config.kafka.click_topic, "click ingestor subscribed");

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                tracing::info!("click ingestor stopping");
                return Ok(());
            }
            received = consumer.recv() => {
                match received {
                    Ok(message) => process_message(&state, &consumer, &message).await,
                    Err(e) => tracing::warn!(error = %e, "kafka recv error on click topic"),
                }
            }
        }
    }
}

async fn process_message(state: &AppState, consumer: &StreamConsumer, message: &BorrowedMessage<'_>) {
    let decoded: anyhow::Result<ClickMessage> = tyr_broker::decode_payload(message);
    let payload = match decoded {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "poison click message, marking consumed");
            state
                .metrics
                .decode_failures_total
                .with_label_values(&[&state.config.kafka.click_topic])
                .inc();
            commit(consumer, message);
            return;
        }
    };

    let click = ClickEvent {
        click_id: payload.click_id,
        campaign_id: payload.campaign_id,
        user_id: payload.user_id,
        click_date: payload.click_date,
        source: payload.source,
        created_at: payload.created_at,
    };

    match tyr_engine::record_click(state.click_store.as_ref(), state.counter_cache.as_ref(), &click).await {
        Ok(()) => state.metrics.clicks_ingested_total.inc(),
        Err(e) => tracing::error!(
            click_id = %click.click_id,
            error = %e,
            "failed to record click, marking consumed anyway"
        ),
    }

    commit(consumer, message);
}

fn commit(consumer: &StreamConsumer, message: &BorrowedMessage<'_>) {
    if let Err(e) = tyr_broker::mark_consumed(consumer, message) {
        tracing::error!(error = %e, "failed to commit click offset");
    }
}
