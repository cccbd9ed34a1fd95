//! Conversion ingestor and attribution engine (spec.md §4.3): drains the
//! `CONVERSIONS` topic, persists each conversion unattributed, then runs
//! the last-touch attribution lookup against the click store. Same
//! poison-message and DB-failure tolerance as the click ingestor.

use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use tokio_util::sync::CancellationToken;

use tyr_types::ConversionEvent;

use crate::models::ConversionMessage;
use crate::state::AppState;

pub async fn run(state: std::sync::Arc<AppState>, cancellation: CancellationToken) -> anyhow::Result<()> {
    let consumer = tyr_broker::create_consumer(
        &state.config.kafka.broker_url,
        &state.config.kafka.consumer_group,
        "tyr-conversion-ingestor",
    )?;
    tyr_broker::subscribe(&consumer, &[&state.config.kafka.conversion_topic])?;
    tracing::info!(topic = %state.config.kafka.conversion_topic, "conversion ingestor subscribed");

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                tracing::info!("conversion ingestor stopping");
                return Ok(());
            }
            received = consumer.recv() => {
                match received {
                    Ok(message) => process_message(&state, &consumer, &message).await,
                    Err(e) => tracing::warn!(error = %e, "kafka recv error on conversion topic"),
                }
            }
        }
    }
}

async fn process_message(state: &AppState, consumer: &StreamConsumer, message: &BorrowedMessage<'_>) {
    let decoded: anyhow::Result<ConversionMessage> = tyr_broker::decode_payload(message);
    let payload = match decoded {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "poison conversion message, marking consumed");
            state
                .metrics
                .decode_failures_total
                .with_label_values(&[&state.config.kafka.conversion_topic])
                .inc();
            commit(consumer, message);
            return;
        }
    };

    let conversion = ConversionEvent {
        conversion_id: payload.conversion_id,
        campaign_id: payload.campaign_id,
        user_id: payload.user_id,
        click_id: None,
        conversion_date: payload.conversion_date,
        value: payload.value,
        kind: payload.kind,
        source: payload.source,
        created_at: payload.created_at,
    };

    let window_hours = state.config.click_event_time_window_hours;
    match tyr_engine::record_conversion_and_attribute(
        state.click_store.as_ref(),
        state.conversion_store.as_ref(),
        state.counter_cache.as_ref(),
        &conversion,
        window_hours,
    )
    .await
    {
        Ok(Some(_)) => {
            state.metrics.conversions_ingested_total.inc();
            state.metrics.conversions_attributed_total.inc();
        }
        Ok(None) => state.metrics.conversions_ingested_total.inc(),
        Err(e) => tracing::error!(
            conversion_id = %conversion.conversion_id,
            error = %e,
            "failed to record conversion, marking consumed anyway"
        ),
    }

    commit(consumer, message);
}

fn commit(consumer: &StreamConsumer, message: &BorrowedMessage<'_>) {
    if let Err(e) = tyr_broker::mark_consumed(consumer, message) {
        tracing::error!(error = %e, "failed to commit conversion offset");
    }
}
