//! Thin Kafka wrappers around `rdkafka`, mirroring the teacher's
//! `kafka.rs`/`ingestion-rs` style: a synchronous, acked producer send and a
//! consumer that commits offsets itself (here: manually, after the caller
//! has finished processing a message, so a poison message is skipped rather
//! than retried forever).

use std::time::Duration;

use anyhow::{Context, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Build a producer that waits for broker acknowledgement (`acks=all`) and
/// retries transient failures up to 3 times before giving up on a send.
pub fn create_producer(bootstrap_servers: &str) -> Result<FutureProducer> {
    ClientConfig::new()
        .set("bootstrap.servers", bootstrap_servers)
        .set("message.timeout.ms", "5000")
        .set("acks", "all")
        .set("retries", "3")
        .create()
        .context("failed to create kafka producer")
}

/// Publish `payload` as JSON, blocking until the broker has acked it or the
/// send has exhausted its retries.
pub async fn publish<T: Serialize + Sync>(
    producer: &FutureProducer,
    topic: &str,
    key: &str,
    payload: &T,
) -> Result<()> {
    let body = serde_json::to_string(payload).context("failed to encode kafka payload")?;
    let record = FutureRecord::to(topic).key(key).payload(&body);
    producer
        .send(record, Duration::from_secs(5))
        .await
        .map(|_| ())
        .map_err(|(e, _)| anyhow::anyhow!("kafka publish to {topic} failed: {e}"))
}

/// A consumer group member. Offsets are committed manually by the caller via
/// [`mark_consumed`] once a message has been durably processed (or given up
/// on), giving the at-least-once semantics the ingestor loops rely on.
pub fn create_consumer(bootstrap_servers: &str, group_id: &str, client_id: &str) -> Result<StreamConsumer> {
    ClientConfig::new()
        .set("bootstrap.servers", bootstrap_servers)
        .set("group.id", group_id)
        .set("client.id", client_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "latest")
        .set("session.timeout.ms", "30000")
        .set("partition.assignment.strategy", "roundrobin")
        .create()
        .context("failed to create kafka consumer")
}

pub fn subscribe(consumer: &StreamConsumer, topics: &[&str]) -> Result<()> {
    consumer
        .subscribe(topics)
        .with_context(|| format!("failed to subscribe to {topics:?}"))
}

/// Decode a message's payload as JSON. A message with no payload or
/// malformed JSON is a poison message: the caller should log it, call
/// [`mark_consumed`] anyway, and move on.
pub fn decode_payload<T: DeserializeOwned>(message: &BorrowedMessage<'_>) -> Result<T> {
    let payload = message.payload().context("empty kafka payload")?;
    serde_json::from_slice(payload).context("invalid kafka payload json")
}

/// Commit the offset past `message`. Called after processing succeeds *or*
/// after it fails permanently (poison message) — never left uncommitted,
/// or the consumer would spin on the same message forever.
pub fn mark_consumed(consumer: &StreamConsumer, message: &BorrowedMessage<'_>) -> Result<()> {
    consumer
        .commit_message(message, CommitMode::Sync)
        .context("failed to commit kafka offset")
}
