use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel};

use crate::{DLQ_EXCHANGE, RETRY_EXCHANGE};

/// Exponential backoff budget for consumer-side failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Per-message TTL for the n-th retry hop: `min(max_delay, base * 2^n)`.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

/// Reads the `x-retry-count` header; absent or unreadable counts as zero.
pub fn retry_count(headers: Option<&FieldTable>) -> u32 {
    let Some(table) = headers else { return 0 };
    match table.inner().get(&ShortString::from("x-retry-count")) {
        Some(AMQPValue::LongInt(n)) => (*n).max(0) as u32,
        Some(AMQPValue::LongLongInt(n)) => (*n).max(0) as u32,
        Some(AMQPValue::ShortInt(n)) => (*n).max(0) as u32,
        Some(AMQPValue::LongUInt(n)) => *n,
        _ => 0,
    }
}

/// Retry bookkeeping headers for the next hop. `x-original-*` are written
/// once on the first failure and preserved afterwards; `x-retry-count` and
/// `x-last-error` are updated every hop.
pub fn evolved_headers(
    existing: Option<&FieldTable>,
    origin_exchange: &str,
    origin_routing_key: &str,
    next_count: u32,
    error: &str,
) -> FieldTable {
    let mut headers = existing.cloned().unwrap_or_default();
    headers.insert(
        "x-retry-count".into(),
        AMQPValue::LongInt(next_count.min(i32::MAX as u32) as i32),
    );
    if !headers.inner().contains_key(&ShortString::from("x-original-exchange")) {
        headers.insert(
            "x-original-exchange".into(),
            AMQPValue::LongString(origin_exchange.into()),
        );
    }
    if !headers.inner().contains_key(&ShortString::from("x-original-routing-key")) {
        headers.insert(
            "x-original-routing-key".into(),
            AMQPValue::LongString(origin_routing_key.into()),
        );
    }
    headers.insert("x-last-error".into(), AMQPValue::LongString(error.into()));
    headers
}

fn forwarded_properties(
    delivery: &Delivery,
    next_count: u32,
    error: &str,
    expiration_ms: Option<u64>,
) -> BasicProperties {
    let headers = evolved_headers(
        delivery.properties.headers().as_ref(),
        delivery.exchange.as_str(),
        delivery.routing_key.as_str(),
        next_count,
        error,
    );
    let mut properties = BasicProperties::default()
        .with_headers(headers)
        .with_delivery_mode(2);
    if let Some(expiration) = expiration_ms {
        properties = properties.with_expiration(ShortString::from(expiration.to_string()));
    }
    if let Some(v) = delivery.properties.content_type().clone() {
        properties = properties.with_content_type(v);
    }
    if let Some(v) = delivery.properties.content_encoding().clone() {
        properties = properties.with_content_encoding(v);
    }
    if let Some(v) = delivery.properties.correlation_id().clone() {
        properties = properties.with_correlation_id(v);
    }
    if let Some(v) = delivery.properties.message_id().clone() {
        properties = properties.with_message_id(v);
    }
    if let Some(v) = *delivery.properties.timestamp() {
        properties = properties.with_timestamp(v);
    }
    if let Some(v) = delivery.properties.kind().clone() {
        properties = properties.with_kind(v);
    }
    if let Some(v) = delivery.properties.app_id().clone() {
        properties = properties.with_app_id(v);
    }
    properties
}

/// Routes a failed delivery: under the retry budget it goes to the retry
/// exchange with an exponential per-message TTL (the retry queue dead-letters
/// it back for redelivery); past the budget it is diverted to the DLQ
/// exchange under its original routing key.
pub async fn route_failure(
    channel: &Channel,
    delivery: &Delivery,
    error: &str,
    policy: &RetryPolicy,
) -> lapin::Result<()> {
    let attempts = retry_count(delivery.properties.headers().as_ref());
    let routing_key = delivery.routing_key.as_str();
    if attempts >= policy.max_retries {
        let properties = forwarded_properties(delivery, attempts, error, None);
        channel
            .basic_publish(
                DLQ_EXCHANGE,
                routing_key,
                BasicPublishOptions::default(),
                &delivery.data,
                properties,
            )
            .await?
            .await?;
    } else {
        let delay = policy.delay_ms(attempts);
        let properties = forwarded_properties(delivery, attempts + 1, error, Some(delay));
        channel
            .basic_publish(
                RETRY_EXCHANGE,
                routing_key,
                BasicPublishOptions::default(),
                &delivery.data,
                properties,
            )
            .await?
            .await?;
    }
    Ok(())
}

/// Consumes `queue`, invoking `handler` per delivery. A handler error routes
/// the message through the retry/DLQ machinery and acks the original; the
/// synchronous caller never sees consumer-side failures.
pub async fn run_consumer<F, Fut>(
    channel: Channel,
    queue: &str,
    consumer_tag: &str,
    policy: RetryPolicy,
    handler: F,
) -> lapin::Result<()>
where
    F: Fn(String, Vec<u8>) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let mut consumer = channel
        .basic_consume(
            queue,
            consumer_tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;
    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(err) => {
                tracing::error!(?err, queue, "Consumer stream error");
                continue;
            }
        };
        match handler(delivery.routing_key.as_str().to_string(), delivery.data.clone()).await {
            Ok(()) => {
                delivery.acker.ack(BasicAckOptions::default()).await?;
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    queue,
                    routing_key = %delivery.routing_key,
                    "Handler failed; routing through retry machinery"
                );
                if let Err(publish_err) =
                    route_failure(&channel, &delivery, &err.to_string(), &policy).await
                {
                    tracing::error!(?publish_err, queue, "Failed to route failed delivery; requeueing");
                    delivery
                        .acker
                        .nack(BasicNackOptions {
                            requeue: true,
                            ..Default::default()
                        })
                        .await?;
                    continue;
                }
                delivery.acker.ack(BasicAckOptions::default()).await?;
            }
        }
    }
    Ok(())
}
