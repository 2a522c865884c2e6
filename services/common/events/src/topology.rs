use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};

use crate::{
    ANALYTICS_QUEUE, DLQ_EXCHANGE, DLQ_QUEUE, EMAIL_NOTIFICATION_QUEUE, EVENTS_EXCHANGE,
    PAYMENT_CONFIRMED, RESERVATION_CREATED, RESERVATION_CREATED_QUEUE, RETRY_EXCHANGE,
    RETRY_QUEUE, SEAT_RELEASED, SEAT_RELEASED_QUEUE,
};

/// Declares the full bus topology. Idempotent: safe to run on every startup
/// from every replica.
pub async fn declare_topology(channel: &Channel) -> lapin::Result<()> {
    let durable = ExchangeDeclareOptions {
        durable: true,
        ..Default::default()
    };
    for exchange in [EVENTS_EXCHANGE, RETRY_EXCHANGE, DLQ_EXCHANGE] {
        channel
            .exchange_declare(exchange, ExchangeKind::Topic, durable, FieldTable::default())
            .await?;
    }

    let queue_opts = QueueDeclareOptions {
        durable: true,
        ..Default::default()
    };

    for (queue, exchange, binding) in [
        (RESERVATION_CREATED_QUEUE, EVENTS_EXCHANGE, RESERVATION_CREATED),
        (EMAIL_NOTIFICATION_QUEUE, EVENTS_EXCHANGE, PAYMENT_CONFIRMED),
        (ANALYTICS_QUEUE, EVENTS_EXCHANGE, "#"),
        (SEAT_RELEASED_QUEUE, EVENTS_EXCHANGE, SEAT_RELEASED),
        (DLQ_QUEUE, DLQ_EXCHANGE, "#"),
    ] {
        channel
            .queue_declare(queue, queue_opts, FieldTable::default())
            .await?;
        channel
            .queue_bind(queue, exchange, binding, QueueBindOptions::default(), FieldTable::default())
            .await?;
    }

    // The retry queue is never consumed; expired messages dead-letter back to
    // the events exchange carrying their original routing key.
    let mut retry_args = FieldTable::default();
    retry_args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(EVENTS_EXCHANGE.into()),
    );
    channel
        .queue_declare(RETRY_QUEUE, queue_opts, retry_args)
        .await?;
    channel
        .queue_bind(RETRY_QUEUE, RETRY_EXCHANGE, "#", QueueBindOptions::default(), FieldTable::default())
        .await?;

    Ok(())
}
