use anyhow::{Context, Result};
use lapin::options::BasicPublishOptions;
use lapin::types::ShortString;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use serde_json::Value;

use crate::topology::declare_topology;
use crate::EVENTS_EXCHANGE;

/// Publisher of persistent JSON events on the `cinema_events` topic exchange.
///
/// Publishing is fire-and-forget from the caller's perspective: the domain
/// write has already committed by the time an event goes out, and a crash in
/// between loses the event (accepted until an outbox exists). Callers log
/// failures and carry on.
#[derive(Clone)]
pub struct EventPublisher {
    channel: Channel,
}

impl EventPublisher {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Connects, opens a channel, and declares the bus topology.
    pub async fn connect(uri: &str) -> Result<Self> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;
        let channel = connection
            .create_channel()
            .await
            .context("Failed to open RabbitMQ channel")?;
        declare_topology(&channel)
            .await
            .context("Failed to declare event topology")?;
        Ok(Self::new(channel))
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Publishes one persistent message to `cinema_events`.
    pub async fn publish(&self, routing_key: &str, payload: &Value) -> Result<()> {
        let body = serde_json::to_vec(payload)?;
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from("application/json"))
            .with_delivery_mode(2);
        self.channel
            .basic_publish(
                EVENTS_EXCHANGE,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?
            .await?;
        Ok(())
    }
}
