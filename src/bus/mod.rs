//! Broadcast pub/sub between service instances.
//!
//! Lifecycle operations publish whole order documents as JSON; background
//! consumers subscribe by channel name. The [`Broker`] trait is the seam for
//! an external medium; [`InMemoryBroker`] serves a single process and tests.

use std::pin::Pin;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::observability::metrics::Metrics;

/// New and re-dispatched orders looking for a driver.
pub const ORDERS_CHANNEL: &str = "orders";
/// Orders a driver has just accepted.
pub const ORDER_ACCEPTED_CHANNEL: &str = "order:confirmed";

pub type Subscription = Pin<Box<dyn Stream<Item = String> + Send>>;

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), AppError>;

    /// Messages published after this call returns.
    fn subscribe(&self, channel: &str) -> Subscription;
}

pub struct InMemoryBroker {
    channels: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl InMemoryBroker {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), AppError> {
        match self.sender(channel).send(payload) {
            Ok(receivers) => debug!(channel, receivers, "message published"),
            Err(_) => debug!(channel, "message published with no subscribers"),
        }
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> Subscription {
        let channel_name = channel.to_string();
        let stream = BroadcastStream::new(self.sender(channel).subscribe()).filter_map(
            move |message| match message {
                Ok(payload) => Some(payload),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(channel = %channel_name, skipped, "subscriber lagged; messages dropped");
                    None
                }
            },
        );

        Box::pin(stream)
    }
}

/// Serializes `payload` and publishes it on `channel`.
pub async fn publish_json<T: Serialize + Sync>(
    broker: &dyn Broker,
    metrics: &Metrics,
    channel: &str,
    payload: &T,
) -> Result<(), AppError> {
    let body = serde_json::to_string(payload)
        .map_err(|err| AppError::Internal(format!("failed to encode message: {err}")))?;

    broker.publish(channel, body).await?;

    metrics
        .orders_published_total
        .with_label_values(&[channel])
        .inc();
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;

    use super::{Broker, InMemoryBroker};

    #[tokio::test]
    async fn subscribers_receive_messages_of_their_channel_only() {
        let broker = InMemoryBroker::new(16);
        let mut orders = broker.subscribe("orders");
        let mut accepted = broker.subscribe("order:confirmed");

        broker.publish("orders", "one".to_string()).await.unwrap();
        broker
            .publish("order:confirmed", "two".to_string())
            .await
            .unwrap();

        assert_eq!(orders.next().await.as_deref(), Some("one"));
        assert_eq!(accepted.next().await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_not_an_error() {
        let broker = InMemoryBroker::new(16);
        assert!(broker.publish("orders", "lost".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let broker = InMemoryBroker::new(16);
        let mut first = broker.subscribe("orders");
        let mut second = broker.subscribe("orders");

        broker.publish("orders", "fan-out".to_string()).await.unwrap();

        assert_eq!(first.next().await.as_deref(), Some("fan-out"));
        assert_eq!(second.next().await.as_deref(), Some("fan-out"));
    }
}
