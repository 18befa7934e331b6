//! Transport channel abstraction
//!
//! One logical broadcast topic per activity. Subscribing yields raw message
//! payloads in publish order; dropping the subscription is the unsubscribe.
//! Clients never publish to the topic (commands go through the REST
//! backend), so the trait exposes nothing but `subscribe`.

use crate::types::ActivityId;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to subscribe: {0}")]
    Subscribe(String),
    #[error("activity {0} has no open topic")]
    UnknownTopic(ActivityId),
}

/// A live subscription to one activity topic.
///
/// Messages arrive in publish order. `None` means the topic closed or the
/// transport dropped this subscriber, at which point the room applies its
/// reconnect policy.
#[derive(Debug)]
pub struct TopicSubscription {
    messages: mpsc::Receiver<String>,
}

impl TopicSubscription {
    pub fn new(messages: mpsc::Receiver<String>) -> Self {
        Self { messages }
    }

    /// Next raw message payload, or `None` once the topic is gone.
    pub async fn next(&mut self) -> Option<String> {
        self.messages.recv().await
    }
}

#[async_trait]
pub trait TopicTransport: Send + Sync {
    /// Open a subscription to the activity's broadcast topic.
    async fn subscribe(
        &self,
        activity_id: ActivityId,
    ) -> Result<TopicSubscription, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_drains_in_order_then_ends() {
        let (tx, rx) = mpsc::channel(4);
        let mut sub = TopicSubscription::new(rx);
        tx.send("first".to_string()).await.unwrap();
        tx.send("second".to_string()).await.unwrap();
        drop(tx);

        assert_eq!(sub.next().await.as_deref(), Some("first"));
        assert_eq!(sub.next().await.as_deref(), Some("second"));
        assert_eq!(sub.next().await, None);
    }
}
