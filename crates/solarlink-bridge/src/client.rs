//! Broker client seam.
//!
//! All broker I/O goes through [`PubSubClient`] so the state machine,
//! queue drain order and resubscription logic can be exercised against a
//! recording double. Production uses [`RumqttcClient`], a thin wrapper
//! over the managed MQTT client.

use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Managed publish/subscribe client capability.
///
/// Mirrors what the remote broker offers this bridge: topic subscribe,
/// unsubscribe and publish. Connection lifecycle notifications arrive
/// out of band through the session event loop.
#[async_trait]
pub trait PubSubClient: Send + Sync {
    async fn subscribe(&self, topic: &str) -> BridgeResult<()>;
    async fn unsubscribe(&self, topic: &str) -> BridgeResult<()>;
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BridgeResult<()>;
}

/// Production client backed by rumqttc.
///
/// All operations are QoS 0: the broker side treats telemetry as
/// fire-and-forget and the realtime request is repeated on every
/// (re)subscribe pass anyway.
pub struct RumqttcClient {
    client: rumqttc::AsyncClient,
}

impl RumqttcClient {
    pub fn new(client: rumqttc::AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PubSubClient for RumqttcClient {
    async fn subscribe(&self, topic: &str) -> BridgeResult<()> {
        self.client
            .subscribe(topic, rumqttc::QoS::AtMostOnce)
            .await
            .map_err(|e| BridgeError::Subscription {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn unsubscribe(&self, topic: &str) -> BridgeResult<()> {
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|e| BridgeError::Subscription {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BridgeResult<()> {
        self.client
            .publish(topic, rumqttc::QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| BridgeError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

/// One recorded broker operation, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerOp {
    Subscribe(String),
    Unsubscribe(String),
    Publish { topic: String, payload: Vec<u8> },
}

/// Recording client for tests.
///
/// Registers every call in order and can be told to fail publishes or
/// individual topic subscriptions.
#[derive(Default)]
pub struct RecordingClient {
    ops: Mutex<Vec<BrokerOp>>,
    fail_publishes: AtomicBool,
    fail_subscriptions: Mutex<Vec<String>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::Relaxed);
    }

    /// Make subscriptions to the given topic fail.
    pub async fn fail_subscription(&self, topic: impl Into<String>) {
        self.fail_subscriptions.lock().await.push(topic.into());
    }

    /// All operations seen so far, in call order.
    pub async fn ops(&self) -> Vec<BrokerOp> {
        self.ops.lock().await.clone()
    }

    /// Published (topic, payload) pairs, in call order.
    pub async fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.ops
            .lock()
            .await
            .iter()
            .filter_map(|op| match op {
                BrokerOp::Publish { topic, payload } => Some((topic.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }

    /// Subscribed topics, in call order.
    pub async fn subscriptions(&self) -> Vec<String> {
        self.ops
            .lock()
            .await
            .iter()
            .filter_map(|op| match op {
                BrokerOp::Subscribe(topic) => Some(topic.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn clear(&self) {
        self.ops.lock().await.clear();
    }
}

#[async_trait]
impl PubSubClient for RecordingClient {
    async fn subscribe(&self, topic: &str) -> BridgeResult<()> {
        self.ops
            .lock()
            .await
            .push(BrokerOp::Subscribe(topic.to_string()));
        if self.fail_subscriptions.lock().await.iter().any(|t| t == topic) {
            return Err(BridgeError::Subscription {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> BridgeResult<()> {
        self.ops
            .lock()
            .await
            .push(BrokerOp::Unsubscribe(topic.to_string()));
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BridgeResult<()> {
        self.ops.lock().await.push(BrokerOp::Publish {
            topic: topic.to_string(),
            payload,
        });
        if self.fail_publishes.load(Ordering::Relaxed) {
            return Err(BridgeError::Publish {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_client_keeps_call_order() {
        let client = RecordingClient::new();
        client.subscribe("a").await.unwrap();
        client.publish("b", b"x".to_vec()).await.unwrap();
        client.unsubscribe("a").await.unwrap();

        assert_eq!(
            client.ops().await,
            vec![
                BrokerOp::Subscribe("a".to_string()),
                BrokerOp::Publish {
                    topic: "b".to_string(),
                    payload: b"x".to_vec()
                },
                BrokerOp::Unsubscribe("a".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_injected_publish_failure() {
        let client = RecordingClient::new();
        client.fail_publishes(true);
        assert!(client.publish("t", vec![]).await.is_err());
        // The attempt is still recorded.
        assert_eq!(client.published().await.len(), 1);
    }
}
