//! Subscription bookkeeping for per-device broker topics.
//!
//! The broker is not trusted to keep subscriptions alive across
//! reconnects, so `subscribe_all` is re-invoked on every transition into
//! `Connected`. After each (re)subscription pass one realtime request is
//! published per device, since the broker pushes no telemetry unrequested.

use crate::client::PubSubClient;
use crate::connection::ConnectionManager;
use crate::topic::TopicSet;
use chrono::Utc;
use solarlink_core::{BridgeEvent, Device, SharedEventBus};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Streaming window requested from each device, seconds. Part of the
/// realtime request wire contract.
pub const REALTIME_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Build the outbound realtime request payload.
///
/// Wire shape: `{"id": <uuid>, "operationType": "realtime",
/// "messageType": "request", "data": {"timeout": 60}}`.
pub fn realtime_request_payload() -> Vec<u8> {
    serde_json::json!({
        "id": Uuid::new_v4(),
        "operationType": "realtime",
        "messageType": "request",
        "data": { "timeout": REALTIME_REQUEST_TIMEOUT_SECS },
    })
    .to_string()
    .into_bytes()
}

/// Tracks which from-device topics are currently subscribed and issues
/// subscribe/unsubscribe calls per device.
pub struct SubscriptionManager {
    client: Arc<dyn PubSubClient>,
    events: SharedEventBus,
    subscribed: RwLock<HashSet<String>>,
}

impl SubscriptionManager {
    pub fn new(client: Arc<dyn PubSubClient>, events: SharedEventBus) -> Self {
        Self {
            client,
            events,
            subscribed: RwLock::new(HashSet::new()),
        }
    }

    /// Currently subscribed topics.
    pub async fn subscribed_topics(&self) -> HashSet<String> {
        self.subscribed.read().await.clone()
    }

    /// Subscribe the two from-device topics of every device.
    ///
    /// Sequential on purpose, as a courtesy to the broker during startup
    /// bursts, not a correctness requirement. A per-topic failure is
    /// reported as an error event and does not abort the remaining
    /// devices.
    pub async fn subscribe_all(&self, devices: &[Device]) {
        for device in devices {
            let Some(topics) = TopicSet::for_device(device) else {
                debug!(
                    "device {} has no addressable transport, skipping",
                    device.device_local_id
                );
                continue;
            };

            for topic in topics.inbound() {
                match self.client.subscribe(topic).await {
                    Ok(()) => {
                        self.subscribed.write().await.insert(topic.to_string());
                        debug!("subscribed to {topic}");
                        self.events.publish(BridgeEvent::Subscribed {
                            topic: topic.to_string(),
                            timestamp: Utc::now().timestamp(),
                        });
                    }
                    Err(e) => {
                        warn!("failed to subscribe to {topic}: {e}");
                        self.events.publish(BridgeEvent::TransportError {
                            message: e.to_string(),
                            timestamp: Utc::now().timestamp(),
                        });
                    }
                }
            }
        }
    }

    /// Symmetric teardown. Best effort: failures are not reported per
    /// topic.
    pub async fn unsubscribe_all(&self, devices: &[Device]) {
        for device in devices {
            let Some(topics) = TopicSet::for_device(device) else {
                continue;
            };
            for topic in topics.inbound() {
                let _ = self.client.unsubscribe(topic).await;
                self.subscribed.write().await.remove(topic);
            }
        }
    }

    /// Publish one realtime request per device to its realtime-out
    /// topic, telling the device to start streaming.
    ///
    /// Goes through the connection manager so a request racing a
    /// disconnect degrades to the publish queue instead of being lost.
    pub async fn request_realtime(&self, connection: &ConnectionManager, devices: &[Device]) {
        for device in devices {
            let Some(topics) = TopicSet::for_device(device) else {
                continue;
            };
            connection
                .publish(&topics.realtime_out, realtime_request_payload())
                .await;
        }
    }
}
