//! Broker connection state machine and publish path.
//!
//! One [`ConnectionManager`] owns the session state for the single
//! logical broker connection of the process. Transitions:
//!
//! ```text
//! Disconnected → Connecting → Connected → Disconnected   (normal close)
//! Connected → Reconnecting → Connected                   (transient loss)
//! * → Errored                                            (fatal; no self-heal)
//! ```
//!
//! `Errored` is terminal for this session: the surrounding process must
//! refresh credentials and construct a new session.

use crate::client::PubSubClient;
use crate::error::BridgeResult;
use crate::queue::{PendingPublish, PublishQueue};
use chrono::Utc;
use solarlink_core::{BridgeEvent, SharedEventBus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, warn};

/// Connection state of the broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Errored,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

impl ConnectionState {
    /// Whether broker I/O may be attempted in this state.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Owns the broker session state, the publish queue and the error flag.
pub struct ConnectionManager {
    client: Arc<dyn PubSubClient>,
    state: RwLock<ConnectionState>,
    queue: PublishQueue,
    events: SharedEventBus,
    /// Readable for health checks; set on transport errors, cleared when
    /// a (re)connection succeeds.
    error_flag: AtomicBool,
}

impl ConnectionManager {
    pub fn new(client: Arc<dyn PubSubClient>, events: SharedEventBus) -> Self {
        Self {
            client,
            state: RwLock::new(ConnectionState::Disconnected),
            queue: PublishQueue::new(),
            events,
            error_flag: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Whether a transport error has been observed since the last
    /// successful (re)connection.
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::Relaxed)
    }

    pub async fn queued_publishes(&self) -> usize {
        self.queue.len().await
    }

    /// Session construction is underway; completion is signaled through
    /// state transition events, never by blocking the caller.
    pub async fn mark_connecting(&self) {
        *self.state.write().await = ConnectionState::Connecting;
        debug!("broker session connecting");
    }

    /// Entered `Connected`, either the first time or after a reconnect.
    pub async fn mark_connected(&self) {
        *self.state.write().await = ConnectionState::Connected;
        self.error_flag.store(false, Ordering::Relaxed);
        info!("broker session connected");
        self.events.publish(BridgeEvent::Connected {
            timestamp: Utc::now().timestamp(),
        });
    }

    pub async fn mark_disconnected(&self) {
        *self.state.write().await = ConnectionState::Disconnected;
        warn!("broker session closed");
        self.events.publish(BridgeEvent::Disconnected {
            timestamp: Utc::now().timestamp(),
        });
    }

    /// Transient transport loss; the underlying client retries with its
    /// own backoff. Emits `Reconnecting` once per outage and a transport
    /// error event for every observed failure.
    pub async fn mark_reconnecting(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.error_flag.store(true, Ordering::Relaxed);
        self.events.publish(BridgeEvent::TransportError {
            message: reason.clone(),
            timestamp: Utc::now().timestamp(),
        });

        let mut state = self.state.write().await;
        if *state != ConnectionState::Reconnecting {
            *state = ConnectionState::Reconnecting;
            warn!("broker session lost, retrying: {reason}");
            self.events.publish(BridgeEvent::Reconnecting {
                timestamp: Utc::now().timestamp(),
            });
        }
    }

    /// Fatal session failure. New broker activity stops; recovery needs
    /// refreshed credentials and a fresh session.
    pub async fn mark_errored(&self, reason: impl Into<String>) {
        let reason = reason.into();
        *self.state.write().await = ConnectionState::Errored;
        self.error_flag.store(true, Ordering::Relaxed);
        tracing::error!("broker session errored: {reason}");
        self.events.publish(BridgeEvent::Errored {
            reason,
            timestamp: Utc::now().timestamp(),
        });
    }

    /// Publish, or park for later.
    ///
    /// Connected: attempt a direct publish; a failure degrades the item
    /// to the queue (not dropped) and is also surfaced as an error
    /// event. Not connected: always enqueue.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) {
        self.publish_with_completion(topic, payload, None).await;
    }

    /// [`ConnectionManager::publish`] with an optional completion that
    /// fires with the final publish outcome.
    pub async fn publish_with_completion(
        &self,
        topic: &str,
        payload: Vec<u8>,
        completion: Option<oneshot::Sender<BridgeResult<()>>>,
    ) {
        if self.state().await.is_connected() {
            match self.client.publish(topic, payload.clone()).await {
                Ok(()) => {
                    debug!("published to {topic}");
                    if let Some(tx) = completion {
                        let _ = tx.send(Ok(()));
                    }
                }
                Err(e) => {
                    warn!("direct publish to {topic} failed, queueing: {e}");
                    self.error_flag.store(true, Ordering::Relaxed);
                    self.events.publish(BridgeEvent::TransportError {
                        message: e.to_string(),
                        timestamp: Utc::now().timestamp(),
                    });
                    let mut item = PendingPublish::new(topic, payload);
                    if let Some(tx) = completion {
                        item = item.with_completion(tx);
                    }
                    self.queue.push(item).await;
                }
            }
        } else {
            debug!("not connected, queueing publish to {topic}");
            let mut item = PendingPublish::new(topic, payload);
            if let Some(tx) = completion {
                item = item.with_completion(tx);
            }
            self.queue.push(item).await;
        }
    }

    /// Drain the publish queue strictly in arrival order.
    ///
    /// Each drained item's completion fires with the publish outcome. A
    /// failed item is not re-queued (its failure has been propagated)
    /// and draining continues with the next item.
    pub async fn drain_queue(&self) {
        while let Some(item) = self.queue.pop().await {
            let outcome = self.client.publish(&item.topic, item.payload.clone()).await;
            match &outcome {
                Ok(()) => debug!("drained queued publish to {}", item.topic),
                Err(e) => {
                    warn!("queued publish to {} failed: {e}", item.topic);
                    self.error_flag.store(true, Ordering::Relaxed);
                    self.events.publish(BridgeEvent::TransportError {
                        message: e.to_string(),
                        timestamp: Utc::now().timestamp(),
                    });
                }
            }
            item.complete(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RecordingClient;
    use solarlink_core::EventBus;

    fn manager() -> (Arc<RecordingClient>, ConnectionManager) {
        let client = Arc::new(RecordingClient::new());
        let events: SharedEventBus = Arc::new(EventBus::new());
        let manager = ConnectionManager::new(client.clone(), events);
        (client, manager)
    }

    #[tokio::test]
    async fn test_disconnected_publish_is_queued_not_attempted() {
        let (client, manager) = manager();

        manager.publish("t/a", b"a".to_vec()).await;
        manager.publish("t/b", b"b".to_vec()).await;

        assert!(client.published().await.is_empty());
        assert_eq!(manager.queued_publishes().await, 2);
    }

    #[tokio::test]
    async fn test_drain_preserves_fifo_order() {
        let (client, manager) = manager();

        manager.publish("t/a", b"a".to_vec()).await;
        manager.publish("t/b", b"b".to_vec()).await;
        manager.publish("t/c", b"c".to_vec()).await;

        manager.mark_connected().await;
        manager.drain_queue().await;

        let topics: Vec<String> = client
            .published()
            .await
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(topics, vec!["t/a", "t/b", "t/c"]);
        assert_eq!(manager.queued_publishes().await, 0);
    }

    #[tokio::test]
    async fn test_failed_direct_publish_degrades_to_queue() {
        let (client, manager) = manager();
        manager.mark_connected().await;
        client.fail_publishes(true);

        manager.publish("t/a", b"a".to_vec()).await;

        assert_eq!(manager.queued_publishes().await, 1);
        assert!(manager.has_error());
    }

    #[tokio::test]
    async fn test_completion_fires_on_drain() {
        let (_client, manager) = manager();
        let (tx, rx) = oneshot::channel();

        manager
            .publish_with_completion("t/a", b"a".to_vec(), Some(tx))
            .await;
        manager.mark_connected().await;
        manager.drain_queue().await;

        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_error_flag_clears_on_connect() {
        let (_client, manager) = manager();
        manager.mark_reconnecting("boom").await;
        assert!(manager.has_error());
        assert_eq!(manager.state().await, ConnectionState::Reconnecting);

        manager.mark_connected().await;
        assert!(!manager.has_error());
        assert_eq!(manager.state().await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_errored_is_reported() {
        let client = Arc::new(RecordingClient::new());
        let events: SharedEventBus = Arc::new(EventBus::new());
        let manager = ConnectionManager::new(client, events.clone());
        let mut rx = events.connection_events();

        manager.mark_errored("credentials rejected").await;
        assert_eq!(manager.state().await, ConnectionState::Errored);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.type_name(), "Errored");
    }
}
