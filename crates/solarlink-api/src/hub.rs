//! Registry of local real-time subscribers.
//!
//! Each subscriber is a live local connection holding a device-id
//! filter. Delivery is fire-and-forget: no acknowledgment, no
//! backpressure, so a slow or closed subscriber never blocks delivery to
//! the others. The registry is mutated concurrently by client
//! connect/disconnect/filter updates while broadcasts iterate it.

use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Wildcard filter value matching every device.
pub const FILTER_ALL: &str = "ALL";

struct LocalSubscriber {
    /// `None` until the client sends its first filter message; matches
    /// nothing in that window. Any literal other than the wildcard or
    /// an exact device id is stored as-is and simply never matches.
    filter: Option<String>,
    tx: mpsc::UnboundedSender<String>,
}

impl LocalSubscriber {
    fn matches(&self, device_id: &str) -> bool {
        self.filter
            .as_deref()
            .is_some_and(|f| f == FILTER_ALL || f == device_id)
    }
}

/// Registry of currently connected local subscribers and their filters.
#[derive(Default)]
pub struct LocalBroadcastHub {
    subscribers: RwLock<HashMap<Uuid, LocalSubscriber>>,
}

impl LocalBroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. The returned id scopes all further
    /// calls for this connection.
    pub async fn register(&self, tx: mpsc::UnboundedSender<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.subscribers
            .write()
            .await
            .insert(id, LocalSubscriber { filter: None, tx });
        debug!("local subscriber {id} registered");
        id
    }

    /// Replace a subscriber's filter. The value persists until replaced
    /// again or the subscriber disconnects.
    pub async fn set_filter(&self, id: Uuid, filter: impl Into<String>) {
        let filter = filter.into();
        if let Some(subscriber) = self.subscribers.write().await.get_mut(&id) {
            debug!("local subscriber {id} filter set to {filter:?}");
            subscriber.filter = Some(filter);
        }
    }

    /// Remove a subscriber; further broadcasts skip it.
    pub async fn remove(&self, id: Uuid) {
        if self.subscribers.write().await.remove(&id).is_some() {
            debug!("local subscriber {id} removed");
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Deliver a frame to every subscriber whose filter matches the
    /// device id. Subscribers whose transport is gone are skipped
    /// silently and dropped from the registry.
    ///
    /// Returns the number of deliveries.
    pub async fn broadcast(&self, device_id: &str, frame: &str) -> usize {
        let mut delivered = 0;
        let stale: Vec<Uuid> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .iter()
                .filter(|(_, s)| s.matches(device_id))
                .filter_map(|(id, s)| {
                    if s.tx.send(frame.to_string()).is_ok() {
                        delivered += 1;
                        None
                    } else {
                        Some(*id)
                    }
                })
                .collect()
        };

        for id in stale {
            self.remove(id).await;
        }
        delivered
    }
}
