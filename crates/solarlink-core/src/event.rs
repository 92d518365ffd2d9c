//! Typed event stream for the telemetry bridge.
//!
//! All components communicate through one broadcast bus carrying
//! [`BridgeEvent`] values. Each event category the bridge can produce is
//! its own variant; there is no string-keyed listener registration, and
//! a message is delivered to each subscriber exactly once.

use crate::device::Device;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Event emitted by the telemetry bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    /// Broker session established (first connect or after a reconnect).
    Connected { timestamp: i64 },

    /// Broker session closed normally.
    Disconnected { timestamp: i64 },

    /// Transient network loss; the transport is retrying.
    Reconnecting { timestamp: i64 },

    /// Fatal session failure. The bridge does not recover from this on
    /// its own; the surrounding process must refresh credentials and
    /// rebuild the session.
    Errored { reason: String, timestamp: i64 },

    /// A from-device topic was subscribed.
    Subscribed { topic: String, timestamp: i64 },

    /// Realtime telemetry for one device.
    ///
    /// `state_variables` is the decoded entry payload, or the raw payload
    /// string when the message did not parse as JSON.
    Realtime {
        device_id: String,
        state_variables: serde_json::Value,
        device: Device,
        timestamp: i64,
    },

    /// Module channel message for one device. Not part of the queryable
    /// state cache.
    Module {
        device_id: String,
        payload: serde_json::Value,
        timestamp: i64,
    },

    /// Non-fatal transport or subscription error.
    TransportError { message: String, timestamp: i64 },
}

impl BridgeEvent {
    /// Get the event type name as a string.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "Connected",
            Self::Disconnected { .. } => "Disconnected",
            Self::Reconnecting { .. } => "Reconnecting",
            Self::Errored { .. } => "Errored",
            Self::Subscribed { .. } => "Subscribed",
            Self::Realtime { .. } => "Realtime",
            Self::Module { .. } => "Module",
            Self::TransportError { .. } => "TransportError",
        }
    }

    /// Get the timestamp of this event.
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Connected { timestamp }
            | Self::Disconnected { timestamp }
            | Self::Reconnecting { timestamp }
            | Self::Errored { timestamp, .. }
            | Self::Subscribed { timestamp, .. }
            | Self::Realtime { timestamp, .. }
            | Self::Module { timestamp, .. }
            | Self::TransportError { timestamp, .. } => *timestamp,
        }
    }

    /// True for connection lifecycle events.
    pub fn is_connection_event(&self) -> bool {
        matches!(
            self,
            Self::Connected { .. }
                | Self::Disconnected { .. }
                | Self::Reconnecting { .. }
                | Self::Errored { .. }
        )
    }

    /// True for telemetry payload events (realtime and module).
    pub fn is_telemetry_event(&self) -> bool {
        matches!(self, Self::Realtime { .. } | Self::Module { .. })
    }
}

/// Event bus for the bridge.
///
/// Thin wrapper over a tokio broadcast channel. Publishing never blocks;
/// if there are no subscribers the event is discarded.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the specified capacity.
    ///
    /// The capacity determines how many events are buffered for slow
    /// subscribers.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns `true` if there was at least one subscriber.
    pub fn publish(&self, event: BridgeEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
            filter: None,
        }
    }

    /// Subscribe to events matching a filter.
    pub fn subscribe_filtered<F>(&self, filter: F) -> EventBusReceiver
    where
        F: Fn(&BridgeEvent) -> bool + Send + Sync + 'static,
    {
        EventBusReceiver {
            rx: self.tx.subscribe(),
            filter: Some(Box::new(filter)),
        }
    }

    /// Subscribe to connection lifecycle events only.
    pub fn connection_events(&self) -> EventBusReceiver {
        self.subscribe_filtered(BridgeEvent::is_connection_event)
    }

    /// Subscribe to telemetry events only.
    pub fn telemetry_events(&self) -> EventBusReceiver {
        self.subscribe_filtered(BridgeEvent::is_telemetry_event)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared event bus handle.
pub type SharedEventBus = Arc<EventBus>;

/// Receiver side of the event bus, optionally filtered.
pub struct EventBusReceiver {
    rx: broadcast::Receiver<BridgeEvent>,
    filter: Option<Box<dyn Fn(&BridgeEvent) -> bool + Send + Sync>>,
}

impl EventBusReceiver {
    /// Receive the next (matching) event.
    ///
    /// Returns `None` once the bus is closed. A lagged receiver skips the
    /// dropped events and keeps receiving.
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.filter.as_ref().map_or(true, |f| f(&event)) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a (matching) event without blocking.
    pub fn try_recv(&mut self) -> Option<BridgeEvent> {
        while let Ok(event) = self.rx.try_recv() {
            if self.filter.as_ref().map_or(true, |f| f(&event)) {
                return Some(event);
            }
        }
        None
    }
}
