//! Inbound message classification and fan-out.
//!
//! Classification is a single topic-indexed dispatch table built once
//! from the device inventory and consulted by one message handler, so
//! every broker message is delivered exactly once. Messages on topics
//! belonging to no tracked device are dropped silently.

use crate::cache::StateCache;
use crate::topic::TopicSet;
use chrono::Utc;
use serde_json::Value;
use solarlink_core::{BridgeEvent, Device, DeviceState, SharedEventBus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Which stream a from-device topic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Realtime,
    Module,
}

/// Classifies inbound broker messages, updates the state cache and
/// emits telemetry events.
pub struct TelemetryRouter {
    /// topic → (owning device, channel); built once at construction.
    index: HashMap<String, (Device, Channel)>,
    cache: Arc<StateCache>,
    events: SharedEventBus,
}

impl TelemetryRouter {
    /// Build the dispatch table for the given inventory. Devices with an
    /// unaddressable transport contribute no entries.
    pub fn new(devices: &[Device], cache: Arc<StateCache>, events: SharedEventBus) -> Self {
        let mut index = HashMap::new();
        for device in devices {
            if let Some(topics) = TopicSet::for_device(device) {
                index.insert(topics.realtime_in, (device.clone(), Channel::Realtime));
                index.insert(topics.module_in, (device.clone(), Channel::Module));
            }
        }
        Self {
            index,
            cache,
            events,
        }
    }

    /// Number of topics this router recognizes.
    pub fn tracked_topics(&self) -> usize {
        self.index.len()
    }

    /// Classify and dispatch one inbound `(topic, payload)`.
    ///
    /// Decode failures are never fatal: the raw payload is passed
    /// through unchanged so downstream consumers can still see it.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) {
        let Some((device, channel)) = self.index.get(topic) else {
            trace!("message on untracked topic {topic}, dropping");
            return;
        };

        match serde_json::from_slice::<Value>(payload) {
            Ok(value) => match channel {
                Channel::Realtime => self.handle_realtime(device, value).await,
                Channel::Module => self.emit_module(device, value),
            },
            Err(e) => {
                debug!("payload on {topic} is not JSON ({e}), passing through raw");
                let raw = Value::String(String::from_utf8_lossy(payload).into_owned());
                match channel {
                    // No entries to cache; the raw string still reaches
                    // subscribers attributed to the topic's device.
                    Channel::Realtime => self.emit_realtime(device, &device.device_local_id, raw),
                    Channel::Module => self.emit_module(device, raw),
                }
            }
        }
    }

    /// A realtime payload carries a list of entries, each keyed by a
    /// composite `<deviceId>:<suffix>` id. An empty (or absent) list is
    /// a no-op.
    async fn handle_realtime(&self, device: &Device, value: Value) {
        let Some(entries) = value.get("data").and_then(Value::as_array) else {
            debug!(
                "realtime payload for {} carries no entry list",
                device.device_local_id
            );
            return;
        };

        for entry in entries {
            let Some(composite_id) = entry.get("localId").and_then(Value::as_str) else {
                debug!("realtime entry without localId, skipping");
                continue;
            };
            let device_id = composite_id.split(':').next().unwrap_or(composite_id);
            let state_variables = entry
                .get("stateVariables")
                .cloned()
                .unwrap_or(Value::Null);

            self.cache
                .put(
                    device_id,
                    DeviceState::new(device_id, state_variables.clone(), device.clone()),
                )
                .await;
            self.emit_realtime(device, device_id, state_variables);
        }
    }

    fn emit_realtime(&self, device: &Device, device_id: &str, state_variables: Value) {
        self.events.publish(BridgeEvent::Realtime {
            device_id: device_id.to_string(),
            state_variables,
            device: device.clone(),
            timestamp: Utc::now().timestamp(),
        });
    }

    /// Module messages form a distinct event stream and are never
    /// written to the state cache.
    fn emit_module(&self, device: &Device, payload: Value) {
        self.events.publish(BridgeEvent::Module {
            device_id: device.device_local_id.clone(),
            payload,
            timestamp: Utc::now().timestamp(),
        });
    }
}
