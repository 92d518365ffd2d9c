//! Last-known-state cache per device.
//!
//! Single writer (the telemetry router), many concurrent readers (the
//! local query endpoint). Readers always observe a consistent snapshot.
//! No eviction; the cache lives for the process lifetime.

use solarlink_core::DeviceState;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Mapping from device id to its most recently observed state.
#[derive(Default)]
pub struct StateCache {
    inner: RwLock<HashMap<String, DeviceState>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest state for one device, or `None` when nothing has been
    /// observed yet.
    pub async fn get(&self, device_id: &str) -> Option<DeviceState> {
        self.inner.read().await.get(device_id).cloned()
    }

    /// Consistent snapshot of all known device states.
    pub async fn get_all(&self) -> HashMap<String, DeviceState> {
        self.inner.read().await.clone()
    }

    /// Unconditional overwrite; last write wins by arrival order.
    pub async fn put(&self, device_id: impl Into<String>, state: DeviceState) {
        self.inner.write().await.insert(device_id.into(), state);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
