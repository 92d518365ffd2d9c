//! The telemetry bridge service.
//!
//! Ties the connection state machine, subscription bookkeeping and
//! message routing together, and drives them from the managed client's
//! event loop. On every transition into `Connected` the order is fixed:
//! resubscribe all devices, send one realtime request per device, then
//! drain the publish queue.

use crate::cache::StateCache;
use crate::client::PubSubClient;
use crate::connection::ConnectionManager;
use crate::error::{BridgeError, BridgeResult};
use crate::router::TelemetryRouter;
use crate::subscription::SubscriptionManager;
use crate::topic::TopicSet;
use serde_json::Value;
use solarlink_core::{Device, SharedEventBus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Consecutive event-loop failures tolerated before the session is
/// declared dead.
const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Pause between polls after a transport error; actual reconnect backoff
/// belongs to the managed client.
const ERROR_PAUSE: Duration = Duration::from_secs(1);

/// One telemetry bridge: a single logical broker session fanning out to
/// the local event bus.
pub struct TelemetryBridge {
    connection: Arc<ConnectionManager>,
    subscriptions: SubscriptionManager,
    router: TelemetryRouter,
    devices: Vec<Device>,
}

impl TelemetryBridge {
    /// Assemble a bridge over any pub/sub client.
    ///
    /// The device inventory is supplied once; the bridge does not
    /// refresh it.
    pub fn new(
        client: Arc<dyn PubSubClient>,
        devices: Vec<Device>,
        cache: Arc<StateCache>,
        events: SharedEventBus,
    ) -> Self {
        let router = TelemetryRouter::new(&devices, cache, events.clone());
        Self {
            connection: Arc::new(ConnectionManager::new(client.clone(), events.clone())),
            subscriptions: SubscriptionManager::new(client, events),
            router,
            devices,
        }
    }

    /// Handle on the connection state machine (health checks, publish
    /// path).
    pub fn connection(&self) -> Arc<ConnectionManager> {
        self.connection.clone()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// The session reached `Connected`, first connect or reconnect.
    ///
    /// The broker is not trusted to have kept subscriptions alive, so
    /// the full pass runs every time: subscribe, realtime requests, then
    /// queue drain, in that order.
    pub async fn handle_connected(&self) {
        self.connection.mark_connected().await;
        self.subscriptions.subscribe_all(&self.devices).await;
        self.subscriptions
            .request_realtime(&self.connection, &self.devices)
            .await;
        self.connection.drain_queue().await;
    }

    /// Route one inbound broker message.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) {
        self.router.handle_message(topic, payload).await;
    }

    /// Publish a module update command to one device's module-update
    /// topic. Queued while disconnected.
    pub async fn update_module_state(&self, device_id: &str, payload: Value) -> BridgeResult<()> {
        let device = self
            .devices
            .iter()
            .find(|d| d.device_local_id == device_id)
            .ok_or_else(|| BridgeError::DeviceNotFound(device_id.to_string()))?;
        let topics = TopicSet::for_device(device)
            .ok_or_else(|| BridgeError::DeviceNotFound(device_id.to_string()))?;

        self.connection
            .publish(&topics.module_out, payload.to_string().into_bytes())
            .await;
        Ok(())
    }

    /// Best-effort teardown of all device subscriptions.
    pub async fn shutdown(&self) {
        info!("unsubscribing {} devices", self.devices.len());
        self.subscriptions.unsubscribe_all(&self.devices).await;
    }
}

/// Drive a bridge from a rumqttc event loop until the session ends.
///
/// Returns `Err` when the session is fatally errored (credential
/// rejection or persistent transport failure); the caller must obtain
/// fresh credentials and construct a new session; the bridge never
/// self-heals from `Errored`.
pub async fn run_broker_session(
    bridge: Arc<TelemetryBridge>,
    mut eventloop: rumqttc::EventLoop,
) -> BridgeResult<()> {
    use rumqttc::{ConnectReturnCode, Event, Packet};

    bridge.connection.mark_connecting().await;
    let mut consecutive_errors: u32 = 0;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                consecutive_errors = 0;
                match ack.code {
                    ConnectReturnCode::Success => bridge.handle_connected().await,
                    ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
                        let reason = format!("broker rejected credentials: {:?}", ack.code);
                        bridge.connection.mark_errored(reason.clone()).await;
                        return Err(BridgeError::Session(reason));
                    }
                    other => {
                        warn!("broker refused connection: {other:?}");
                        bridge
                            .connection
                            .mark_reconnecting(format!("connect refused: {other:?}"))
                            .await;
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                consecutive_errors = 0;
                bridge
                    .handle_message(&publish.topic, &publish.payload)
                    .await;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                bridge.connection.mark_disconnected().await;
            }
            Ok(event) => {
                consecutive_errors = 0;
                debug!("broker event: {event:?}");
            }
            Err(e) => {
                consecutive_errors += 1;
                bridge.connection.mark_reconnecting(e.to_string()).await;
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    let reason =
                        format!("giving up after {consecutive_errors} consecutive failures: {e}");
                    bridge.connection.mark_errored(reason.clone()).await;
                    return Err(BridgeError::Connection(reason));
                }
                tokio::time::sleep(ERROR_PAUSE).await;
            }
        }
    }
}
