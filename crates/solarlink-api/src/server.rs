//! Local HTTP and WebSocket endpoint.
//!
//! Three routes: `/device/:id` serves the last-known-state cache,
//! `/ws` upgrades to the real-time subscription connection, `/health`
//! exposes the broker connection state. Local subscribers never see
//! bridge errors; a disconnected bridge just means no more frames.

use crate::hub::{LocalBroadcastHub, FILTER_ALL};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use solarlink_bridge::{ConnectionManager, StateCache};
use solarlink_core::{BridgeEvent, SharedEventBus};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct ServerState {
    pub cache: Arc<StateCache>,
    pub hub: Arc<LocalBroadcastHub>,
    pub connection: Arc<ConnectionManager>,
}

/// Build the local endpoint router.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/device/:id", get(query_device))
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on the given address until the process ends.
pub async fn serve(state: ServerState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("local endpoint listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Forward realtime bridge events to the broadcast hub.
///
/// Broadcast frame shape: `{localId, stateVariables, device}`.
pub fn spawn_broadcast_pump(
    events: SharedEventBus,
    hub: Arc<LocalBroadcastHub>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = events.subscribe_filtered(|e| matches!(e, BridgeEvent::Realtime { .. }));
        while let Some(event) = rx.recv().await {
            if let BridgeEvent::Realtime {
                device_id,
                state_variables,
                device,
                ..
            } = event
            {
                let frame = serde_json::json!({
                    "localId": device_id,
                    "stateVariables": state_variables,
                    "device": device,
                });
                hub.broadcast(&device_id, &frame.to_string()).await;
            }
        }
    })
}

/// `GET /device/:id`: latest cached state for one device, the full
/// snapshot for the wildcard id, or JSON `null` when nothing has been
/// observed yet. Absent is not an error.
async fn query_device(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    if id == FILTER_ALL {
        let snapshot = state.cache.get_all().await;
        return Json(serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null));
    }
    match state.cache.get(&id).await {
        Some(device_state) => {
            Json(serde_json::to_value(device_state).unwrap_or(serde_json::Value::Null))
        }
        None => Json(serde_json::Value::Null),
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    connection: String,
    error: bool,
    devices_cached: usize,
    subscribers: usize,
}

/// `GET /health`: broker connection state and the readable error flag.
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        connection: state.connection.state().await.to_string(),
        error: state.connection.has_error(),
        devices_cached: state.cache.len().await,
        subscribers: state.hub.subscriber_count().await,
    })
}

/// `GET /ws`: upgrade to a local subscription connection.
async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// One local subscriber connection.
///
/// Every text frame from the client replaces its filter; broadcast
/// frames flow the other way. The subscriber is deregistered when
/// either direction closes.
async fn handle_socket(state: ServerState, socket: WebSocket) {
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
    let id = state.hub.register(frame_tx).await;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(filter))) => {
                    state.hub.set_filter(id, filter.trim()).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            frame = frame_rx.recv() => match frame {
                Some(frame) => {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    state.hub.remove(id).await;
    debug!("local subscriber connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use solarlink_bridge::RecordingClient;
    use solarlink_core::{Device, DeviceState, EventBus, TransportClass};

    fn server_state() -> (ServerState, SharedEventBus) {
        let events: SharedEventBus = Arc::new(EventBus::new());
        let client = Arc::new(RecordingClient::new());
        let state = ServerState {
            cache: Arc::new(StateCache::new()),
            hub: Arc::new(LocalBroadcastHub::new()),
            connection: Arc::new(ConnectionManager::new(client, events.clone())),
        };
        (state, events)
    }

    fn sample_state(id: &str) -> DeviceState {
        DeviceState::new(
            id,
            serde_json::json!({"power": 7}),
            Device::new(id, TransportClass::Wifi),
        )
    }

    #[tokio::test]
    async fn test_query_absent_device_is_null() {
        let (state, _) = server_state();
        let Json(body) = query_device(State(state), Path("dev1".to_string())).await;
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn test_query_known_device() {
        let (state, _) = server_state();
        state.cache.put("dev1", sample_state("dev1")).await;

        let Json(body) = query_device(State(state), Path("dev1".to_string())).await;
        assert_eq!(body["stateVariables"]["power"], 7);
        assert_eq!(body["device"]["type"], "wifi");
    }

    #[tokio::test]
    async fn test_query_wildcard_returns_snapshot() {
        let (state, _) = server_state();
        state.cache.put("dev1", sample_state("dev1")).await;
        state.cache.put("dev2", sample_state("dev2")).await;

        let Json(body) = query_device(State(state), Path(FILTER_ALL.to_string())).await;
        assert!(body.get("dev1").is_some());
        assert!(body.get("dev2").is_some());
    }

    #[tokio::test]
    async fn test_health_reports_connection_state() {
        let (state, _) = server_state();
        state.connection.mark_connected().await;

        let Json(body) = health(State(state)).await;
        assert_eq!(body.connection, "connected");
        assert!(!body.error);
        assert_eq!(body.devices_cached, 0);
    }

    #[tokio::test]
    async fn test_broadcast_pump_builds_frames() {
        let (state, events) = server_state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = state.hub.register(tx).await;
        state.hub.set_filter(id, "dev1").await;

        let _pump = spawn_broadcast_pump(events.clone(), state.hub.clone());
        // Give the pump task a chance to subscribe before publishing.
        tokio::task::yield_now().await;

        events.publish(BridgeEvent::Realtime {
            device_id: "dev1".to_string(),
            state_variables: serde_json::json!({"v": 3}),
            device: Device::new("dev1", TransportClass::Wifi),
            timestamp: 0,
        });

        let frame = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["localId"], "dev1");
        assert_eq!(value["stateVariables"]["v"], 3);
        assert_eq!(value["device"]["deviceLocalId"], "dev1");
    }
}
