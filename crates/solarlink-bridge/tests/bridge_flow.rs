//! End-to-end bridge behavior against a recording broker client.

use solarlink_bridge::{BrokerOp, RecordingClient, StateCache, TelemetryBridge};
use solarlink_core::{Device, EventBus, SharedEventBus, TransportClass};
use std::sync::Arc;

fn build_bridge(
    devices: Vec<Device>,
) -> (
    Arc<RecordingClient>,
    Arc<StateCache>,
    SharedEventBus,
    TelemetryBridge,
) {
    let client = Arc::new(RecordingClient::new());
    let cache = Arc::new(StateCache::new());
    let events: SharedEventBus = Arc::new(EventBus::new());
    let bridge = TelemetryBridge::new(client.clone(), devices, cache.clone(), events.clone());
    (client, cache, events, bridge)
}

fn two_devices() -> Vec<Device> {
    vec![
        Device::new("dev1", TransportClass::Wifi),
        Device::new("box1", TransportClass::RedyBox),
    ]
}

#[tokio::test]
async fn publishes_while_disconnected_drain_in_order_on_connect() {
    let (client, _cache, _events, bridge) = build_bridge(two_devices());
    let connection = bridge.connection();

    connection.publish("q/a", b"a".to_vec()).await;
    connection.publish("q/b", b"b".to_vec()).await;
    connection.publish("q/c", b"c".to_vec()).await;
    assert!(client.published().await.is_empty());

    bridge.handle_connected().await;

    let queued: Vec<String> = client
        .published()
        .await
        .into_iter()
        .map(|(t, _)| t)
        .filter(|t| t.starts_with("q/"))
        .collect();
    assert_eq!(queued, vec!["q/a", "q/b", "q/c"]);
}

#[tokio::test]
async fn connect_pass_orders_subscribes_then_requests_then_drain() {
    let (client, _cache, _events, bridge) = build_bridge(two_devices());
    bridge.connection().publish("q/parked", b"x".to_vec()).await;

    bridge.handle_connected().await;

    let ops = client.ops().await;
    let pos = |pred: &dyn Fn(&BrokerOp) -> bool| ops.iter().position(|op| pred(op)).unwrap();

    let last_subscribe = ops
        .iter()
        .rposition(|op| matches!(op, BrokerOp::Subscribe(_)))
        .unwrap();
    let first_request = pos(&|op| {
        matches!(op, BrokerOp::Publish { topic, .. } if topic.ends_with("/toDev/realtime"))
    });
    let parked = pos(&|op| matches!(op, BrokerOp::Publish { topic, .. } if topic == "q/parked"));

    // One resubscribe pass covering all devices...
    let subscribed: Vec<&BrokerOp> = ops
        .iter()
        .filter(|op| matches!(op, BrokerOp::Subscribe(_)))
        .collect();
    assert_eq!(subscribed.len(), 4, "two from-device topics per device");

    // ...then exactly one realtime request per device...
    let requests: Vec<&BrokerOp> = ops
        .iter()
        .filter(|op| {
            matches!(op, BrokerOp::Publish { topic, .. } if topic.ends_with("/toDev/realtime"))
        })
        .collect();
    assert_eq!(requests.len(), 2);

    // ...before any queued publish drains.
    assert!(last_subscribe < first_request);
    assert!(first_request < parked);
}

#[tokio::test]
async fn reconnect_repeats_the_full_pass() {
    let (client, _cache, _events, bridge) = build_bridge(two_devices());

    bridge.handle_connected().await;
    client.clear().await;

    // Simulated drop and recovery.
    bridge.connection().mark_reconnecting("link reset").await;
    bridge.handle_connected().await;

    let subs = client.subscriptions().await;
    assert_eq!(subs.len(), 4, "resubscribe is mandatory after reconnect");
    let requests = client
        .published()
        .await
        .into_iter()
        .filter(|(t, _)| t.ends_with("/toDev/realtime"))
        .count();
    assert_eq!(requests, 2);
}

#[tokio::test]
async fn inbound_message_updates_cache_and_unknown_topics_do_not() {
    let (_client, cache, _events, bridge) = build_bridge(two_devices());

    bridge
        .handle_message(
            "wifi/dev1/fromDev/realtime",
            br#"{"data":[{"localId":"dev1:0","stateVariables":{"power":42}}]}"#,
        )
        .await;
    bridge
        .handle_message(
            "wifi/intruder/fromDev/realtime",
            br#"{"data":[{"localId":"intruder:0","stateVariables":{"power":1}}]}"#,
        )
        .await;

    assert_eq!(
        cache.get("dev1").await.unwrap().state_variables["power"],
        42
    );
    assert!(cache.get("intruder").await.is_none());
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn raw_payload_reaches_subscribers_without_cache_write() {
    let (_client, cache, events, bridge) = build_bridge(two_devices());
    let mut rx = events.telemetry_events();

    bridge
        .handle_message("rb/box1/fromDev/realtime", b"\x00binary garbage")
        .await;

    assert!(cache.is_empty().await);
    let event = rx.try_recv().expect("raw payload still fans out");
    assert_eq!(event.type_name(), "Realtime");
}

#[tokio::test]
async fn module_update_goes_to_the_module_out_topic() {
    let (client, _cache, _events, bridge) = build_bridge(two_devices());
    bridge.handle_connected().await;
    client.clear().await;

    bridge
        .update_module_state("box1", serde_json::json!({"mode": "eco"}))
        .await
        .unwrap();

    let published = client.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "rb/box1/toDev/module/update");

    // Unknown devices are rejected before anything reaches the broker.
    assert!(bridge
        .update_module_state("ghost", serde_json::json!({}))
        .await
        .is_err());
}

#[tokio::test]
async fn module_update_while_disconnected_is_queued() {
    let (client, _cache, _events, bridge) = build_bridge(two_devices());

    bridge
        .update_module_state("dev1", serde_json::json!({"mode": "eco"}))
        .await
        .unwrap();
    assert!(client.published().await.is_empty());

    bridge.handle_connected().await;
    let published = client.published().await;
    assert!(published
        .iter()
        .any(|(t, _)| t == "wifi/dev1/toDev/module/update"));
}

#[tokio::test]
async fn shutdown_unsubscribes_every_device() {
    let (client, _cache, _events, bridge) = build_bridge(two_devices());
    bridge.handle_connected().await;

    bridge.shutdown().await;

    let unsubs = client
        .ops()
        .await
        .into_iter()
        .filter(|op| matches!(op, BrokerOp::Unsubscribe(_)))
        .count();
    assert_eq!(unsubs, 4);
}
