//! Local distribution endpoint for the telemetry bridge.
//!
//! Serves the device-state cache over HTTP, fans realtime telemetry out
//! to filtered WebSocket subscribers, and exposes the bridge's health.

pub mod hub;
pub mod server;

pub use hub::{LocalBroadcastHub, FILTER_ALL};
pub use server::{router, serve, spawn_broadcast_pump, ServerState};
