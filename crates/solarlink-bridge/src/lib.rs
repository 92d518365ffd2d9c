//! Telemetry bridge core.
//!
//! Maintains the single authenticated, long-lived connection to the
//! remote publish/subscribe broker, derives and subscribes per-device
//! topics, queues outbound publishes across disconnections, classifies
//! inbound telemetry and keeps the last-known-state cache that the
//! local endpoint serves from.

pub mod cache;
pub mod client;
pub mod connection;
pub mod error;
pub mod queue;
pub mod router;
pub mod service;
pub mod session;
pub mod subscription;
pub mod topic;

pub use cache::StateCache;
pub use client::{BrokerOp, PubSubClient, RecordingClient, RumqttcClient};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{BridgeError, BridgeResult};
pub use queue::{PendingPublish, PublishQueue};
pub use router::{Channel, TelemetryRouter};
pub use service::{run_broker_session, TelemetryBridge};
pub use session::{BrokerSession, SessionCredentials};
pub use subscription::{realtime_request_payload, SubscriptionManager};
pub use topic::TopicSet;
