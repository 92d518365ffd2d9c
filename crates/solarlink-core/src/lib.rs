//! Core types for the solarlink telemetry bridge.
//!
//! This crate holds the pieces every other crate depends on: the device
//! model delivered by the vendor inventory, the typed event bus that
//! replaces ad hoc listener registration, and process configuration.

pub mod config;
pub mod device;
pub mod event;

pub use device::{Device, DeviceState, ModuleKind, ModuleLink, TransportClass};
pub use event::{BridgeEvent, EventBus, EventBusReceiver, SharedEventBus};
