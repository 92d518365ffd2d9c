//! Device descriptors as delivered by the vendor inventory.
//!
//! The inventory is loaded once at startup and is immutable afterwards,
//! except for the module linkage which is set during module-to-device
//! association.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport class of a device, mutually exclusive by construction.
///
/// The vendor API reports this as a free-form `type` string; anything
/// other than `wifi` or `redybox` lands on [`TransportClass::Unknown`]
/// and derives no topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransportClass {
    Wifi,
    RedyBox,
    Unknown,
}

impl From<String> for TransportClass {
    fn from(value: String) -> Self {
        match value.as_str() {
            "wifi" => Self::Wifi,
            "redybox" => Self::RedyBox,
            _ => Self::Unknown,
        }
    }
}

impl From<TransportClass> for String {
    fn from(value: TransportClass) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for TransportClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wifi => write!(f, "wifi"),
            Self::RedyBox => write!(f, "redybox"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Kind of the module linked to a device, when one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModuleKind {
    ProductionMeter,
    ConsumptionMeter,
    Battery,
    Unknown,
}

impl From<String> for ModuleKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "production-meter" => Self::ProductionMeter,
            "consumption-meter" => Self::ConsumptionMeter,
            "battery" => Self::Battery,
            _ => Self::Unknown,
        }
    }
}

impl From<ModuleKind> for String {
    fn from(value: ModuleKind) -> Self {
        match value {
            ModuleKind::ProductionMeter => "production-meter",
            ModuleKind::ConsumptionMeter => "consumption-meter",
            ModuleKind::Battery => "battery",
            ModuleKind::Unknown => "unknown",
        }
        .to_string()
    }
}

/// Module linkage, set once during module-to-device association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleLink {
    pub module_local_id: String,
    pub kind: ModuleKind,
}

/// A device from the vendor inventory.
///
/// `device_local_id` is the stable identifier all topics and cache keys
/// are derived from. No two devices with the same id and different
/// transport classes may coexist in an inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_local_id: String,
    #[serde(rename = "type")]
    pub transport: TransportClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleLink>,
}

impl Device {
    /// Create a device descriptor without module linkage.
    pub fn new(device_local_id: impl Into<String>, transport: TransportClass) -> Self {
        Self {
            device_local_id: device_local_id.into(),
            transport,
            module: None,
        }
    }

    /// Attach the module linkage. Intended to be called once during
    /// inventory load.
    pub fn with_module(mut self, module: ModuleLink) -> Self {
        self.module = Some(module);
        self
    }
}

/// Latest observed telemetry snapshot for one device.
///
/// Overwritten on every realtime message for the device; no history is
/// retained. Last-write-wins by arrival order, not by any embedded
/// timestamp, since the broker does not guarantee one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub local_id: String,
    pub state_variables: serde_json::Value,
    pub device: Device,
    pub updated_at: DateTime<Utc>,
}

impl DeviceState {
    pub fn new(
        local_id: impl Into<String>,
        state_variables: serde_json::Value,
        device: Device,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            state_variables,
            device,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_class_from_vendor_json() {
        let device: Device =
            serde_json::from_str(r#"{"deviceLocalId": "dev1", "type": "wifi"}"#).unwrap();
        assert_eq!(device.transport, TransportClass::Wifi);

        let device: Device =
            serde_json::from_str(r#"{"deviceLocalId": "dev2", "type": "redybox"}"#).unwrap();
        assert_eq!(device.transport, TransportClass::RedyBox);
    }

    #[test]
    fn test_unrecognized_transport_is_unknown() {
        let device: Device =
            serde_json::from_str(r#"{"deviceLocalId": "dev3", "type": "zigbee"}"#).unwrap();
        assert_eq!(device.transport, TransportClass::Unknown);
    }

    #[test]
    fn test_module_link_roundtrip() {
        let device = Device::new("dev1", TransportClass::Wifi).with_module(ModuleLink {
            module_local_id: "mod1".to_string(),
            kind: ModuleKind::Battery,
        });

        let json = serde_json::to_string(&device).unwrap();
        let back: Device = serde_json::from_str(&json).unwrap();
        assert_eq!(back.module.unwrap().kind, ModuleKind::Battery);
    }

    #[test]
    fn test_transport_display() {
        assert_eq!(TransportClass::Wifi.to_string(), "wifi");
        assert_eq!(TransportClass::RedyBox.to_string(), "redybox");
    }
}
