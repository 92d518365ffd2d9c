//! Topic derivation for broker subscriptions and publishes.
//!
//! The broker enforces exact topic matching, so these strings are a wire
//! contract: `{prefix}/{deviceId}/fromDev/realtime`,
//! `{prefix}/{deviceId}/toDev/realtime`,
//! `{prefix}/{deviceId}/fromDev/module/changed` and
//! `{prefix}/{deviceId}/toDev/module/update`, with prefix `wifi` for
//! wifi devices and `rb` for redybox devices.

use solarlink_core::{Device, TransportClass};

/// The four topic roles derived for one device.
///
/// Derivation is a pure function of (transport class, device id); topics
/// are constructed on demand and never stored independently of the
/// device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    /// Device → bridge telemetry push.
    pub realtime_in: String,
    /// Bridge → device telemetry request.
    pub realtime_out: String,
    /// Device → bridge module state change.
    pub module_in: String,
    /// Bridge → device module update command.
    pub module_out: String,
}

impl TopicSet {
    /// Derive the topic quadruple for a device.
    ///
    /// Returns `None` when the device transport class is not one this
    /// bridge can address.
    pub fn for_device(device: &Device) -> Option<Self> {
        let prefix = match device.transport {
            TransportClass::Wifi => "wifi",
            TransportClass::RedyBox => "rb",
            TransportClass::Unknown => return None,
        };
        let id = &device.device_local_id;
        Some(Self {
            realtime_in: format!("{prefix}/{id}/fromDev/realtime"),
            realtime_out: format!("{prefix}/{id}/toDev/realtime"),
            module_in: format!("{prefix}/{id}/fromDev/module/changed"),
            module_out: format!("{prefix}/{id}/toDev/module/update"),
        })
    }

    /// The two from-device topics this bridge subscribes to.
    pub fn inbound(&self) -> [&str; 2] {
        [&self.realtime_in, &self.module_in]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wifi_topics() {
        let device = Device::new("dev1", TransportClass::Wifi);
        let topics = TopicSet::for_device(&device).unwrap();

        assert_eq!(topics.realtime_in, "wifi/dev1/fromDev/realtime");
        assert_eq!(topics.realtime_out, "wifi/dev1/toDev/realtime");
        assert_eq!(topics.module_in, "wifi/dev1/fromDev/module/changed");
        assert_eq!(topics.module_out, "wifi/dev1/toDev/module/update");
    }

    #[test]
    fn test_redybox_topics() {
        let device = Device::new("box9", TransportClass::RedyBox);
        let topics = TopicSet::for_device(&device).unwrap();

        assert_eq!(topics.realtime_in, "rb/box9/fromDev/realtime");
        assert_eq!(topics.realtime_out, "rb/box9/toDev/realtime");
        assert_eq!(topics.module_in, "rb/box9/fromDev/module/changed");
        assert_eq!(topics.module_out, "rb/box9/toDev/module/update");
    }

    #[test]
    fn test_unknown_transport_has_no_topics() {
        let device = Device::new("devX", TransportClass::Unknown);
        assert!(TopicSet::for_device(&device).is_none());
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let device = Device::new("dev1", TransportClass::Wifi);
        assert_eq!(
            TopicSet::for_device(&device),
            TopicSet::for_device(&device)
        );
    }

    #[test]
    fn test_inbound_pair() {
        let device = Device::new("dev1", TransportClass::Wifi);
        let topics = TopicSet::for_device(&device).unwrap();
        assert_eq!(
            topics.inbound(),
            ["wifi/dev1/fromDev/realtime", "wifi/dev1/fromDev/module/changed"]
        );
    }
}
