//! Process configuration.
//!
//! Credentials and endpoints come from the environment, everything else
//! has a sensible default. Accessors live here so no other crate repeats
//! the variable names.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable names.
pub mod env_vars {
    pub const USERNAME: &str = "SOLARLINK_USERNAME";
    pub const PASSWORD: &str = "SOLARLINK_PASSWORD";
    pub const LOGIN_API: &str = "SOLARLINK_LOGIN_API";
    pub const LOG_JSON: &str = "SOLARLINK_LOG_JSON";
}

/// Default endpoints and tunables.
pub mod defaults {
    /// Remote broker endpoint (ATS data endpoint).
    pub const BROKER_HOST: &str = "axhipzdhdp7t3-ats.iot.eu-west-1.amazonaws.com";
    /// Broker region, part of the signed URL scope.
    pub const BROKER_REGION: &str = "eu-west-1";
    /// Local HTTP/WebSocket listen port.
    pub const LISTEN_PORT: u16 = 3000;
    /// On-disk cache directory for vendor responses.
    pub const CACHE_DIR: &str = "cache";
    /// Keep-alive interval for the broker session, seconds.
    pub const KEEP_ALIVE_SECS: u64 = 30;
}

/// Settings for one bridge process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Vendor account username.
    pub username: String,
    /// Vendor account password.
    pub password: String,
    /// Base URL of the vendor login endpoint.
    pub login_api: String,
    /// Remote broker host.
    pub broker_host: String,
    /// Remote broker region.
    pub broker_region: String,
    /// Local listen host.
    pub listen_host: String,
    /// Local listen port.
    pub listen_port: u16,
    /// Cache directory for vendor responses.
    pub cache_dir: PathBuf,
}

/// Whether JSON log output was requested via the environment.
pub fn json_logging() -> bool {
    std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        assert_eq!(defaults::LISTEN_PORT, 3000);
        assert!(defaults::BROKER_HOST.contains("iot"));
    }

    #[test]
    fn test_settings_serde_roundtrip() {
        let settings = BridgeSettings {
            username: "user".into(),
            password: "pass".into(),
            login_api: "https://login.example.com".into(),
            broker_host: defaults::BROKER_HOST.into(),
            broker_region: defaults::BROKER_REGION.into(),
            listen_host: "0.0.0.0".into(),
            listen_port: 3000,
            cache_dir: PathBuf::from("cache"),
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: BridgeSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.listen_port, settings.listen_port);
    }
}
