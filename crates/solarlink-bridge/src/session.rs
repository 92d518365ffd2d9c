//! Broker session construction.
//!
//! The remote broker authenticates WebSocket connections with a
//! SigV4-style presigned URL derived from time-limited federated
//! credentials. The credentials are opaque to the bridge; it never
//! refreshes them; expiry surfaces as connection errors.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

use crate::client::RumqttcClient;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const SIGNING_ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "iotdevicegateway";
const WSS_PATH: &str = "/mqtt";
const WSS_PORT: u16 = 443;

/// Time-limited federated credentials for one broker session.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_key: String,
    pub session_token: String,
}

/// Everything needed to open the single logical broker session of a
/// process run. The client identifier is unique per run.
#[derive(Debug, Clone)]
pub struct BrokerSession {
    pub host: String,
    pub region: String,
    pub client_id: String,
    pub keep_alive: Duration,
    credentials: SessionCredentials,
}

impl BrokerSession {
    pub fn new(
        host: impl Into<String>,
        region: impl Into<String>,
        credentials: SessionCredentials,
    ) -> Self {
        Self {
            host: host.into(),
            region: region.into(),
            client_id: format!("solarlink-{}", Uuid::new_v4()),
            keep_alive: Duration::from_secs(30),
            credentials,
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Presigned `wss://` URL for the given signing time.
    ///
    /// Pure in (credentials, host, region, time); the session token is
    /// appended after signing, exactly as the broker expects.
    pub fn presigned_url(&self, now: DateTime<Utc>) -> String {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.region);

        let credential =
            urlencoding::encode(&format!("{}/{scope}", self.credentials.access_key_id)).into_owned();
        let mut query = format!(
            "X-Amz-Algorithm={SIGNING_ALGORITHM}\
             &X-Amz-Credential={credential}\
             &X-Amz-Date={amz_date}\
             &X-Amz-SignedHeaders=host"
        );

        let canonical_request = format!(
            "GET\n{WSS_PATH}\n{query}\nhost:{}\n\nhost\n{}",
            self.host,
            sha256_hex(b"")
        );
        let string_to_sign = format!(
            "{SIGNING_ALGORITHM}\n{amz_date}\n{scope}\n{}",
            sha256_hex(canonical_request.as_bytes())
        );

        let key = signing_key(&self.credentials.secret_key, &date, &self.region);
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

        query.push_str(&format!("&X-Amz-Signature={signature}"));
        query.push_str(&format!(
            "&X-Amz-Security-Token={}",
            urlencoding::encode(&self.credentials.session_token)
        ));

        format!("wss://{}{WSS_PATH}?{query}", self.host)
    }

    /// Options for the managed MQTT client. Reconnect backoff stays the
    /// client's own policy; the bridge treats it as opaque retry.
    pub fn mqtt_options(&self) -> rumqttc::MqttOptions {
        let url = self.presigned_url(Utc::now());
        let mut options = rumqttc::MqttOptions::new(self.client_id.clone(), url, WSS_PORT);
        options.set_transport(rumqttc::Transport::wss_with_default_config());
        options.set_keep_alive(self.keep_alive);
        options
    }

    /// Open the session: returns the shared client handle and the event
    /// loop to poll. Nothing touches the network until the loop is
    /// polled.
    pub fn open(&self) -> (Arc<RumqttcClient>, rumqttc::EventLoop) {
        let (client, eventloop) = rumqttc::AsyncClient::new(self.mqtt_options(), 64);
        (Arc::new(RumqttcClient::new(client)), eventloop)
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn signing_key(secret_key: &str, date: &str, region: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session() -> BrokerSession {
        BrokerSession::new(
            "example-ats.iot.eu-west-1.amazonaws.com",
            "eu-west-1",
            SessionCredentials {
                access_key_id: "AKIDEXAMPLE".to_string(),
                secret_key: "secret".to_string(),
                session_token: "token+with/special=chars".to_string(),
            },
        )
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 45).unwrap()
    }

    #[test]
    fn test_url_shape() {
        let url = session().presigned_url(fixed_time());

        assert!(url.starts_with("wss://example-ats.iot.eu-west-1.amazonaws.com/mqtt?"));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Date=20260115T123045Z"));
        assert!(url.contains("X-Amz-SignedHeaders=host"));
        // Credential carries the full scope, URL-encoded.
        assert!(url.contains("AKIDEXAMPLE%2F20260115%2Feu-west-1%2Fiotdevicegateway%2Faws4_request"));
    }

    #[test]
    fn test_signature_is_hex_and_deterministic() {
        let a = session().presigned_url(fixed_time());
        let b = session().presigned_url(fixed_time());
        assert_eq!(a, b);

        let signature = a
            .split("X-Amz-Signature=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_security_token_appended_after_signature() {
        let url = session().presigned_url(fixed_time());
        let sig_pos = url.find("X-Amz-Signature=").unwrap();
        let token_pos = url.find("X-Amz-Security-Token=").unwrap();
        assert!(token_pos > sig_pos);
        // Token is URL-encoded.
        assert!(url.contains("token%2Bwith%2Fspecial%3Dchars"));
    }

    #[test]
    fn test_signature_changes_with_time() {
        let s = session();
        let later = Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 46).unwrap();
        assert_ne!(s.presigned_url(fixed_time()), s.presigned_url(later));
    }

    #[test]
    fn test_client_id_unique_per_session() {
        let a = session();
        let b = session();
        assert_ne!(a.client_id, b.client_id);
        assert!(a.client_id.starts_with("solarlink-"));
    }
}
