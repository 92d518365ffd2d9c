//! Vendor REST API client.
//!
//! Four stateless call families: account login, user lookup, federated
//! broker credentials, and house/device enumeration. Every call is a
//! single request/response; retries are the caller's concern, which in
//! practice means "run the startup sequence again".

use crate::error::{CloudError, CloudResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use solarlink_core::Device;
use tracing::{debug, info};

/// Default vendor API base.
pub const DEFAULT_API_BASE: &str = "https://uiapi.emcp.edp.com";
/// Default identity service endpoint used for federated credentials.
pub const DEFAULT_IDENTITY_URL: &str = "https://cognito-identity.eu-west-1.amazonaws.com/";
/// Identity provider key expected by the federation exchange.
const IDENTITY_PROVIDER: &str = "cognito-idp.eu-west-1.amazonaws.com/eu-west-1_CZc7dNRRv";
/// User agent the vendor devices endpoint expects.
const USER_AGENT: &str = "edpsolar-ios/1 CFNetwork/3860.100.1 Darwin/25.0.0";

/// Tokens returned by the login endpoint.
///
/// Only `id_token` is interpreted; the rest is carried opaquely so the
/// cached file round-trips the full response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginTokens {
    pub id_token: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// User lookup response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    #[serde(rename = "User")]
    pub user: UserInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub identity_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Federated credentials response.
#[derive(Debug, Clone, Deserialize)]
pub struct FederatedCredentialsResponse {
    #[serde(rename = "Credentials")]
    pub credentials: FederatedCredentials,
}

/// Time-limited broker credentials. Never cached to disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FederatedCredentials {
    pub access_key_id: String,
    pub secret_key: String,
    pub session_token: String,
    #[serde(default)]
    pub expiration: Option<f64>,
}

/// House enumeration response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousesResponse {
    pub houses: Vec<House>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct House {
    pub house_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Client for the vendor REST API.
#[derive(Debug, Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    login_api: String,
    api_base: String,
    identity_url: String,
}

impl CloudClient {
    /// Create a client against the default vendor endpoints.
    pub fn new(login_api: impl Into<String>) -> CloudResult<Self> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            login_api: login_api.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
        })
    }

    /// Override the API base (tests, staging).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Override the identity service endpoint.
    pub fn with_identity_url(mut self, identity_url: impl Into<String>) -> Self {
        self.identity_url = identity_url.into();
        self
    }

    /// Authenticate the vendor account.
    pub async fn login(&self, username: &str, password: &str) -> CloudResult<LoginTokens> {
        info!("logging in to vendor API");
        let response = self
            .http
            .post(format!("{}/login", self.login_api))
            .json(&serde_json::json!({
                "username": username,
                "password": password,
            }))
            .send()
            .await?;
        Self::into_json(response).await
    }

    /// Fetch the account's user record (carries the identity id needed
    /// for the credential federation exchange).
    pub async fn get_user(&self, id_token: &str) -> CloudResult<UserResponse> {
        let response = self
            .http
            .get(format!("{}/usermanagement/user", self.api_base))
            .header("Accept", "application/json")
            .bearer_auth(id_token)
            .send()
            .await?;
        Self::into_json(response).await
    }

    /// Exchange the id token for time-limited broker credentials.
    pub async fn get_federated_credentials(
        &self,
        id_token: &str,
        identity_id: &str,
    ) -> CloudResult<FederatedCredentialsResponse> {
        debug!("exchanging id token for broker credentials");
        let body = serde_json::json!({
            "IdentityId": identity_id,
            "Logins": { IDENTITY_PROVIDER: id_token },
        });
        let response = self
            .http
            .post(&self.identity_url)
            .header(
                "X-Amz-Target",
                "AWSCognitoIdentityService.GetCredentialsForIdentity",
            )
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("Accept", "application/x-amz-json-1.1")
            .body(body.to_string())
            .send()
            .await?;
        Self::into_json(response).await
    }

    /// Enumerate the account's houses.
    pub async fn get_houses(&self, id_token: &str) -> CloudResult<HousesResponse> {
        let response = self
            .http
            .get(format!("{}/equipment/houses", self.api_base))
            .header("Accept", "application/json")
            .bearer_auth(id_token)
            .send()
            .await?;
        Self::into_json(response).await
    }

    /// Enumerate the devices of one house.
    pub async fn get_devices(&self, id_token: &str, house_id: &str) -> CloudResult<Vec<Device>> {
        let response = self
            .http
            .get(format!(
                "{}/equipment/houses/{house_id}/device",
                self.api_base
            ))
            .header("Accept", "application/json")
            .bearer_auth(id_token)
            .send()
            .await?;
        Self::into_json(response).await
    }

    /// Flatten the device inventory across all houses, in house order.
    pub async fn load_inventory(
        &self,
        id_token: &str,
        houses: &HousesResponse,
    ) -> CloudResult<Vec<Device>> {
        let mut devices = Vec::new();
        for house in &houses.houses {
            let mut house_devices = self.get_devices(id_token, &house.house_id).await?;
            devices.append(&mut house_devices);
        }
        info!("loaded {} devices from vendor inventory", devices.len());
        Ok(devices)
    }

    async fn into_json<T: DeserializeOwned>(response: reqwest::Response) -> CloudResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}
