//! Vendor-facing collaborators of the telemetry bridge.
//!
//! Stateless request/response calls against the vendor REST API (login,
//! user lookup, federated broker credentials, house and device
//! enumeration), the on-disk JSON cache that carries those responses
//! between runs, and the token freshness check. No retry or backoff
//! logic lives here.

pub mod auth;
pub mod cache;
pub mod client;
pub mod error;

pub use auth::token_is_fresh;
pub use cache::DiskCache;
pub use client::{
    CloudClient, FederatedCredentials, FederatedCredentialsResponse, House, HousesResponse,
    LoginTokens, UserInfo, UserResponse,
};
pub use error::{CloudError, CloudResult};
