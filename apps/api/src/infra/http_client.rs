//! Outbound HTTP client for provider status calls.
//!
//! Built once at startup and shared; every provider client takes it by value
//! instead of constructing its own.

use std::time::Duration;

use reqwest::Client;

use super::InfraError;

/// TCP handshake plus TLS.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Whole request. Status checks sit on the browser redirect path, so keep it short.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_client() -> Result<Client, InfraError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("infaq-api/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(InfraError::HttpClient)
}
