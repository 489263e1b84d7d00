//! Shared HTTP client factory
//!
//! One place to configure connection pooling and transport timeouts for all
//! upstream clients. The per-request timeout for buffered calls is applied at
//! the call site; streams only get the connect-phase limits so long-lived SSE
//! bodies are not cut off.

use std::time::Duration;

use crate::core::{GatewayError, Result};

/// Transport settings for upstream HTTP clients
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub connect_timeout: Duration,
    /// Time limit for a whole buffered request (connect + headers + body)
    pub request_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
        }
    }
}

/// Build a reqwest client with the shared transport settings.
///
/// No overall timeout is set on the client itself: reqwest's client-level
/// timeout also bounds body reads, which would kill long streaming responses.
pub fn build_http_client(config: &HttpClientConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .build()
        .map_err(|e| GatewayError::Internal(format!("failed to create HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_defaults() {
        let config = HttpClientConfig::default();
        assert!(build_http_client(&config).is_ok());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }
}
