//! Error types for the gateway
//!
//! Every failure in the request plane surfaces as a [`GatewayError`]. The
//! variant determines both the HTTP status returned to the client and the
//! OpenAI-style `type` string in the error envelope.

use serde_json::Value;
use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed body, unknown model, bad parameter
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing/invalid master key, or provider credential rejected upstream
    #[error("authentication failed: {message}")]
    Authentication {
        provider: Option<String>,
        message: String,
    },

    /// Provider throttled us
    #[error("{provider} rate limited the request: {message}")]
    RateLimit { provider: String, message: String },

    /// Upstream returned a server error (after retries)
    #[error("{provider} returned status {status}: {message}")]
    Provider {
        provider: String,
        status: u16,
        message: String,
    },

    /// Circuit breaker rejected the request before it reached the provider
    #[error("circuit breaker is open - {provider} temporarily unavailable")]
    CircuitOpen { provider: String },

    /// Deadline exceeded while talking to the provider
    #[error("request to {provider} timed out: {message}")]
    Timeout { provider: String, message: String },

    /// Transport failure (DNS, TCP, TLS, connection reset)
    #[error("network error contacting {provider}: {message}")]
    Network { provider: String, message: String },

    /// Request arrived before the registry observed a successful build or
    /// cache load
    #[error("model registry is not initialized yet")]
    RegistryNotInitialized,

    /// Request body exceeded the configured size limit
    #[error("request body too large: {0}")]
    RequestTooLarge(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Cache backend errors
    #[error("cache error: {0}")]
    Cache(String),

    /// Anything that should never leak details to a client
    #[error("{0}")]
    Internal(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Redis errors
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// YAML parsing errors
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl GatewayError {
    /// HTTP status code surfaced to the gateway's own client
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Authentication { .. } => 401,
            Self::RequestTooLarge(_) => 413,
            Self::RateLimit { .. } => 429,
            Self::Provider { .. } | Self::Network { .. } => 502,
            Self::CircuitOpen { .. } | Self::RegistryNotInitialized => 503,
            Self::Timeout { .. } => 504,
            _ => 500,
        }
    }

    /// Stable `type` string for the error envelope
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::Authentication { .. } => "authentication_error",
            Self::RateLimit { .. } => "rate_limit_error",
            Self::RequestTooLarge(_) => "request_too_large_error",
            Self::Provider { .. } => "provider_error",
            Self::CircuitOpen { .. } => "circuit_open_error",
            Self::Timeout { .. } => "timeout_error",
            Self::Network { .. } => "network_error",
            Self::RegistryNotInitialized => "registry_not_initialized",
            _ => "internal_error",
        }
    }

    /// Upstream HTTP status associated with this error, if any. Zero means a
    /// network-level failure with no response.
    pub fn upstream_status(&self) -> u16 {
        match self {
            Self::Provider { status, .. } => *status,
            Self::RateLimit { .. } => 429,
            Self::Authentication {
                provider: Some(_), ..
            } => 401,
            Self::CircuitOpen { .. } => 503,
            _ => 0,
        }
    }

    /// Classify an upstream response by status code, extracting a human
    /// message from the error body best-effort.
    ///
    /// Providers mostly agree on `{"error":{"message": ...}}`; anything else
    /// falls back to the raw body or a status-derived message.
    pub fn from_provider_response(provider: &str, status: u16, body: &[u8]) -> Self {
        let message = extract_error_message(body)
            .unwrap_or_else(|| format!("provider returned status {status}"));

        match status {
            400 => Self::InvalidRequest(format!("{provider}: {message}")),
            401 | 403 => Self::Authentication {
                provider: Some(provider.to_string()),
                message,
            },
            429 => Self::RateLimit {
                provider: provider.to_string(),
                message,
            },
            _ => Self::Provider {
                provider: provider.to_string(),
                status,
                message,
            },
        }
    }
}

/// Pull a human-readable message out of a provider error body.
fn extract_error_message(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        // {"error": {"message": "..."}}
        if let Some(msg) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return Some(msg.to_string());
        }
        // {"error": "..."}
        if let Some(msg) = value.get("error").and_then(|e| e.as_str()) {
            return Some(msg.to_string());
        }
        // {"message": "..."}
        if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
            return Some(msg.to_string());
        }
    }

    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(512).collect())
    }
}
