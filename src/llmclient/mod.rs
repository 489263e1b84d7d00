//! Resilient base HTTP client for LLM providers
//!
//! Wraps a shared reqwest client with:
//! - request marshaling/unmarshaling
//! - retries with exponential backoff and jitter
//! - standardized error parsing (429, 502, 503, 504)
//! - circuit breaking with half-open probe protection
//! - observability hooks at logical-request boundaries

pub mod breaker;
pub mod http;

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use parking_lot::RwLock;
use rand::Rng;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::{GatewayError, Result};
pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use http::{build_http_client, HttpClientConfig};

/// An open byte source; the caller drives it and drops it to release the
/// connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Metadata about a request, passed to the start hook
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub provider: String,
    pub model: String,
    pub endpoint: String,
    pub method: String,
    pub stream: bool,
}

/// Metadata about a finished request, passed to the end hook.
///
/// `status` is 0 for network-level failures with no HTTP response.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub provider: String,
    pub model: String,
    pub endpoint: String,
    pub status: u16,
    pub duration: Duration,
    pub stream: bool,
    pub error: Option<String>,
}

type StartHook = Arc<dyn Fn(&RequestInfo) + Send + Sync>;
type EndHook = Arc<dyn Fn(&ResponseInfo) + Send + Sync>;

/// Observability callbacks for request lifecycle events.
///
/// Hooks fire once per logical caller request, not once per retry attempt:
/// the duration covers all retries and the surfaced status is the terminal
/// outcome. For streams the end hook fires when the stream is established
/// (or the attempt fails), not when the stream closes.
#[derive(Clone, Default)]
pub struct Hooks {
    pub on_request_start: Option<StartHook>,
    pub on_request_end: Option<EndHook>,
}

impl Hooks {
    fn start(&self, info: &RequestInfo) {
        if let Some(hook) = &self.on_request_start {
            hook(info);
        }
    }

    fn end(&self, info: &ResponseInfo) {
        if let Some(hook) = &self.on_request_end {
            hook(info);
        }
    }
}

/// Applies provider-specific credentials to an outgoing request. Runs before
/// per-request header overrides.
pub type HeaderSetter =
    Arc<dyn Fn(reqwest::RequestBuilder) -> reqwest::RequestBuilder + Send + Sync>;

/// Configuration for an upstream client
#[derive(Clone)]
pub struct ClientConfig {
    /// Provider name used in error messages and metrics labels
    pub provider: String,
    pub base_url: String,
    /// Additional attempts after the first (buffered calls only)
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_factor: f64,
    /// Multiplicative jitter in [1-j, 1+j]
    pub jitter_factor: f64,
    pub breaker: Option<BreakerConfig>,
    pub hooks: Hooks,
    pub transport: HttpClientConfig,
}

impl ClientConfig {
    pub fn new(provider: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            base_url: base_url.into(),
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter_factor: 0.1,
            breaker: Some(BreakerConfig::default()),
            hooks: Hooks::default(),
            transport: HttpClientConfig::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }
}

/// A logical upstream request
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub endpoint: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl UpstreamRequest {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            endpoint: endpoint.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn post(endpoint: impl Into<String>, body: &impl serde::Serialize) -> Result<Self> {
        Ok(Self {
            method: Method::POST,
            endpoint: endpoint.into(),
            body: Some(serde_json::to_value(body)?),
            headers: Vec::new(),
        })
    }

    fn model(&self) -> String {
        self.body
            .as_ref()
            .and_then(|b| b.get("model"))
            .and_then(|m| m.as_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

/// A fully buffered upstream response
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Base HTTP client for one provider endpoint.
pub struct LlmClient {
    http: reqwest::Client,
    config: ClientConfig,
    base_url: RwLock<String>,
    header_setter: HeaderSetter,
    breaker: Option<CircuitBreaker>,
}

impl LlmClient {
    pub fn new(config: ClientConfig, header_setter: HeaderSetter) -> Result<Self> {
        let http = build_http_client(&config.transport)?;
        Ok(Self::with_http_client(http, config, header_setter))
    }

    pub fn with_http_client(
        http: reqwest::Client,
        config: ClientConfig,
        header_setter: HeaderSetter,
    ) -> Self {
        let breaker = config.breaker.clone().map(CircuitBreaker::new);
        let base_url = RwLock::new(config.base_url.clone());
        Self {
            http,
            config,
            base_url,
            header_setter,
            breaker,
        }
    }

    /// Update the base URL at runtime.
    pub fn set_base_url(&self, url: impl Into<String>) {
        *self.base_url.write() = url.into();
    }

    pub fn base_url(&self) -> String {
        self.base_url.read().clone()
    }

    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    /// Execute a buffered request and deserialize the response body.
    pub async fn do_json<T: DeserializeOwned>(&self, req: UpstreamRequest) -> Result<T> {
        let resp = self.do_raw(req).await?;
        serde_json::from_slice(&resp.body).map_err(|e| GatewayError::Provider {
            provider: self.config.provider.clone(),
            status: 502,
            message: format!("failed to unmarshal response: {e}"),
        })
    }

    /// Execute a buffered request with retries and circuit breaking.
    ///
    /// Hooks fire here, once per logical request: the duration covers all
    /// retry attempts and the reported status is the terminal outcome.
    pub async fn do_raw(&self, req: UpstreamRequest) -> Result<RawResponse> {
        let start = Instant::now();
        let model = req.model();
        let info = RequestInfo {
            provider: self.config.provider.clone(),
            model: model.clone(),
            endpoint: req.endpoint.clone(),
            method: req.method.to_string(),
            stream: false,
        };
        self.config.hooks.start(&info);

        let finish = |status: u16, error: Option<&GatewayError>| {
            self.config.hooks.end(&ResponseInfo {
                provider: self.config.provider.clone(),
                model: model.clone(),
                endpoint: req.endpoint.clone(),
                status,
                duration: start.elapsed(),
                stream: false,
                error: error.map(|e| e.to_string()),
            });
        };

        if let Some(breaker) = &self.breaker {
            if !breaker.allow() {
                let err = GatewayError::CircuitOpen {
                    provider: self.config.provider.clone(),
                };
                finish(503, Some(&err));
                return Err(err);
            }
        }

        let mut last_err: Option<GatewayError> = None;
        let mut last_status: u16 = 0;
        let max_attempts = self.config.max_retries.saturating_add(1).max(1);

        for attempt in 0..max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.calculate_backoff(attempt)).await;
            }

            let resp = match self.execute(&req).await {
                Ok(resp) => resp,
                Err(err) => {
                    // Transport failure: retryable, counts against the breaker.
                    if let Some(breaker) = &self.breaker {
                        breaker.record_failure();
                    }
                    last_status = 0;
                    last_err = Some(err);
                    continue;
                }
            };

            if is_retryable(resp.status) {
                if let Some(breaker) = &self.breaker {
                    breaker.record_failure();
                }
                last_status = resp.status;
                last_err = Some(GatewayError::from_provider_response(
                    &self.config.provider,
                    resp.status,
                    &resp.body,
                ));
                continue;
            }

            if !(200..300).contains(&resp.status) {
                if let Some(breaker) = &self.breaker {
                    if resp.status >= 500 {
                        breaker.record_failure();
                    }
                }
                let err = GatewayError::from_provider_response(
                    &self.config.provider,
                    resp.status,
                    &resp.body,
                );
                finish(resp.status, Some(&err));
                return Err(err);
            }

            if let Some(breaker) = &self.breaker {
                breaker.record_success();
            }
            finish(resp.status, None);
            return Ok(resp);
        }

        let err = last_err.unwrap_or_else(|| GatewayError::Provider {
            provider: self.config.provider.clone(),
            status: 502,
            message: "request failed after retries".to_string(),
        });
        finish(last_status, Some(&err));
        Err(err)
    }

    /// Execute a streaming request, returning the raw byte stream.
    ///
    /// Streaming requests never retry: partial bytes may already have been
    /// forwarded downstream. The end hook fires when the stream is
    /// established, not when it closes.
    pub async fn do_stream(&self, req: UpstreamRequest) -> Result<ByteStream> {
        let start = Instant::now();
        let model = req.model();
        let info = RequestInfo {
            provider: self.config.provider.clone(),
            model: model.clone(),
            endpoint: req.endpoint.clone(),
            method: req.method.to_string(),
            stream: true,
        };
        self.config.hooks.start(&info);

        let finish = |status: u16, error: Option<&GatewayError>| {
            self.config.hooks.end(&ResponseInfo {
                provider: self.config.provider.clone(),
                model: model.clone(),
                endpoint: req.endpoint.clone(),
                status,
                duration: start.elapsed(),
                stream: true,
                error: error.map(|e| e.to_string()),
            });
        };

        if let Some(breaker) = &self.breaker {
            if !breaker.allow() {
                let err = GatewayError::CircuitOpen {
                    provider: self.config.provider.clone(),
                };
                finish(503, Some(&err));
                return Err(err);
            }
        }

        let resp = match self.send(&req, false).await {
            Ok(resp) => resp,
            Err(err) => {
                if let Some(breaker) = &self.breaker {
                    breaker.record_failure();
                }
                finish(0, Some(&err));
                return Err(err);
            }
        };

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body = resp.bytes().await.unwrap_or_default();
            if let Some(breaker) = &self.breaker {
                if status >= 500 || status == 429 {
                    breaker.record_failure();
                }
            }
            let err = GatewayError::from_provider_response(&self.config.provider, status, &body);
            finish(status, Some(&err));
            return Err(err);
        }

        if let Some(breaker) = &self.breaker {
            breaker.record_success();
        }
        finish(status, None);

        let provider = self.config.provider.clone();
        let stream = resp.bytes_stream().map_err(move |e| GatewayError::Network {
            provider: provider.clone(),
            message: format!("stream read failed: {e}"),
        });
        Ok(Box::pin(stream))
    }

    /// One buffered attempt, no retries.
    async fn execute(&self, req: &UpstreamRequest) -> Result<RawResponse> {
        let resp = self.send(req, true).await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| GatewayError::Network {
            provider: self.config.provider.clone(),
            message: format!("failed to read response: {e}"),
        })?;
        Ok(RawResponse { status, body })
    }

    async fn send(&self, req: &UpstreamRequest, buffered: bool) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url(), req.endpoint);
        let mut builder = self.http.request(req.method.clone(), &url);

        if buffered {
            builder = builder.timeout(self.config.transport.request_timeout);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        // Provider credentials first, then per-request overrides.
        builder = (self.header_setter)(builder);
        for (key, value) in &req.headers {
            builder = builder.header(key, value);
        }

        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout {
                    provider: self.config.provider.clone(),
                    message: e.to_string(),
                }
            } else {
                GatewayError::Network {
                    provider: self.config.provider.clone(),
                    message: format!("failed to send request: {e}"),
                }
            }
        })
    }

    /// Exponential backoff with multiplicative jitter for the given attempt
    /// (attempt >= 1).
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let mut backoff = self.config.initial_backoff.as_secs_f64()
            * self.config.backoff_factor.powi(attempt as i32 - 1);
        backoff = backoff.min(self.config.max_backoff.as_secs_f64());

        if self.config.jitter_factor > 0.0 {
            let jitter = backoff * self.config.jitter_factor;
            backoff = backoff - jitter + rand::thread_rng().gen::<f64>() * 2.0 * jitter;
        }

        Duration::from_secs_f64(backoff.max(0.0))
    }

    /// Current breaker state, for tests and monitoring.
    pub fn breaker_state(&self) -> Option<CircuitState> {
        self.breaker.as_ref().map(|b| b.state())
    }
}

/// Rate limits and transient server errors are worth retrying.
fn is_retryable(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_client(config: ClientConfig) -> LlmClient {
        LlmClient::new(config, Arc::new(|b| b)).expect("client")
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable(429));
        assert!(is_retryable(502));
        assert!(is_retryable(503));
        assert!(is_retryable(504));
        assert!(!is_retryable(200));
        assert!(!is_retryable(400));
        assert!(!is_retryable(401));
        assert!(!is_retryable(500));
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let mut config = ClientConfig::new("test", "http://localhost");
        config.initial_backoff = Duration::from_secs(1);
        config.max_backoff = Duration::from_secs(4);
        config.backoff_factor = 2.0;
        config.jitter_factor = 0.0;
        let client = test_client(config);

        assert_eq!(client.calculate_backoff(1), Duration::from_secs(1));
        assert_eq!(client.calculate_backoff(2), Duration::from_secs(2));
        assert_eq!(client.calculate_backoff(3), Duration::from_secs(4));
        // Capped at max_backoff.
        assert_eq!(client.calculate_backoff(5), Duration::from_secs(4));
    }

    #[test]
    fn backoff_jitter_stays_in_band() {
        let mut config = ClientConfig::new("test", "http://localhost");
        config.initial_backoff = Duration::from_secs(10);
        config.max_backoff = Duration::from_secs(60);
        config.jitter_factor = 0.1;
        let client = test_client(config);

        for _ in 0..50 {
            let backoff = client.calculate_backoff(1).as_secs_f64();
            assert!((9.0..=11.0).contains(&backoff), "backoff {backoff} out of band");
        }
    }

    #[test]
    fn base_url_is_updatable() {
        let client = test_client(ClientConfig::new("test", "http://a"));
        assert_eq!(client.base_url(), "http://a");
        client.set_base_url("http://b");
        assert_eq!(client.base_url(), "http://b");
    }

    #[test]
    fn model_extracted_from_body() {
        let req = UpstreamRequest::post(
            "/chat/completions",
            &serde_json::json!({"model": "gpt-4o"}),
        )
        .unwrap();
        assert_eq!(req.model(), "gpt-4o");

        let req = UpstreamRequest::get("/models");
        assert_eq!(req.model(), "unknown");
    }

    #[tokio::test]
    async fn hooks_fire_once_for_circuit_open() {
        let mut config = ClientConfig::new("test", "http://127.0.0.1:1");
        config.breaker = Some(BreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            timeout: Duration::from_secs(300),
        });
        config.max_retries = 0;
        config.initial_backoff = Duration::from_millis(1);

        let starts = Arc::new(AtomicU32::new(0));
        let ends = Arc::new(AtomicU32::new(0));
        let s = starts.clone();
        let e = ends.clone();
        config.hooks = Hooks {
            on_request_start: Some(Arc::new(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })),
            on_request_end: Some(Arc::new(move |_| {
                e.fetch_add(1, Ordering::SeqCst);
            })),
        };

        let client = test_client(config);

        // First request fails with a connection error and trips the breaker.
        let err = client.do_raw(UpstreamRequest::get("/x")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Network { .. }));
        assert_eq!(client.breaker_state(), Some(CircuitState::Open));

        // Second request is rejected without touching the network.
        let err = client.do_raw(UpstreamRequest::get("/x")).await.unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. }));

        // One start and one end per logical request.
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert_eq!(ends.load(Ordering::SeqCst), 2);
    }
}
