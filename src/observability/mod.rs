//! Prometheus instrumentation
//!
//! Implements the upstream client's observability hooks with Prometheus
//! collectors. Hooks fire once per logical request, so counts reflect
//! user-facing requests rather than retry attempts, durations include all
//! retries, and the in-flight gauge tracks concurrent logical requests.

use std::sync::Arc;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tracing::error;

use crate::core::{GatewayError, Result};
use crate::llmclient::Hooks;

const DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];

/// Gateway request metrics.
pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
    in_flight: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("gomodel_requests_total", "Total number of LLM requests"),
            &[
                "provider",
                "model",
                "endpoint",
                "status_code",
                "status_type",
                "stream",
            ],
        )
        .map_err(|e| GatewayError::Internal(format!("metrics init: {e}")))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "gomodel_request_duration_seconds",
                "LLM request duration in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["provider", "model", "endpoint", "stream"],
        )
        .map_err(|e| GatewayError::Internal(format!("metrics init: {e}")))?;

        let in_flight = IntGaugeVec::new(
            Opts::new(
                "gomodel_requests_in_flight",
                "Number of LLM requests currently in flight",
            ),
            &["provider", "endpoint", "stream"],
        )
        .map_err(|e| GatewayError::Internal(format!("metrics init: {e}")))?;

        registry
            .register(Box::new(requests_total.clone()))
            .map_err(|e| GatewayError::Internal(format!("metrics init: {e}")))?;
        registry
            .register(Box::new(request_duration.clone()))
            .map_err(|e| GatewayError::Internal(format!("metrics init: {e}")))?;
        registry
            .register(Box::new(in_flight.clone()))
            .map_err(|e| GatewayError::Internal(format!("metrics init: {e}")))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            in_flight,
        })
    }

    /// Hooks to inject into upstream clients.
    pub fn hooks(self: Arc<Self>) -> Hooks {
        let start_metrics = self.clone();
        let end_metrics = self;

        Hooks {
            on_request_start: Some(Arc::new(move |info| {
                let stream = if info.stream { "true" } else { "false" };
                start_metrics
                    .in_flight
                    .with_label_values(&[&info.provider, &info.endpoint, stream])
                    .inc();
            })),
            on_request_end: Some(Arc::new(move |info| {
                let stream = if info.stream { "true" } else { "false" };
                end_metrics
                    .in_flight
                    .with_label_values(&[&info.provider, &info.endpoint, stream])
                    .dec();

                let status_type = if info.error.is_some() || info.status >= 400 {
                    "error"
                } else {
                    "success"
                };
                let status_code = if info.status == 0 {
                    // Network error or circuit breaker: no HTTP response.
                    "network_error".to_string()
                } else {
                    info.status.to_string()
                };

                end_metrics
                    .requests_total
                    .with_label_values(&[
                        &info.provider,
                        &info.model,
                        &info.endpoint,
                        &status_code,
                        status_type,
                        stream,
                    ])
                    .inc();

                end_metrics
                    .request_duration
                    .with_label_values(&[&info.provider, &info.model, &info.endpoint, stream])
                    .observe(info.duration.as_secs_f64());
            })),
        }
    }

    /// Render the exposition-format text for the metrics endpoint.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            error!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llmclient::{RequestInfo, ResponseInfo};
    use std::time::Duration;

    fn start_info(stream: bool) -> RequestInfo {
        RequestInfo {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            endpoint: "/chat/completions".into(),
            method: "POST".into(),
            stream,
        }
    }

    fn end_info(status: u16, error: Option<&str>) -> ResponseInfo {
        ResponseInfo {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            endpoint: "/chat/completions".into(),
            status,
            duration: Duration::from_millis(120),
            stream: false,
            error: error.map(String::from),
        }
    }

    #[test]
    fn successful_request_counts_once() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let hooks = metrics.clone().hooks();

        hooks.on_request_start.as_ref().unwrap()(&start_info(false));
        hooks.on_request_end.as_ref().unwrap()(&end_info(200, None));

        let output = metrics.export();
        assert!(output.contains("gomodel_requests_total"));
        assert!(output.contains("status_code=\"200\""));
        assert!(output.contains("status_type=\"success\""));
        // Gauge returned to zero.
        assert!(output.contains("gomodel_requests_in_flight"));
    }

    #[test]
    fn network_failure_labels_status_as_network_error() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let hooks = metrics.clone().hooks();

        hooks.on_request_start.as_ref().unwrap()(&start_info(false));
        hooks.on_request_end.as_ref().unwrap()(&end_info(0, Some("connection refused")));

        let output = metrics.export();
        assert!(output.contains("status_code=\"network_error\""));
        assert!(output.contains("status_type=\"error\""));
    }

    #[test]
    fn duration_histogram_observes() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let hooks = metrics.clone().hooks();

        hooks.on_request_start.as_ref().unwrap()(&start_info(false));
        hooks.on_request_end.as_ref().unwrap()(&end_info(200, None));

        let output = metrics.export();
        assert!(output.contains("gomodel_request_duration_seconds_bucket"));
        assert!(output.contains("gomodel_request_duration_seconds_count"));
    }
}
