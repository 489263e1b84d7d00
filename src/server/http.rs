//! HTTP application assembly
//!
//! Public routes (`/health`, the metrics endpoint) are registered outside
//! the `/v1` scope; everything under `/v1` gets the master-key gate and the
//! body size limit. The metrics path is normalized and may never shadow
//! `/v1` routes.

use actix_web::error::JsonPayloadError;
use actix_web::{web, App, HttpRequest, HttpServer};
use tracing::{info, warn};

use super::auth::MasterKeyAuth;
use super::handlers::{self, AppState};
use crate::core::GatewayError;

/// Server assembly options
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Empty disables `/v1` authentication
    pub master_key: String,
    /// Normalized metrics path; `None` when metrics are disabled
    pub metrics_endpoint: Option<String>,
    /// Request body limit for `/v1/*`, in bytes
    pub body_limit: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            master_key: String::new(),
            metrics_endpoint: None,
            body_limit: crate::config::DEFAULT_BODY_SIZE_LIMIT as usize,
        }
    }
}

/// Resolve the configured metrics path: normalize it and refuse anything
/// that would alias under the authenticated `/v1` prefix.
pub fn resolve_metrics_path(configured: &str) -> String {
    if configured.is_empty() {
        return "/metrics".to_string();
    }

    let normalized = normalize_path(configured);
    if normalized == "/v1" || normalized.starts_with("/v1/") {
        warn!(
            configured_path = configured,
            normalized_path = %normalized,
            "metrics endpoint path conflicts with API routes, using /metrics instead"
        );
        return "/metrics".to_string();
    }
    normalized
}

/// Resolve `.` and `..` segments so traversal tricks like `/v1/../admin`
/// cannot sneak past the prefix check.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    match &err {
        JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
            GatewayError::RequestTooLarge(err.to_string()).into()
        }
        JsonPayloadError::Payload(actix_web::error::PayloadError::Overflow) => {
            GatewayError::RequestTooLarge(err.to_string()).into()
        }
        _ => GatewayError::InvalidRequest(err.to_string()).into(),
    }
}

/// Register all routes and middleware on an app. Shared between the real
/// server and the test harness.
pub fn configure_app(cfg: &mut web::ServiceConfig, state: AppState, settings: &ServerSettings) {
    cfg.app_data(web::Data::new(state));
    cfg.route("/health", web::get().to(handlers::health));

    if let Some(path) = &settings.metrics_endpoint {
        cfg.route(path, web::get().to(handlers::metrics));
    }

    cfg.service(
        web::scope("/v1")
            .wrap(MasterKeyAuth::new(&settings.master_key))
            .app_data(
                web::JsonConfig::default()
                    .limit(settings.body_limit)
                    .error_handler(json_error_handler),
            )
            .app_data(web::PayloadConfig::new(settings.body_limit))
            .route("/models", web::get().to(handlers::list_models))
            .route("/chat/completions", web::post().to(handlers::chat_completions))
            .route("/responses", web::post().to(handlers::responses)),
    );
}

/// Bind and serve until shutdown.
pub async fn run_server(
    addr: &str,
    state: AppState,
    settings: ServerSettings,
) -> std::io::Result<()> {
    info!(addr, "starting server");

    HttpServer::new(move || {
        let state = state.clone();
        let settings = settings.clone();
        App::new().configure(move |cfg| configure_app(cfg, state, &settings))
    })
    .bind(addr)?
    .run()
    .await
}
