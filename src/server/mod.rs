//! HTTP surface: routing, authentication, handlers, error envelope.

pub mod auth;
pub mod handlers;
pub mod http;

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;

use crate::core::GatewayError;

pub use handlers::AppState;
pub use http::{configure_app, resolve_metrics_path, run_server, ServerSettings};

/// Wire shape of every error reply: `{"error":{"type","message"}}`.
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
}

impl ErrorEnvelope {
    fn from_error(err: &GatewayError) -> Self {
        Self {
            error: ErrorBody {
                kind: err.error_type(),
                message: err.to_string(),
            },
        }
    }
}

impl actix_web::ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(GatewayError::status_code(self))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(actix_web::ResponseError::status_code(self))
            .json(ErrorEnvelope::from_error(self))
    }
}
