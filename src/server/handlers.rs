//! Request handlers for the HTTP surface

use std::sync::Arc;

use actix_web::http::header::CACHE_CONTROL;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

use crate::core::{ChatRequest, GatewayError, ResponsesRequest};
use crate::llmclient::ByteStream;
use crate::observability::Metrics;
use crate::providers::Router;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub metrics: Option<Arc<Metrics>>,
}

/// `GET /health` (public)
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}

/// `GET <metrics endpoint>` (public, registered only when enabled)
pub async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    match &state.metrics {
        Some(metrics) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(metrics.export()),
        None => HttpResponse::NotFound().finish(),
    }
}

/// `GET /v1/models`
pub async fn list_models(state: web::Data<AppState>) -> Result<HttpResponse, GatewayError> {
    Ok(HttpResponse::Ok().json(state.router.list_models()?))
}

/// `POST /v1/chat/completions`
pub async fn chat_completions(
    state: web::Data<AppState>,
    payload: web::Json<ChatRequest>,
) -> Result<HttpResponse, GatewayError> {
    let req = payload.into_inner();
    info!(model = %req.model, stream = req.stream, "chat completion request");

    if req.stream {
        let stream = state.router.stream_chat_completion(&req).await?;
        Ok(sse_response(stream))
    } else {
        let resp = state.router.chat_completion(&req).await?;
        Ok(HttpResponse::Ok().json(resp))
    }
}

/// `POST /v1/responses`
pub async fn responses(
    state: web::Data<AppState>,
    payload: web::Json<ResponsesRequest>,
) -> Result<HttpResponse, GatewayError> {
    let req = payload.into_inner();
    info!(model = %req.model, stream = req.stream, "responses request");

    if req.stream {
        let stream = state.router.stream_responses(&req).await?;
        Ok(sse_response(stream))
    } else {
        let resp = state.router.responses(&req).await?;
        Ok(HttpResponse::Ok().json(resp))
    }
}

fn sse_response(stream: ByteStream) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((CACHE_CONTROL, "no-cache"))
        .insert_header(("Connection", "keep-alive"))
        .streaming(stream)
}
