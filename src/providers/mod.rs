//! Provider adapters and the model registry/router built on top of them.
//!
//! Each adapter speaks one backend's wire format and exposes the uniform
//! [`Provider`] surface. Adapters are constructed through the build-once
//! factory table keyed by type tag; there is no other global mutable state.

pub mod anthropic;
pub mod gemini;
pub mod groq;
pub mod openai;
pub mod registry;
pub mod router;
pub mod streaming;
pub mod xai;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::core::{
    ChatRequest, ChatResponse, GatewayError, ModelsResponse, ResponsesRequest, ResponsesResponse,
    Result,
};
use crate::llmclient::{ByteStream, Hooks};

pub use registry::{ModelEntry, ModelRegistry, RefreshHandle};
pub use router::Router;

/// Uniform capability surface for one backend LLM service.
///
/// Streaming variants return a byte source already re-encoded into the
/// gateway's canonical SSE dialect; the caller drops it to release the
/// upstream connection.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat_completion(&self, req: &ChatRequest) -> Result<ChatResponse>;

    async fn stream_chat_completion(&self, req: &ChatRequest) -> Result<ByteStream>;

    async fn list_models(&self) -> Result<ModelsResponse>;

    async fn responses(&self, req: &ResponsesRequest) -> Result<ResponsesResponse>;

    async fn stream_responses(&self, req: &ResponsesRequest) -> Result<ByteStream>;

    /// Override the upstream endpoint. Optional capability; the default is a
    /// no-op for providers with a fixed endpoint.
    fn set_base_url(&self, _url: &str) {}
}

/// Factory signature: credentials plus observability hooks in, adapter out.
pub type Builder = fn(api_key: &str, hooks: Hooks) -> Result<Arc<dyn Provider>>;

/// Build-once table of adapter constructors keyed by type tag. Populated at
/// program start; read-only thereafter.
static BUILDERS: Lazy<BTreeMap<&'static str, Builder>> = Lazy::new(|| {
    BTreeMap::from([
        ("anthropic", anthropic::AnthropicProvider::build as Builder),
        ("gemini", gemini::GeminiProvider::build as Builder),
        ("groq", groq::GroqProvider::build as Builder),
        ("openai", openai::OpenAiProvider::build as Builder),
        ("xai", xai::XaiProvider::build as Builder),
    ])
});

/// Instantiate a provider from configuration.
pub fn create(
    provider_type: &str,
    api_key: &str,
    base_url: Option<&str>,
    hooks: Hooks,
) -> Result<Arc<dyn Provider>> {
    let builder = BUILDERS
        .get(provider_type)
        .ok_or_else(|| GatewayError::Config(format!("unknown provider type: {provider_type}")))?;

    let provider = builder(api_key, hooks)?;
    if let Some(url) = base_url {
        if !url.is_empty() {
            provider.set_base_url(url);
        }
    }
    Ok(provider)
}

/// All registered provider type tags, in sorted order.
pub fn registered_types() -> Vec<&'static str> {
    BUILDERS.keys().copied().collect()
}

/// Map a Responses API request onto a chat request, for providers without a
/// native `responses` endpoint. Instructions become the system message.
pub(crate) fn chat_request_from_responses(req: &ResponsesRequest) -> crate::core::ChatRequest {
    crate::core::ChatRequest {
        model: req.model.clone(),
        messages: req.chat_messages(),
        temperature: req.temperature,
        max_tokens: req.max_output_tokens,
        stream: req.stream,
    }
}

/// Inverse translation: dress a chat response up as a Responses API response.
pub(crate) fn responses_from_chat(resp: &crate::core::ChatResponse) -> ResponsesResponse {
    let content = resp
        .choices
        .first()
        .map(|c| c.message.content.clone())
        .unwrap_or_default();

    ResponsesResponse {
        id: resp.id.clone(),
        object: "response".to_string(),
        created_at: resp.created,
        model: resp.model.clone(),
        status: "completed".to_string(),
        output: vec![crate::core::ResponsesOutputItem {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            item_type: "message".to_string(),
            role: "assistant".to_string(),
            status: "completed".to_string(),
            content: vec![crate::core::ResponsesContentItem {
                content_type: "output_text".to_string(),
                text: content,
                annotations: Vec::new(),
            }],
        }],
        usage: Some(crate::core::ResponsesUsage {
            input_tokens: resp.usage.prompt_tokens,
            output_tokens: resp.usage.completion_tokens,
            total_tokens: resp.usage.total_tokens,
        }),
    }
}
