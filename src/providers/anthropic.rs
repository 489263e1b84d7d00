//! Anthropic adapter
//!
//! Anthropic speaks its own messages dialect rather than the OpenAI one:
//! requests convert on the way out (system message lifted into the `system`
//! field, `max_tokens` required) and responses convert back on the way in.
//! Streams re-encode Anthropic SSE into the canonical dialects. Anthropic
//! has no model-discovery endpoint, so listing returns a curated set.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::streaming::{AnthropicToChatStream, AnthropicToResponsesStream};
use super::Provider;
use crate::core::{
    ChatRequest, ChatResponse, Choice, Message, Model, ModelsResponse, ResponsesContentItem,
    ResponsesOutputItem, ResponsesRequest, ResponsesResponse, ResponsesUsage, Result, Usage,
};
use crate::llmclient::{ByteStream, ClientConfig, Hooks, LlmClient, UpstreamRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
/// Anthropic requires max_tokens; applied when the caller leaves it unset.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Models offered when listing; Anthropic has no discovery endpoint.
const KNOWN_MODELS: &[&str] = &[
    "claude-3-5-sonnet-20241022",
    "claude-3-5-sonnet-20240620",
    "claude-3-5-haiku-20241022",
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

fn is_false(b: &bool) -> bool {
    !*b
}

/// Anthropic messages-API request
#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    stream: bool,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

/// Anthropic messages-API response
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    #[serde(default)]
    content: Vec<AnthropicContent>,
    model: String,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Lift the system message into the native `system` field; everything else
/// keeps its role.
fn to_native_request(req: &ChatRequest) -> AnthropicRequest {
    let mut native = AnthropicRequest {
        model: req.model.clone(),
        messages: Vec::with_capacity(req.messages.len()),
        max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        temperature: req.temperature,
        system: None,
        stream: req.stream,
    };

    for msg in &req.messages {
        if msg.role == "system" {
            native.system = Some(msg.content.clone());
        } else {
            native.messages.push(AnthropicMessage {
                role: msg.role.clone(),
                content: msg.content.clone(),
            });
        }
    }

    native
}

fn from_native_response(resp: AnthropicResponse) -> ChatResponse {
    let content = resp
        .content
        .first()
        .map(|c| c.text.clone())
        .unwrap_or_default();

    let finish_reason = match resp.stop_reason {
        Some(reason) if !reason.is_empty() => reason,
        _ => "stop".to_string(),
    };

    ChatResponse {
        id: resp.id,
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: resp.model,
        choices: vec![Choice {
            index: 0,
            message: Message::new("assistant", content),
            finish_reason,
        }],
        usage: Usage {
            prompt_tokens: resp.usage.input_tokens,
            completion_tokens: resp.usage.output_tokens,
            total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
        },
    }
}

/// A Responses API request translated into the native dialect: instructions
/// become the system field, input items become messages.
fn responses_to_native(req: &ResponsesRequest) -> AnthropicRequest {
    let messages = req
        .input
        .to_messages()
        .into_iter()
        .map(|m| AnthropicMessage {
            role: m.role,
            content: m.content,
        })
        .collect();

    AnthropicRequest {
        model: req.model.clone(),
        messages,
        max_tokens: req.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        temperature: req.temperature,
        system: req.instructions.clone().filter(|i| !i.is_empty()),
        stream: req.stream,
    }
}

fn native_to_responses(resp: AnthropicResponse, model: &str) -> ResponsesResponse {
    let content = resp
        .content
        .first()
        .map(|c| c.text.clone())
        .unwrap_or_default();

    ResponsesResponse {
        id: resp.id,
        object: "response".to_string(),
        created_at: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        status: "completed".to_string(),
        output: vec![ResponsesOutputItem {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            item_type: "message".to_string(),
            role: "assistant".to_string(),
            status: "completed".to_string(),
            content: vec![ResponsesContentItem {
                content_type: "output_text".to_string(),
                text: content,
                annotations: Vec::new(),
            }],
        }],
        usage: Some(ResponsesUsage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
            total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
        }),
    }
}

pub struct AnthropicProvider {
    client: LlmClient,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, hooks: Hooks) -> Result<Self> {
        let config = ClientConfig::new("anthropic", DEFAULT_BASE_URL).with_hooks(hooks);
        let key = api_key.to_string();
        let client = LlmClient::new(
            config,
            Arc::new(move |builder| {
                builder
                    .header("x-api-key", key.clone())
                    .header("anthropic-version", API_VERSION)
            }),
        )?;
        Ok(Self { client })
    }

    pub fn build(api_key: &str, hooks: Hooks) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(Self::new(api_key, hooks)?))
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn chat_completion(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let native = to_native_request(req);
        let resp: AnthropicResponse = self
            .client
            .do_json(UpstreamRequest::post("/messages", &native)?)
            .await?;
        Ok(from_native_response(resp))
    }

    async fn stream_chat_completion(&self, req: &ChatRequest) -> Result<ByteStream> {
        let mut native = to_native_request(req);
        native.stream = true;

        let upstream = self
            .client
            .do_stream(UpstreamRequest::post("/messages", &native)?)
            .await?;
        Ok(Box::pin(AnthropicToChatStream::new(upstream, &req.model)))
    }

    async fn list_models(&self) -> Result<ModelsResponse> {
        let now = chrono::Utc::now().timestamp();
        let models = KNOWN_MODELS
            .iter()
            .map(|id| Model {
                id: id.to_string(),
                object: "model".to_string(),
                created: now,
                owned_by: "anthropic".to_string(),
            })
            .collect();
        Ok(ModelsResponse::new(models))
    }

    async fn responses(&self, req: &ResponsesRequest) -> Result<ResponsesResponse> {
        let native = responses_to_native(req);
        let resp: AnthropicResponse = self
            .client
            .do_json(UpstreamRequest::post("/messages", &native)?)
            .await?;
        Ok(native_to_responses(resp, &req.model))
    }

    async fn stream_responses(&self, req: &ResponsesRequest) -> Result<ByteStream> {
        let mut native = responses_to_native(req);
        native.stream = true;

        let upstream = self
            .client
            .do_stream(UpstreamRequest::post("/messages", &native)?)
            .await?;
        Ok(Box::pin(AnthropicToResponsesStream::new(
            upstream, &req.model,
        )))
    }

    fn set_base_url(&self, url: &str) {
        self.client.set_base_url(url);
    }
}
