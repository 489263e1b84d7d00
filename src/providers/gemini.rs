//! Google Gemini adapter
//!
//! Chat goes through Gemini's OpenAI-compatible endpoint and passes straight
//! through. Model discovery uses the native API, which lives on a different
//! base URL and authenticates with a `key` query parameter instead of a
//! header. Models are filtered to text-generation-capable `gemini-*` ids.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::streaming::ChatToResponsesStream;
use super::{chat_request_from_responses, responses_from_chat, Provider};
use crate::core::{
    ChatRequest, ChatResponse, Model, ModelsResponse, ResponsesRequest, ResponsesResponse, Result,
};
use crate::llmclient::{ByteStream, ClientConfig, Hooks, LlmClient, UpstreamRequest};

/// Gemini's OpenAI-compatible endpoint
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
/// Native endpoint used for model listing
const DEFAULT_MODELS_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A model in Gemini's native list response
#[derive(Debug, Deserialize)]
struct GeminiModel {
    name: String,
    #[serde(rename = "supportedGenerationMethods", default)]
    supported_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiModelsResponse {
    #[serde(default)]
    models: Vec<GeminiModel>,
}

pub struct GeminiProvider {
    client: LlmClient,
    models_client: LlmClient,
}

impl GeminiProvider {
    pub fn new(api_key: &str, hooks: Hooks) -> Result<Self> {
        let config = ClientConfig::new("gemini", DEFAULT_BASE_URL).with_hooks(hooks.clone());
        let key = format!("Bearer {api_key}");
        let client = LlmClient::new(
            config,
            Arc::new(move |builder| builder.header("Authorization", key.clone())),
        )?;

        // The native models endpoint wants the key as a query parameter;
        // Google's API offers no header alternative there.
        let models_config =
            ClientConfig::new("gemini", DEFAULT_MODELS_BASE_URL).with_hooks(hooks);
        let query_key = api_key.to_string();
        let models_client = LlmClient::new(
            models_config,
            Arc::new(move |builder| builder.query(&[("key", query_key.as_str())])),
        )?;

        Ok(Self {
            client,
            models_client,
        })
    }

    pub fn build(api_key: &str, hooks: Hooks) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(Self::new(api_key, hooks)?))
    }

    fn text_capable(model: &GeminiModel) -> bool {
        model
            .supported_methods
            .iter()
            .any(|m| m == "generateContent" || m == "streamGenerateContent")
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn chat_completion(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.client
            .do_json(UpstreamRequest::post("/chat/completions", req)?)
            .await
    }

    async fn stream_chat_completion(&self, req: &ChatRequest) -> Result<ByteStream> {
        // The OpenAI-compatible endpoint emits OpenAI-format SSE; no
        // re-encoding needed.
        self.client
            .do_stream(UpstreamRequest::post(
                "/chat/completions",
                &req.with_streaming(),
            )?)
            .await
    }

    async fn list_models(&self) -> Result<ModelsResponse> {
        let resp: GeminiModelsResponse = self
            .models_client
            .do_json(UpstreamRequest::get("/models"))
            .await?;

        let now = chrono::Utc::now().timestamp();
        let models = resp
            .models
            .iter()
            .filter(|m| Self::text_capable(m))
            .filter_map(|m| {
                // Native names look like "models/gemini-1.5-pro".
                let id = m.name.strip_prefix("models/").unwrap_or(&m.name);
                id.starts_with("gemini-").then(|| Model {
                    id: id.to_string(),
                    object: "model".to_string(),
                    created: now,
                    owned_by: "google".to_string(),
                })
            })
            .collect();

        Ok(ModelsResponse::new(models))
    }

    async fn responses(&self, req: &ResponsesRequest) -> Result<ResponsesResponse> {
        let chat_req = chat_request_from_responses(req);
        let chat_resp = self.chat_completion(&chat_req).await?;
        Ok(responses_from_chat(&chat_resp))
    }

    async fn stream_responses(&self, req: &ResponsesRequest) -> Result<ByteStream> {
        let mut chat_req = chat_request_from_responses(req);
        chat_req.stream = true;
        let upstream = self.stream_chat_completion(&chat_req).await?;
        Ok(Box::pin(ChatToResponsesStream::new(upstream, &req.model)))
    }

    fn set_base_url(&self, url: &str) {
        self.client.set_base_url(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gemini_model(name: &str, methods: &[&str]) -> GeminiModel {
        GeminiModel {
            name: name.to_string(),
            supported_methods: methods.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn default_endpoints() {
        let provider = GeminiProvider::new("AIza-test", Hooks::default()).unwrap();
        assert_eq!(provider.client.base_url(), DEFAULT_BASE_URL);
        assert_eq!(provider.models_client.base_url(), DEFAULT_MODELS_BASE_URL);
    }

    #[test]
    fn filters_to_text_generation_models() {
        assert!(GeminiProvider::text_capable(&gemini_model(
            "models/gemini-1.5-pro",
            &["generateContent", "countTokens"]
        )));
        assert!(GeminiProvider::text_capable(&gemini_model(
            "models/gemini-2.0-flash",
            &["streamGenerateContent"]
        )));
        assert!(!GeminiProvider::text_capable(&gemini_model(
            "models/text-embedding-004",
            &["embedContent"]
        )));
    }

    #[test]
    fn parses_native_models_response() {
        let json = r#"{
            "models": [
                {"name": "models/gemini-1.5-pro", "supportedGenerationMethods": ["generateContent"]},
                {"name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"]}
            ]
        }"#;
        let resp: GeminiModelsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.models.len(), 2);
        assert_eq!(resp.models[0].name, "models/gemini-1.5-pro");
    }
}
