//! OpenAI adapter
//!
//! OpenAI speaks the gateway's canonical dialect natively, so every
//! operation is a passthrough over the resilient client.

use std::sync::Arc;

use async_trait::async_trait;

use super::Provider;
use crate::core::{
    ChatRequest, ChatResponse, ModelsResponse, ResponsesRequest, ResponsesResponse, Result,
};
use crate::llmclient::{ByteStream, ClientConfig, Hooks, LlmClient, UpstreamRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: LlmClient,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, hooks: Hooks) -> Result<Self> {
        let config = ClientConfig::new("openai", DEFAULT_BASE_URL).with_hooks(hooks);
        let key = format!("Bearer {api_key}");
        let client = LlmClient::new(
            config,
            Arc::new(move |builder| builder.header("Authorization", key.clone())),
        )?;
        Ok(Self { client })
    }

    /// Factory entry for the builder table.
    pub fn build(api_key: &str, hooks: Hooks) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(Self::new(api_key, hooks)?))
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn chat_completion(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.client
            .do_json(UpstreamRequest::post("/chat/completions", req)?)
            .await
    }

    async fn stream_chat_completion(&self, req: &ChatRequest) -> Result<ByteStream> {
        self.client
            .do_stream(UpstreamRequest::post(
                "/chat/completions",
                &req.with_streaming(),
            )?)
            .await
    }

    async fn list_models(&self) -> Result<ModelsResponse> {
        self.client.do_json(UpstreamRequest::get("/models")).await
    }

    async fn responses(&self, req: &ResponsesRequest) -> Result<ResponsesResponse> {
        self.client
            .do_json(UpstreamRequest::post("/responses", req)?)
            .await
    }

    async fn stream_responses(&self, req: &ResponsesRequest) -> Result<ByteStream> {
        self.client
            .do_stream(UpstreamRequest::post("/responses", &req.with_streaming())?)
            .await
    }

    fn set_base_url(&self, url: &str) {
        self.client.set_base_url(url);
    }
}
