//! Groq adapter
//!
//! Groq's API is OpenAI-compatible for chat completions and model listing.
//! It has no native Responses API, so `responses` is mapped onto chat and
//! streamed responses are re-encoded by the chat-to-responses translator.

use std::sync::Arc;

use async_trait::async_trait;

use super::streaming::ChatToResponsesStream;
use super::{chat_request_from_responses, responses_from_chat, Provider};
use crate::core::{
    ChatRequest, ChatResponse, ModelsResponse, ResponsesRequest, ResponsesResponse, Result,
};
use crate::llmclient::{ByteStream, ClientConfig, Hooks, LlmClient, UpstreamRequest};

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

pub struct GroqProvider {
    client: LlmClient,
}

impl GroqProvider {
    pub fn new(api_key: &str, hooks: Hooks) -> Result<Self> {
        let config = ClientConfig::new("groq", DEFAULT_BASE_URL).with_hooks(hooks);
        let key = format!("Bearer {api_key}");
        let client = LlmClient::new(
            config,
            Arc::new(move |builder| builder.header("Authorization", key.clone())),
        )?;
        Ok(Self { client })
    }

    pub fn build(api_key: &str, hooks: Hooks) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(Self::new(api_key, hooks)?))
    }
}

#[async_trait]
impl Provider for GroqProvider {
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
    use crate::core::ResponsesInput;

    #[test]
    fn default_endpoint_is_groq() {
        let provider = GroqProvider::new("gsk-test", Hooks::default()).unwrap();
        assert_eq!(provider.client.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn responses_request_maps_onto_chat() {
        let req = ResponsesRequest {
            model: "llama-3.3-70b-versatile".into(),
            input: ResponsesInput::Text("hello".into()),
            instructions: Some("be brief".into()),
            temperature: Some(0.5),
            max_output_tokens: Some(256),
            stream: false,
        };

        let chat_req = chat_request_from_responses(&req);
        assert_eq!(chat_req.model, "llama-3.3-70b-versatile");
        assert_eq!(chat_req.messages[0].role, "system");
        assert_eq!(chat_req.messages[0].content, "be brief");
        assert_eq!(chat_req.messages[1].role, "user");
        assert_eq!(chat_req.max_tokens, Some(256));
        assert_eq!(chat_req.temperature, Some(0.5));
    }
}
