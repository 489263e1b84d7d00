//! Request router: model id in, owning adapter out
//!
//! A thin façade over the registry that mirrors the adapter protocol. The
//! router never retries and never fans out to providers at request time;
//! `list_models` serves the registry's snapshot.

use std::sync::Arc;

use super::{ModelRegistry, Provider};
use crate::core::{
    ChatRequest, ChatResponse, GatewayError, ModelsResponse, ResponsesRequest, ResponsesResponse,
    Result,
};
use crate::llmclient::ByteStream;

/// Routes requests to the provider owning the requested model.
pub struct Router {
    registry: Arc<ModelRegistry>,
}

impl Router {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// A non-empty cache-loaded snapshot is sufficient to serve requests; an
    /// empty snapshot on an uninitialized registry is not.
    fn ensure_ready(&self) -> Result<()> {
        if !self.registry.is_initialized() && self.registry.model_count() == 0 {
            return Err(GatewayError::RegistryNotInitialized);
        }
        Ok(())
    }

    fn resolve(&self, model_id: &str) -> Result<Arc<dyn Provider>> {
        self.ensure_ready()?;
        self.registry.get_provider(model_id).ok_or_else(|| {
            GatewayError::InvalidRequest(format!("model not supported: {model_id}"))
        })
    }

    pub fn supports(&self, model_id: &str) -> bool {
        self.registry.supports(model_id)
    }

    pub async fn chat_completion(&self, req: &ChatRequest) -> Result<ChatResponse> {
        self.resolve(&req.model)?.chat_completion(req).await
    }

    pub async fn stream_chat_completion(&self, req: &ChatRequest) -> Result<ByteStream> {
        self.resolve(&req.model)?.stream_chat_completion(req).await
    }

    pub async fn responses(&self, req: &ResponsesRequest) -> Result<ResponsesResponse> {
        self.resolve(&req.model)?.responses(req).await
    }

    pub async fn stream_responses(&self, req: &ResponsesRequest) -> Result<ByteStream> {
        self.resolve(&req.model)?.stream_responses(req).await
    }

    /// Sorted model listing from the active snapshot.
    pub fn list_models(&self) -> Result<ModelsResponse> {
        self.ensure_ready()?;
        Ok(ModelsResponse::new(self.registry.list_models()))
    }
}
