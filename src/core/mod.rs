//! Core types shared across the gateway: canonical envelopes and errors.

pub mod error;
pub mod models;

pub use error::{GatewayError, Result};
pub use models::{
    ChatRequest, ChatResponse, Choice, Message, Model, ModelsResponse, ResponsesContentItem,
    ResponsesInput, ResponsesInputContent, ResponsesInputItem, ResponsesOutputItem,
    ResponsesRequest, ResponsesResponse, ResponsesUsage, Usage,
};
