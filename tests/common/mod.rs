//! Shared fixtures for integration tests
#![allow(dead_code)]

use serde_json::{json, Value};

/// An OpenAI-format model listing with the given ids.
pub fn models_body(ids: &[&str], owned_by: &str) -> Value {
    json!({
        "object": "list",
        "data": ids.iter().map(|id| json!({
            "id": id,
            "object": "model",
            "created": 1_700_000_000,
            "owned_by": owned_by,
        })).collect::<Vec<_>>(),
    })
}

/// An OpenAI-format chat completion response.
pub fn chat_completion_body(model: &str, content: &str) -> Value {
    json!({
        "id": "chatcmpl-test-123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop",
        }],
        "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21},
    })
}

/// An Anthropic-format messages response.
pub fn anthropic_message_body(model: &str, content: &str) -> Value {
    json!({
        "id": "msg_test_123",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": content}],
        "model": model,
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 10, "output_tokens": 5},
    })
}
