//! Canonical request/response envelopes
//!
//! These are the gateway's internal wire shapes, independent of any backend's
//! native format. The chat types follow the OpenAI chat-completions schema;
//! the responses types follow the newer Responses API schema. Adapters
//! translate between these and their provider's dialect.

use serde::{Deserialize, Serialize};

fn is_false(b: &bool) -> bool {
    !*b
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// One of "system", "user", "assistant"
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub stream: bool,
}

impl ChatRequest {
    /// Copy of the request with the stream flag forced on, for the streaming
    /// upstream call.
    pub fn with_streaming(&self) -> Self {
        let mut req = self.clone();
        req.stream = true;
        req
    }
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
}

/// A completion choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: String,
}

/// Token usage accounting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A model record as surfaced by `/v1/models`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

/// Model listing envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub object: String,
    #[serde(default)]
    pub data: Vec<Model>,
}

impl ModelsResponse {
    pub fn new(data: Vec<Model>) -> Self {
        Self {
            object: "list".to_string(),
            data,
        }
    }
}

/// Responses API request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: ResponsesInput,
    /// Functions as the system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub stream: bool,
}

impl ResponsesRequest {
    /// Copy of the request with the stream flag forced on.
    pub fn with_streaming(&self) -> Self {
        let mut req = self.clone();
        req.stream = true;
        req
    }

    /// Flatten instructions + input into an ordered chat message list, for
    /// providers that map the Responses API onto chat completions.
    pub fn chat_messages(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        if let Some(instructions) = &self.instructions {
            if !instructions.is_empty() {
                messages.push(Message::new("system", instructions.clone()));
            }
        }
        messages.extend(self.input.to_messages());
        messages
    }
}

/// The `input` field: either a plain string or an ordered list of role/content
/// items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsesInput {
    Text(String),
    Items(Vec<ResponsesInputItem>),
}

/// A role/content item in a structured responses input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesInputItem {
    pub role: String,
    pub content: ResponsesInputContent,
}

/// Item content: plain text or a list of typed parts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsesInputContent {
    Text(String),
    Parts(Vec<ResponsesInputPart>),
}

/// A typed content part; only the text is extracted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesInputPart {
    #[serde(rename = "type", default)]
    pub part_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl ResponsesInput {
    /// Convert the input into chat messages, joining text parts with a space
    /// and skipping items that carry no text.
    pub fn to_messages(&self) -> Vec<Message> {
        match self {
            Self::Text(text) => vec![Message::new("user", text.clone())],
            Self::Items(items) => items
                .iter()
                .filter_map(|item| {
                    let content = item.content.text();
                    if item.role.is_empty() || content.is_empty() {
                        None
                    } else {
                        Some(Message::new(item.role.clone(), content))
                    }
                })
                .collect(),
        }
    }
}

impl ResponsesInputContent {
    fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Responses API response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesResponse {
    pub id: String,
    pub object: String,
    pub created_at: i64,
    pub model: String,
    pub status: String,
    pub output: Vec<ResponsesOutputItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponsesUsage>,
}

/// One output item (a message with typed content parts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesOutputItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub role: String,
    pub status: String,
    pub content: Vec<ResponsesContentItem>,
}

/// A typed content part of an output item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
    #[serde(default)]
    pub annotations: Vec<String>,
}

/// Token usage for the Responses API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsesUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_streaming_sets_flag() {
        let req = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::new("user", "hi")],
            temperature: None,
            max_tokens: None,
            stream: false,
        };
        assert!(req.with_streaming().stream);
        assert!(!req.stream);
    }

    #[test]
    fn stream_flag_omitted_when_false() {
        let req = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![],
            temperature: None,
            max_tokens: None,
            stream: false,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("stream"));
        let json = serde_json::to_string(&req.with_streaming()).unwrap();
        assert!(json.contains("\"stream\":true"));
    }

    #[test]
    fn responses_input_plain_string() {
        let input: ResponsesInput = serde_json::from_str(r#""hello""#).unwrap();
        let messages = input.to_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "hello");
    }

    #[test]
    fn responses_input_structured_items() {
        let input: ResponsesInput = serde_json::from_str(
            r#"[
                {"role":"user","content":"first"},
                {"role":"assistant","content":[{"type":"output_text","text":"a"},{"type":"output_text","text":"b"}]}
            ]"#,
        )
        .unwrap();
        let messages = input.to_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, "a b");
    }

    #[test]
    fn responses_input_skips_empty_items() {
        let input: ResponsesInput = serde_json::from_str(
            r#"[{"role":"user","content":""},{"role":"user","content":"kept"}]"#,
        )
        .unwrap();
        let messages = input.to_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "kept");
    }

    #[test]
    fn chat_messages_lifts_instructions_first() {
        let req = ResponsesRequest {
            model: "gpt-4o".into(),
            input: ResponsesInput::Text("hi".into()),
            instructions: Some("be terse".into()),
            temperature: None,
            max_output_tokens: None,
            stream: false,
        };
        let messages = req.chat_messages();
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "be terse");
        assert_eq!(messages[1].role, "user");
    }

    #[test]
    fn chat_request_roundtrip() {
        let json = r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}],"temperature":0.7,"stream":true}"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.model, "gpt-4o");
        assert_eq!(req.temperature, Some(0.7));
        assert!(req.stream);
        assert_eq!(req.max_tokens, None);
    }
}
