//! Byte-level SSE translators
//!
//! Each translator wraps a provider byte stream and re-encodes its chunk
//! dialect into the gateway's canonical output dialect, preserving record
//! ordering and terminators. Translators are line-buffering state machines;
//! they spawn no tasks and hold no locks.
//!
//! Invariants per translator lifetime:
//! - `response.created` is emitted exactly once, before any delta
//! - `response.done` is emitted exactly once, before end of stream
//! - malformed records are skipped, never fatal
//! - upstream read errors propagate once, after which the stream ends

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use pin_project_lite::pin_project;
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use crate::core::Result;
use crate::llmclient::ByteStream;

/// Serialize one canonical SSE record: `event: <type>\ndata: <json>\n\n`.
fn sse_record(event: &str, payload: &Value) -> Option<Bytes> {
    match serde_json::to_string(payload) {
        Ok(data) => Some(Bytes::from(format!("event: {event}\ndata: {data}\n\n"))),
        Err(e) => {
            error!(event, error = %e, "failed to marshal SSE event");
            None
        }
    }
}

fn created_payload(response_id: &str, model: &str) -> Value {
    json!({
        "type": "response.created",
        "response": {
            "id": response_id,
            "object": "response",
            "status": "in_progress",
            "model": model,
            "created_at": chrono::Utc::now().timestamp(),
        }
    })
}

fn done_payload(response_id: &str, model: &str) -> Value {
    json!({
        "type": "response.done",
        "response": {
            "id": response_id,
            "object": "response",
            "status": "completed",
            "model": model,
            "created_at": chrono::Utc::now().timestamp(),
        }
    })
}

fn delta_payload(delta: &str) -> Value {
    json!({
        "type": "response.output_text.delta",
        "delta": delta,
    })
}

/// The terminal payload marker closing every canonical stream.
const DONE_MARKER: &[u8] = b"data: [DONE]\n\n";

/// Synthesize a response id; chat-completion-style upstreams do not carry one.
fn new_response_id() -> String {
    format!("resp_{}", Uuid::new_v4())
}

/// Strip the SSE data prefix from a line, tolerating both `data:` and
/// `data: `.
fn data_line(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

pin_project! {
    /// Translates an OpenAI-style chat-completion SSE stream into the
    /// Responses API event dialect.
    ///
    /// Used by providers whose chat endpoint is OpenAI-compatible but which
    /// have no native `responses` endpoint.
    pub struct ChatToResponsesStream {
        #[pin]
        inner: Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
    }
}

impl ChatToResponsesStream {
    pub fn new(upstream: ByteStream, model: impl Into<String>) -> Self {
        let model = model.into();
        let response_id = new_response_id();

        let stream = async_stream::stream! {
            let mut upstream = upstream;
            let mut line_buf = String::new();
            let mut sent_done = false;

            // Prologue goes out before any upstream bytes are inspected.
            if let Some(record) = sse_record("response.created", &created_payload(&response_id, &model)) {
                yield Ok(record);
            }

            while let Some(chunk) = upstream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        // Propagate unchanged, then end the stream.
                        yield Err(e);
                        return;
                    }
                };

                line_buf.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = line_buf.find('\n') {
                    let line = line_buf[..pos].trim().to_string();
                    line_buf.drain(..=pos);

                    let Some(data) = data_line(&line) else { continue };

                    if data == "[DONE]" {
                        if !sent_done {
                            sent_done = true;
                            if let Some(record) = sse_record("response.done", &done_payload(&response_id, &model)) {
                                yield Ok(record);
                            }
                            yield Ok(Bytes::from_static(DONE_MARKER));
                        }
                        continue;
                    }
                    if sent_done {
                        // Trailing records after [DONE] are consumed, not forwarded.
                        continue;
                    }

                    let chunk: Value = match serde_json::from_str(data) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            debug!(error = %e, "skipping malformed chat chunk");
                            continue;
                        }
                    };

                    if let Some(content) = chunk
                        .get("choices")
                        .and_then(|c| c.get(0))
                        .and_then(|c| c.get("delta"))
                        .and_then(|d| d.get("content"))
                        .and_then(|c| c.as_str())
                    {
                        if !content.is_empty() {
                            if let Some(record) = sse_record("response.output_text.delta", &delta_payload(content)) {
                                yield Ok(record);
                            }
                        }
                    }
                }
            }

            if !sent_done {
                if let Some(record) = sse_record("response.done", &done_payload(&response_id, &model)) {
                    yield Ok(record);
                }
                yield Ok(Bytes::from_static(DONE_MARKER));
            }
        };

        Self {
            inner: Box::pin(stream),
        }
    }
}

impl Stream for ChatToResponsesStream {
    type Item = Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

pin_project! {
    /// Translates an Anthropic messages SSE stream into OpenAI-style
    /// chat-completion chunk SSE.
    pub struct AnthropicToChatStream {
        #[pin]
        inner: Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
    }
}

impl AnthropicToChatStream {
    pub fn new(upstream: ByteStream, model: impl Into<String>) -> Self {
        let model = model.into();

        let stream = async_stream::stream! {
            let mut upstream = upstream;
            let mut line_buf = String::new();
            let mut message_id = String::new();

            while let Some(chunk) = upstream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                line_buf.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = line_buf.find('\n') {
                    let line = line_buf[..pos].trim().to_string();
                    line_buf.drain(..=pos);

                    if line.is_empty() || line.starts_with("event:") {
                        continue;
                    }
                    let Some(data) = data_line(&line) else { continue };

                    let event: Value = match serde_json::from_str(data) {
                        Ok(event) => event,
                        Err(e) => {
                            debug!(error = %e, "skipping malformed anthropic event");
                            continue;
                        }
                    };

                    if let Some(chunk) = Self::convert_event(&event, &model, &mut message_id) {
                        yield Ok(chunk);
                    }
                }
            }

            yield Ok(Bytes::from_static(DONE_MARKER));
        };

        Self {
            inner: Box::pin(stream),
        }
    }

    /// Map one Anthropic stream event onto an OpenAI chat chunk record.
    fn convert_event(event: &Value, model: &str, message_id: &mut String) -> Option<Bytes> {
        let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");

        match event_type {
            "message_start" => {
                if let Some(id) = event
                    .get("message")
                    .and_then(|m| m.get("id"))
                    .and_then(|i| i.as_str())
                {
                    *message_id = id.to_string();
                }
                None
            }
            "content_block_delta" => {
                let text = event
                    .get("delta")
                    .and_then(|d| d.get("text"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("");
                if text.is_empty() {
                    return None;
                }
                let chunk = json!({
                    "id": message_id,
                    "object": "chat.completion.chunk",
                    "created": chrono::Utc::now().timestamp(),
                    "model": model,
                    "choices": [{
                        "index": 0,
                        "delta": {"content": text},
                        "finish_reason": null,
                    }],
                });
                Self::chunk_record(&chunk, message_id)
            }
            "message_delta" => {
                let stop_reason = event
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(|r| r.as_str())
                    .unwrap_or("");
                if stop_reason.is_empty() {
                    return None;
                }
                let chunk = json!({
                    "id": message_id,
                    "object": "chat.completion.chunk",
                    "created": chrono::Utc::now().timestamp(),
                    "model": model,
                    "choices": [{
                        "index": 0,
                        "delta": {},
                        "finish_reason": stop_reason,
                    }],
                });
                Self::chunk_record(&chunk, message_id)
            }
            // message_stop is folded into the [DONE] emitted at EOF; anything
            // else is discarded.
            _ => None,
        }
    }

    fn chunk_record(chunk: &Value, message_id: &str) -> Option<Bytes> {
        match serde_json::to_string(chunk) {
            Ok(data) => Some(Bytes::from(format!("data: {data}\n\n"))),
            Err(e) => {
                error!(message_id, error = %e, "failed to marshal chat chunk");
                None
            }
        }
    }
}

impl Stream for AnthropicToChatStream {
    type Item = Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

pin_project! {
    /// Translates an Anthropic messages SSE stream into the Responses API
    /// event dialect.
    pub struct AnthropicToResponsesStream {
        #[pin]
        inner: Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>,
    }
}

impl AnthropicToResponsesStream {
    pub fn new(upstream: ByteStream, model: impl Into<String>) -> Self {
        let model = model.into();
        let response_id = new_response_id();

        let stream = async_stream::stream! {
            let mut upstream = upstream;
            let mut line_buf = String::new();

            while let Some(chunk) = upstream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                line_buf.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = line_buf.find('\n') {
                    let line = line_buf[..pos].trim().to_string();
                    line_buf.drain(..=pos);

                    if line.is_empty() || line.starts_with("event:") {
                        continue;
                    }
                    let Some(data) = data_line(&line) else { continue };

                    let event: Value = match serde_json::from_str(data) {
                        Ok(event) => event,
                        Err(e) => {
                            debug!(error = %e, "skipping malformed anthropic event");
                            continue;
                        }
                    };

                    let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");
                    match event_type {
                        "message_start" => {
                            if let Some(record) = sse_record("response.created", &created_payload(&response_id, &model)) {
                                yield Ok(record);
                            }
                        }
                        "content_block_delta" => {
                            let text = event
                                .get("delta")
                                .and_then(|d| d.get("text"))
                                .and_then(|t| t.as_str())
                                .unwrap_or("");
                            if !text.is_empty() {
                                if let Some(record) = sse_record("response.output_text.delta", &delta_payload(text)) {
                                    yield Ok(record);
                                }
                            }
                        }
                        // message_stop maps to the done record at EOF.
                        _ => {}
                    }
                }
            }

            if let Some(record) = sse_record("response.done", &done_payload(&response_id, &model)) {
                yield Ok(record);
            }
            yield Ok(Bytes::from_static(DONE_MARKER));
        };

        Self {
            inner: Box::pin(stream),
        }
    }
}

impl Stream for AnthropicToResponsesStream {
    type Item = Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GatewayError;

    fn source(chunks: Vec<&'static str>) -> ByteStream {
        Box::pin(futures::stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))),
        ))
    }

    fn failing_source(chunks: Vec<&'static str>) -> ByteStream {
        let items: Vec<Result<Bytes>> = chunks
            .into_iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .chain(std::iter::once(Err(GatewayError::Network {
                provider: "test".into(),
                message: "connection reset".into(),
            })))
            .collect();
        Box::pin(futures::stream::iter(items))
    }

    async fn collect_ok(mut stream: impl Stream<Item = Result<Bytes>> + Unpin) -> String {
        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&String::from_utf8_lossy(&item.expect("stream item")));
        }
        out
    }

    fn event_positions(output: &str, needles: &[&str]) -> Vec<usize> {
        needles
            .iter()
            .map(|n| output.find(n).unwrap_or_else(|| panic!("missing {n:?} in {output}")))
            .collect()
    }

    #[tokio::test]
    async fn chat_to_responses_emits_canonical_sequence() {
        let upstream = source(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let output = collect_ok(ChatToResponsesStream::new(upstream, "gpt-4o")).await;

        let positions = event_positions(
            &output,
            &[
                "event: response.created",
                "\"delta\":\"Hello\"",
                "\"delta\":\" world\"",
                "event: response.done",
                "data: [DONE]",
            ],
        );
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "order: {output}");

        assert_eq!(output.matches("response.created").count(), 1);
        assert_eq!(output.matches("response.done").count(), 1);
        assert_eq!(output.matches("data: [DONE]").count(), 1);
    }

    #[tokio::test]
    async fn chat_to_responses_handles_split_chunks() {
        // A record split across reads must reassemble before translation.
        let upstream = source(vec![
            "data: {\"choices\":[{\"delta\":",
            "{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n",
        ]);
        let output = collect_ok(ChatToResponsesStream::new(upstream, "gpt-4o")).await;
        assert!(output.contains("\"delta\":\"Hi\""), "{output}");
    }

    #[tokio::test]
    async fn chat_to_responses_synthesizes_done_on_eof() {
        // Upstream that ends without [DONE] still gets a terminator.
        let upstream = source(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n",
        ]);
        let output = collect_ok(ChatToResponsesStream::new(upstream, "gpt-4o")).await;
        assert_eq!(output.matches("response.done").count(), 1);
        assert!(output.ends_with("data: [DONE]\n\n"), "{output}");
    }

    #[tokio::test]
    async fn chat_to_responses_skips_malformed_and_empty_records() {
        let upstream = source(vec![
            "data: this is not json\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"kept\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let output = collect_ok(ChatToResponsesStream::new(upstream, "gpt-4o")).await;
        assert_eq!(output.matches("output_text.delta").count(), 1);
        assert!(output.contains("\"delta\":\"kept\""));
    }

    #[tokio::test]
    async fn chat_to_responses_ignores_records_after_done() {
        let upstream = source(vec![
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
        ]);
        let output = collect_ok(ChatToResponsesStream::new(upstream, "gpt-4o")).await;
        assert!(!output.contains("late"));
        assert_eq!(output.matches("response.done").count(), 1);
        assert_eq!(output.matches("data: [DONE]").count(), 1);
    }

    #[tokio::test]
    async fn chat_to_responses_created_precedes_upstream_data() {
        // Even an immediately-empty upstream yields created before done.
        let upstream = source(vec![]);
        let output = collect_ok(ChatToResponsesStream::new(upstream, "gpt-4o")).await;
        let created = output.find("response.created").unwrap();
        let done = output.find("response.done").unwrap();
        assert!(created < done);
    }

    #[tokio::test]
    async fn chat_to_responses_propagates_upstream_error() {
        let upstream = failing_source(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
        ]);
        let mut stream = ChatToResponsesStream::new(upstream, "gpt-4o");

        let mut saw_error = false;
        while let Some(item) = stream.next().await {
            if let Err(e) = item {
                assert!(matches!(e, GatewayError::Network { .. }));
                saw_error = true;
            }
        }
        assert!(saw_error);
        // Closed after the error: further polls yield nothing.
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn anthropic_to_chat_converts_deltas() {
        let upstream = source(vec![
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        ]);
        let output = collect_ok(AnthropicToChatStream::new(upstream, "claude-3-5-sonnet-20241022")).await;

        assert!(output.contains("\"id\":\"msg_1\""));
        assert!(output.contains("chat.completion.chunk"));
        assert!(output.contains("\"content\":\"Hi\""));
        assert!(output.contains("\"finish_reason\":\"end_turn\""));
        assert!(output.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn anthropic_to_chat_skips_unknown_events() {
        let upstream = source(vec![
            "data: {\"type\":\"content_block_start\",\"index\":0}\n\n",
            "data: {\"type\":\"ping\"}\n\n",
            "data: not json at all\n\n",
        ]);
        let output = collect_ok(AnthropicToChatStream::new(upstream, "claude-3-haiku-20240307")).await;
        // Nothing converted, just the terminator.
        assert_eq!(output, "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn anthropic_to_responses_full_sequence() {
        let upstream = source(vec![
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"Hello\"}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        ]);
        let output =
            collect_ok(AnthropicToResponsesStream::new(upstream, "claude-3-5-sonnet-20241022"))
                .await;

        let positions = event_positions(
            &output,
            &[
                "event: response.created",
                "\"delta\":\"Hello\"",
                "event: response.done",
                "data: [DONE]",
            ],
        );
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "order: {output}");
        assert_eq!(output.matches("response.created").count(), 1);
        assert_eq!(output.matches("response.done").count(), 1);
    }

    #[tokio::test]
    async fn anthropic_to_responses_done_without_message_stop() {
        let upstream = source(vec![
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"m\"}}\n\n",
        ]);
        let output =
            collect_ok(AnthropicToResponsesStream::new(upstream, "claude-3-opus-20240229")).await;
        assert_eq!(output.matches("response.done").count(), 1);
        assert!(output.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn response_ids_are_unique_per_translator() {
        let a = new_response_id();
        let b = new_response_id();
        assert!(a.starts_with("resp_"));
        assert_ne!(a, b);
    }
}
