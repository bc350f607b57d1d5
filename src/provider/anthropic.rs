//! Adapter for the Anthropic messages stream.
//!
//! Wire shape: named SSE events. `content_block_start` opens a text or
//! `tool_use` block (the only place the tool id and name appear),
//! `content_block_delta` carries `text_delta` text or `input_json_delta`
//! argument fragments keyed by block index, and `message_stop` ends the
//! stream. The adapter keeps an index-to-id map so every canonical tool
//! delta carries the call id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::sse::SseFrame;
use super::{FrameDisposition, StreamParams, WireAdapter};
use crate::api::{ApiMessage, ProviderEvent, ToolCallDelta, ToolDescriptor};
use crate::utils::auth::add_auth_headers;
use crate::utils::url::join_endpoint;

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Default)]
pub(crate) struct AnthropicAdapter {
    // Block index -> tool_use id, filled by content_block_start.
    tool_blocks: HashMap<u64, String>,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<RoleMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool<'a>>,
}

#[derive(Serialize)]
struct RoleMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    input_schema: &'a Value,
}

fn build_request_body<'a>(
    model: &'a str,
    messages: &'a [ApiMessage],
    tools: &'a [ToolDescriptor],
) -> MessagesRequest<'a> {
    // System-role entries fold into the top-level `system` field; the
    // messages array accepts only user/assistant turns.
    let mut system_chunks: Vec<&str> = Vec::new();
    let mut role_messages = Vec::new();
    for message in messages {
        match message.role.as_str() {
            "system" => system_chunks.push(&message.content),
            "assistant" => role_messages.push(RoleMessage {
                role: "assistant",
                content: &message.content,
            }),
            _ => role_messages.push(RoleMessage {
                role: "user",
                content: &message.content,
            }),
        }
    }

    MessagesRequest {
        model,
        max_tokens: DEFAULT_MAX_TOKENS,
        stream: true,
        system: (!system_chunks.is_empty()).then(|| system_chunks.join("\n\n")),
        messages: role_messages,
        tools: tools
            .iter()
            .map(|descriptor| AnthropicTool {
                name: &descriptor.name,
                description: descriptor.description.as_deref(),
                input_schema: &descriptor.parameters,
            })
            .collect(),
    }
}

#[derive(Deserialize)]
struct BlockStart {
    index: u64,
    content_block: ContentBlock,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct BlockDelta {
    index: u64,
    delta: DeltaPayload,
}

#[derive(Deserialize)]
struct DeltaPayload {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    partial_json: Option<String>,
}

impl WireAdapter for AnthropicAdapter {
    fn build_request(&self, params: &StreamParams) -> reqwest::RequestBuilder {
        let request = build_request_body(&params.model, &params.messages, &params.tools);
        let url = join_endpoint(&params.base_url, "messages");
        add_auth_headers(
            params.client.post(url).header("Content-Type", "application/json"),
            params.provider,
            &params.api_key,
        )
        .json(&request)
    }

    fn decode(&mut self, frame: &SseFrame) -> FrameDisposition {
        match frame.event.as_deref() {
            Some("content_block_start") => {
                let Ok(start) = serde_json::from_str::<BlockStart>(&frame.data) else {
                    return FrameDisposition::Ignore;
                };
                if start.content_block.kind != "tool_use" {
                    return FrameDisposition::Ignore;
                }
                let (Some(id), Some(name)) = (start.content_block.id, start.content_block.name)
                else {
                    return FrameDisposition::Ignore;
                };
                self.tool_blocks.insert(start.index, id.clone());
                FrameDisposition::Events(vec![ProviderEvent::ToolCall(ToolCallDelta {
                    id: Some(id),
                    name: Some(name),
                    arguments: None,
                })])
            }
            Some("content_block_delta") => {
                let Ok(delta) = serde_json::from_str::<BlockDelta>(&frame.data) else {
                    return FrameDisposition::Ignore;
                };
                match delta.delta.kind.as_str() {
                    "text_delta" => match delta.delta.text {
                        Some(text) if !text.is_empty() => {
                            FrameDisposition::Events(vec![ProviderEvent::TextDelta(text)])
                        }
                        _ => FrameDisposition::Ignore,
                    },
                    "input_json_delta" => {
                        let Some(id) = self.tool_blocks.get(&delta.index) else {
                            return FrameDisposition::Ignore;
                        };
                        FrameDisposition::Events(vec![ProviderEvent::ToolCall(ToolCallDelta {
                            id: Some(id.clone()),
                            name: None,
                            arguments: delta.delta.partial_json,
                        })])
                    }
                    _ => FrameDisposition::Ignore,
                }
            }
            Some("message_stop") => FrameDisposition::Done,
            Some("error") => match super::in_stream_error(&frame.data) {
                Some(message) => FrameDisposition::Fail(message),
                None => FrameDisposition::Fail(super::format_api_error(&frame.data)),
            },
            // message_start, message_delta, content_block_stop, ping
            _ => FrameDisposition::Ignore,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame {
            event: Some(event.to_string()),
            data: data.to_string(),
        }
    }

    #[test]
    fn text_deltas_decode_to_canonical_events() {
        let mut adapter = AnthropicAdapter::default();
        let disposition = adapter.decode(&frame(
            "content_block_delta",
            r#"{"index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
        ));
        match disposition {
            FrameDisposition::Events(events) => {
                assert_eq!(events, vec![ProviderEvent::TextDelta("Hello".into())]);
            }
            other => panic!("expected events, got {other:?}"),
        }
    }

    #[test]
    fn tool_use_blocks_carry_ids_onto_argument_deltas() {
        let mut adapter = AnthropicAdapter::default();
        adapter.decode(&frame(
            "content_block_start",
            r#"{"index":1,"content_block":{"type":"tool_use","id":"toolu_9","name":"lookup"}}"#,
        ));
        let disposition = adapter.decode(&frame(
            "content_block_delta",
            r#"{"index":1,"delta":{"type":"input_json_delta","partial_json":"{\"q\":1}"}}"#,
        ));
        match disposition {
            FrameDisposition::Events(events) => assert_eq!(
                events,
                vec![ProviderEvent::ToolCall(ToolCallDelta {
                    id: Some("toolu_9".into()),
                    name: None,
                    arguments: Some(r#"{"q":1}"#.into()),
                })]
            ),
            other => panic!("expected events, got {other:?}"),
        }
    }

    #[test]
    fn message_stop_terminates() {
        let mut adapter = AnthropicAdapter::default();
        assert!(matches!(
            adapter.decode(&frame("message_stop", "{}")),
            FrameDisposition::Done
        ));
    }

    #[test]
    fn housekeeping_events_are_ignored() {
        let mut adapter = AnthropicAdapter::default();
        assert!(matches!(
            adapter.decode(&frame("ping", "{}")),
            FrameDisposition::Ignore
        ));
        assert!(matches!(
            adapter.decode(&frame("message_start", r#"{"message":{}}"#)),
            FrameDisposition::Ignore
        ));
    }

    #[test]
    fn system_messages_fold_into_system_field() {
        let messages = vec![
            ApiMessage::system("be brief"),
            ApiMessage::user("hi"),
            ApiMessage::assistant("hello"),
        ];
        let request = build_request_body("claude", &messages, &[]);
        assert_eq!(request.system.as_deref(), Some("be brief"));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "user");
        assert_eq!(request.messages[1].role, "assistant");
    }
}
