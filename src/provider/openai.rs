//! Adapter for OpenAI-compatible chat-completion streams.
//!
//! Wire shape: `data:`-prefixed JSON delta frames terminated by a `[DONE]`
//! sentinel. Text arrives at `choices[0].delta.content`; tool calls arrive
//! fragmented across frames, with the id and name on the first fragment and
//! argument text spread over the rest.

use serde::{Deserialize, Serialize};

use super::sse::SseFrame;
use super::{FrameDisposition, StreamParams, WireAdapter};
use crate::api::{ApiMessage, ProviderEvent, ToolCallDelta, ToolDescriptor};
use crate::utils::auth::add_auth_headers;
use crate::utils::url::join_endpoint;

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub(crate) struct OpenAiAdapter;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatToolDefinition<'a>>>,
}

#[derive(Serialize)]
struct ChatToolDefinition<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDescriptor,
}

#[derive(Deserialize)]
struct ChatChunk {
    choices: Vec<ChatChunkChoice>,
}

#[derive(Deserialize)]
struct ChatChunkChoice {
    delta: ChatChunkDelta,
}

#[derive(Deserialize)]
struct ChatChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

impl WireAdapter for OpenAiAdapter {
    fn build_request(&self, params: &StreamParams) -> reqwest::RequestBuilder {
        let tools = (!params.tools.is_empty()).then(|| {
            params
                .tools
                .iter()
                .map(|descriptor| ChatToolDefinition {
                    kind: "function",
                    function: descriptor,
                })
                .collect()
        });
        let request = ChatRequest {
            model: &params.model,
            messages: &params.messages,
            stream: true,
            tools,
        };

        let url = join_endpoint(&params.base_url, "chat/completions");
        add_auth_headers(
            params.client.post(url).header("Content-Type", "application/json"),
            params.provider,
            &params.api_key,
        )
        .json(&request)
    }

    fn decode(&mut self, frame: &SseFrame) -> FrameDisposition {
        if frame.data == "[DONE]" {
            return FrameDisposition::Done;
        }

        match serde_json::from_str::<ChatChunk>(&frame.data) {
            Ok(chunk) => {
                let mut events = Vec::new();
                if let Some(choice) = chunk.choices.first() {
                    if let Some(content) = &choice.delta.content {
                        if !content.is_empty() {
                            events.push(ProviderEvent::TextDelta(content.clone()));
                        }
                    }
                    for call in choice.delta.tool_calls.iter().flatten() {
                        let function = call.function.as_ref();
                        events.push(ProviderEvent::ToolCall(ToolCallDelta {
                            id: call.id.clone(),
                            name: function.and_then(|f| f.name.clone()),
                            arguments: function.and_then(|f| f.arguments.clone()),
                        }));
                    }
                }
                if events.is_empty() {
                    FrameDisposition::Ignore
                } else {
                    FrameDisposition::Events(events)
                }
            }
            Err(_) => match super::in_stream_error(&frame.data) {
                Some(message) => FrameDisposition::Fail(message),
                None => FrameDisposition::Ignore,
            },
        }
    }
}
