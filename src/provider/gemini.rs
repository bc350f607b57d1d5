//! Adapter for the Gemini `streamGenerateContent` stream.
//!
//! Wire shape: with `alt=sse`, each frame is a whole `GenerateContentResponse`
//! JSON object whose `candidates[0].content.parts` mix `text` and complete
//! `functionCall` parts. There is no done sentinel; the stream ends when the
//! transport closes. Function calls carry no id, so the adapter synthesizes
//! one per call to keep the canonical contract uniform.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::sse::SseFrame;
use super::{FrameDisposition, StreamParams, WireAdapter};
use crate::api::{ApiMessage, ProviderEvent, ToolCallDelta, ToolDescriptor};
use crate::utils::auth::add_auth_headers;
use crate::utils::url::join_endpoint;

pub(crate) const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Default)]
pub(crate) struct GeminiAdapter {
    synthesized_calls: u64,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ContentPayload>,
    contents: Vec<ContentPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolPayload<'a>>>,
}

#[derive(Serialize)]
struct ContentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<TextPart>,
}

#[derive(Serialize)]
struct TextPart {
    text: String,
}

#[derive(Serialize)]
struct ToolPayload<'a> {
    #[serde(rename = "functionDeclarations")]
    function_declarations: &'a [ToolDescriptor],
}

fn build_request_body<'a>(
    messages: &[ApiMessage],
    tools: &'a [ToolDescriptor],
) -> GenerateRequest<'a> {
    let mut system_chunks: Vec<&str> = Vec::new();
    let mut contents = Vec::new();
    for message in messages {
        match message.role.as_str() {
            "system" => system_chunks.push(&message.content),
            "assistant" => contents.push(ContentPayload {
                role: Some("model"),
                parts: vec![TextPart {
                    text: message.content.clone(),
                }],
            }),
            _ => contents.push(ContentPayload {
                role: Some("user"),
                parts: vec![TextPart {
                    text: message.content.clone(),
                }],
            }),
        }
    }

    GenerateRequest {
        system_instruction: (!system_chunks.is_empty()).then(|| ContentPayload {
            role: None,
            parts: vec![TextPart {
                text: system_chunks.join("\n\n"),
            }],
        }),
        contents,
        tools: (!tools.is_empty()).then(|| {
            vec![ToolPayload {
                function_declarations: tools,
            }]
        }),
    }
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "functionCall", default)]
    function_call: Option<WireFunctionCall>,
}

#[derive(Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

impl WireAdapter for GeminiAdapter {
    fn build_request(&self, params: &StreamParams) -> reqwest::RequestBuilder {
        let request = build_request_body(&params.messages, &params.tools);
        let url = format!(
            "{}?alt=sse",
            join_endpoint(
                &params.base_url,
                &format!("models/{}:streamGenerateContent", params.model),
            )
        );
        add_auth_headers(
            params.client.post(url).header("Content-Type", "application/json"),
            params.provider,
            &params.api_key,
        )
        .json(&request)
    }

    fn decode(&mut self, frame: &SseFrame) -> FrameDisposition {
        match serde_json::from_str::<GenerateChunk>(&frame.data) {
            Ok(chunk) => {
                let mut events = Vec::new();
                if let Some(content) = chunk
                    .candidates
                    .first()
                    .and_then(|candidate| candidate.content.as_ref())
                {
                    for part in &content.parts {
                        if let Some(text) = &part.text {
                            if !text.is_empty() {
                                events.push(ProviderEvent::TextDelta(text.clone()));
                            }
                        }
                        if let Some(call) = &part.function_call {
                            let id = format!("call_{}", self.synthesized_calls);
                            self.synthesized_calls += 1;
                            events.push(ProviderEvent::ToolCall(ToolCallDelta {
                                id: Some(id),
                                name: Some(call.name.clone()),
                                arguments: Some(call.args.to_string()),
                            }));
                        }
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
