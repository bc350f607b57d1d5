//! Provider adapters and the streaming request service.
//!
//! Each adapter owns one provider's request envelope, auth headers, and frame
//! decoding; everything downstream consumes only canonical
//! [`ProviderEvent`]s. Adding a provider means adding one adapter module and
//! one [`ProviderKind`] arm; nothing outside this module branches on
//! provider identity.

pub mod sse;

mod anthropic;
mod gemini;
mod openai;

use std::str::FromStr;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ApiMessage, ProviderEvent, ToolDescriptor};
use sse::{SseDecoder, SseFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => openai::DEFAULT_BASE_URL,
            ProviderKind::Anthropic => anthropic::DEFAULT_BASE_URL,
            ProviderKind::Gemini => gemini::DEFAULT_BASE_URL,
        }
    }

    /// Environment variable conventionally holding this provider's API key.
    pub fn api_key_env(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item flowing from a spawned stream task to the turn engine, tagged with
/// the owning turn's request id.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Provider(ProviderEvent),
    /// Terminal transport or provider failure; never emitted as a
    /// `ProviderEvent` and never followed by further items.
    Failed(String),
}

/// Everything one streaming round needs.
pub struct StreamParams {
    pub client: reqwest::Client,
    pub provider: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub messages: Vec<ApiMessage>,
    pub tools: Vec<ToolDescriptor>,
    pub cancel_token: CancellationToken,
    pub request_id: u64,
}

/// What one decoded frame means for the round.
#[derive(Debug)]
pub(crate) enum FrameDisposition {
    Events(Vec<ProviderEvent>),
    Done,
    Fail(String),
    Ignore,
}

pub(crate) trait WireAdapter: Send {
    fn build_request(&self, params: &StreamParams) -> reqwest::RequestBuilder;
    fn decode(&mut self, frame: &SseFrame) -> FrameDisposition;
}

fn adapter_for(kind: ProviderKind) -> Box<dyn WireAdapter> {
    match kind {
        ProviderKind::OpenAi => Box::new(openai::OpenAiAdapter),
        ProviderKind::Anthropic => Box::new(anthropic::AnthropicAdapter::default()),
        ProviderKind::Gemini => Box::new(gemini::GeminiAdapter::default()),
    }
}

/// Spawns streaming rounds and funnels their canonical events into one
/// request-id-tagged channel consumed by the turn engine.
#[derive(Clone)]
pub struct ProviderStreamService {
    tx: mpsc::UnboundedSender<(StreamEvent, u64)>,
}

impl ProviderStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamEvent, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Issue one streaming request. The task ends on upstream completion,
    /// terminal failure, or cancellation; a cancelled round emits nothing
    /// further.
    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let cancel_token = params.cancel_token.clone();
            tokio::select! {
                _ = run_stream(params, &tx) => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }
}

async fn run_stream(params: StreamParams, tx: &mpsc::UnboundedSender<(StreamEvent, u64)>) {
    let request_id = params.request_id;
    let mut adapter = adapter_for(params.provider);
    debug!(
        provider = params.provider.as_str(),
        model = %params.model,
        request_id,
        tools = params.tools.len(),
        "opening provider stream"
    );

    let response = match adapter.build_request(&params).send().await {
        Ok(response) => response,
        Err(error) => {
            let _ = tx.send((
                StreamEvent::Failed(format_api_error(&error.to_string())),
                request_id,
            ));
            return;
        }
    };

    if !response.status().is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        let _ = tx.send((StreamEvent::Failed(format_api_error(&body)), request_id));
        return;
    }

    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = stream.next().await {
        if params.cancel_token.is_cancelled() {
            return;
        }
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(error) => {
                let _ = tx.send((
                    StreamEvent::Failed(format_api_error(&error.to_string())),
                    request_id,
                ));
                return;
            }
        };
        for frame in decoder.feed(&bytes) {
            if dispatch_frame(adapter.as_mut(), &frame, tx, request_id) {
                return;
            }
        }
    }

    // Trailing partial data is parsed once more after transport completion.
    if let Some(frame) = decoder.finish() {
        if dispatch_frame(adapter.as_mut(), &frame, tx, request_id) {
            return;
        }
    }
    let _ = tx.send((StreamEvent::Provider(ProviderEvent::End), request_id));
}

/// Returns true when the round is finished and the task should stop.
fn dispatch_frame(
    adapter: &mut dyn WireAdapter,
    frame: &SseFrame,
    tx: &mpsc::UnboundedSender<(StreamEvent, u64)>,
    request_id: u64,
) -> bool {
    match adapter.decode(frame) {
        FrameDisposition::Events(events) => {
            for event in events {
                let _ = tx.send((StreamEvent::Provider(event), request_id));
            }
            false
        }
        FrameDisposition::Done => {
            let _ = tx.send((StreamEvent::Provider(ProviderEvent::End), request_id));
            true
        }
        FrameDisposition::Fail(message) => {
            let _ = tx.send((StreamEvent::Failed(message), request_id));
            true
        }
        FrameDisposition::Ignore => false,
    }
}

/// Detect an in-stream error envelope (`{"error": …}`) in a payload that did
/// not parse as a regular frame.
pub(crate) fn in_stream_error(payload: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(payload).ok()?;
    value.get("error")?;
    Some(format_api_error(payload))
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        })?;

    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed.trim().to_string())
}

/// Present an upstream error body as a user-facing notice: a one-line summary
/// when the payload carries one, with the raw body fenced underneath.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return format!("API Error: {summary}\n```json\n{pretty_json}\n```");
                }
            }
            return format!("API Error:\n```json\n{pretty_json}\n```");
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{trimmed}\n```")
    } else {
        format!("API Error:\n```\n{trimmed}\n```")
    }
}
