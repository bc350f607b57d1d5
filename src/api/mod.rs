//! Provider-agnostic payload types shared by the adapters and the turn
//! engine.
//!
//! Every provider adapter decodes its own wire dialect into the canonical
//! [`ProviderEvent`] sequence defined here; nothing outside `provider/` ever
//! sees provider-native frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One role-tagged message in an outbound request history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: String,
}

impl ApiMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// A tool offered to the model, in neutral form. Each adapter serializes
/// this into its provider's function/tool schema dialect.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

/// One fragment of a tool invocation as it arrives off the wire. Providers
/// split id, name, and argument text across frames; only the accumulator
/// reassembles them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Canonical unit of streamed model output. This is the contract every
/// provider adapter must produce regardless of upstream wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    TextDelta(String),
    ToolCall(ToolCallDelta),
    End,
}
