//! Tool capability surface.
//!
//! The registry is a hard error boundary: whatever a tool does internally,
//! `execute` returns a JSON value. Unknown names, unparseable arguments, and
//! tool faults all come back as `{"error": …}` objects so the follow-up
//! round can explain the failure to the model instead of failing the turn.

pub mod builtin;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::api::ToolDescriptor;

/// An executable capability offered to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema for the tool's arguments, in the neutral form adapters
    /// serialize into each provider's dialect.
    fn parameters(&self) -> Value;
    async fn execute(&self, arguments: Value) -> Result<Value, String>;
}

type NotificationCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Side channel for transient UI notifications. The hosting UI registers and
/// unregisters the callback; tools only emit into it. Not owned by the turn
/// engine.
#[derive(Clone, Default)]
pub struct NotificationHandle {
    callback: Arc<RwLock<Option<NotificationCallback>>>,
}

impl NotificationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.callback.write() {
            *slot = Some(Arc::new(callback));
        }
    }

    pub fn unregister(&self) {
        if let Ok(mut slot) = self.callback.write() {
            *slot = None;
        }
    }

    /// Deliver a notification; returns false when no UI is listening.
    pub fn notify(&self, message: &str) -> bool {
        let Ok(slot) = self.callback.read() else {
            return false;
        };
        match slot.as_ref() {
            Some(callback) => {
                callback(message);
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in tools.
    pub fn with_builtins(notifications: NotificationHandle) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(builtin::ShowNotificationTool::new(notifications)));
        registry.register(Arc::new(builtin::RememberValueTool::new()));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors offered to providers in the primary round.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: Some(tool.description().to_string()),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Execute a named tool against raw model-supplied argument text.
    /// Never fails: every outcome is a JSON value.
    pub async fn execute(&self, name: &str, raw_arguments: &str) -> Value {
        let Some(tool) = self.tools.iter().find(|tool| tool.name() == name) else {
            return json!({ "error": format!("unknown tool: {name}") });
        };

        let arguments = if raw_arguments.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str::<Value>(raw_arguments) {
                Ok(value) => value,
                Err(error) => {
                    return json!({
                        "error": format!("invalid arguments for {name}: {error}")
                    });
                }
            }
        };

        debug!(tool = name, "executing tool");
        match tool.execute(arguments).await {
            Ok(result) => result,
            Err(error) => json!({ "error": error }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FaultyTool;

    #[async_trait]
    impl Tool for FaultyTool {
        fn name(&self) -> &str {
            "faulty"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        fn parameters(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }

        async fn execute(&self, _arguments: Value) -> Result<Value, String> {
            Err("internal fault".to_string())
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echoes its arguments"
        }

        fn parameters(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(&self, arguments: Value) -> Result<Value, String> {
            Ok(json!({ "echoed": arguments }))
        }
    }

    #[tokio::test]
    async fn unknown_tool_yields_structured_error() {
        let registry = ToolRegistry::new();
        let outcome = registry.execute("missing", "{}").await;
        assert_eq!(
            outcome["error"].as_str(),
            Some("unknown tool: missing")
        );
    }

    #[tokio::test]
    async fn invalid_arguments_yield_structured_error() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let outcome = registry.execute("echo", "{not json").await;
        let error = outcome["error"].as_str().unwrap();
        assert!(error.starts_with("invalid arguments for echo:"));
    }

    #[tokio::test]
    async fn empty_arguments_execute_with_empty_object() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let outcome = registry.execute("echo", "  ").await;
        assert_eq!(outcome["echoed"], json!({}));
    }

    #[tokio::test]
    async fn tool_faults_never_propagate() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FaultyTool));
        let outcome = registry.execute("faulty", "{}").await;
        assert_eq!(outcome["error"].as_str(), Some("internal fault"));
    }

    #[test]
    fn descriptors_expose_registered_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "echo");
        assert!(descriptors[0].description.is_some());
    }

    #[test]
    fn notification_handle_tracks_registration() {
        let handle = NotificationHandle::new();
        assert!(!handle.notify("dropped"));

        let seen = Arc::new(RwLock::new(Vec::<String>::new()));
        let sink = Arc::clone(&seen);
        handle.register(move |message| {
            sink.write().unwrap().push(message.to_string());
        });
        assert!(handle.notify("shown"));

        handle.unregister();
        assert!(!handle.notify("dropped again"));
        assert_eq!(seen.read().unwrap().as_slice(), ["shown".to_string()]);
    }
}
