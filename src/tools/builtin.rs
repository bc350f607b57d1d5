//! Built-in tools.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::{NotificationHandle, Tool};

/// Shows a transient notification through the host-registered sink.
pub struct ShowNotificationTool {
    notifications: NotificationHandle,
}

impl ShowNotificationTool {
    pub fn new(notifications: NotificationHandle) -> Self {
        Self { notifications }
    }
}

#[async_trait]
impl Tool for ShowNotificationTool {
    fn name(&self) -> &str {
        "show_notification"
    }

    fn description(&self) -> &str {
        "Display a short transient notification to the user."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Text to display"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, String> {
        let message = arguments
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing required argument: message".to_string())?;

        let delivered = self.notifications.notify(message);
        Ok(json!({ "shown": delivered }))
    }
}

/// In-memory key/value scratchpad the model can write to and read back
/// within a session. Durable storage belongs to the host, not this tool.
pub struct RememberValueTool {
    values: Mutex<HashMap<String, String>>,
}

impl RememberValueTool {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for RememberValueTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for RememberValueTool {
    fn name(&self) -> &str {
        "remember_value"
    }

    fn description(&self) -> &str {
        "Store a key/value pair for later recall, or read a stored key back."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "Name of the value"
                },
                "value": {
                    "type": "string",
                    "description": "Value to store; omit to read the key back"
                }
            },
            "required": ["key"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, String> {
        let key = arguments
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing required argument: key".to_string())?;

        let mut values = self.values.lock().await;
        match arguments.get("value").and_then(Value::as_str) {
            Some(value) => {
                values.insert(key.to_string(), value.to_string());
                Ok(json!({ "stored": key }))
            }
            None => match values.get(key) {
                Some(value) => Ok(json!({ "key": key, "value": value })),
                None => Ok(json!({ "key": key, "value": Value::Null })),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, RwLock};

    #[tokio::test]
    async fn notification_tool_reports_delivery() {
        let handle = NotificationHandle::new();
        let tool = ShowNotificationTool::new(handle.clone());

        let outcome = tool.execute(json!({ "message": "hi" })).await.unwrap();
        assert_eq!(outcome["shown"], json!(false));

        let seen = Arc::new(RwLock::new(Vec::<String>::new()));
        let sink = Arc::clone(&seen);
        handle.register(move |message| sink.write().unwrap().push(message.to_string()));

        let outcome = tool.execute(json!({ "message": "hi" })).await.unwrap();
        assert_eq!(outcome["shown"], json!(true));
        assert_eq!(seen.read().unwrap().as_slice(), ["hi".to_string()]);
    }

    #[tokio::test]
    async fn notification_tool_requires_message() {
        let tool = ShowNotificationTool::new(NotificationHandle::new());
        let error = tool.execute(json!({})).await.unwrap_err();
        assert!(error.contains("message"));
    }

    #[tokio::test]
    async fn remember_value_round_trips() {
        let tool = RememberValueTool::new();
        let stored = tool
            .execute(json!({ "key": "color", "value": "teal" }))
            .await
            .unwrap();
        assert_eq!(stored["stored"], json!("color"));

        let read = tool.execute(json!({ "key": "color" })).await.unwrap();
        assert_eq!(read["value"], json!("teal"));

        let missing = tool.execute(json!({ "key": "absent" })).await.unwrap();
        assert_eq!(missing["value"], Value::Null);
    }
}
