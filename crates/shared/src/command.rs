//! The uniform command result returned by every handler.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error detail carried by a failed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

/// Result of dispatching one action, fast path or slow path alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    /// The applied patch, kept for audit and client metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_changes: Option<Value>,
    pub message_to_player: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            state_changes: None,
            message_to_player: message.into(),
            metadata: None,
            error: None,
        }
    }

    pub fn fail(code: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            state_changes: None,
            message_to_player: message.clone(),
            metadata: None,
            error: Some(CommandError {
                code: code.into(),
                message,
            }),
        }
    }

    /// Failure with a hint list (e.g. `available_destinations`).
    pub fn fail_with_hint(
        code: impl Into<String>,
        message: impl Into<String>,
        hint_key: &str,
        hint: Value,
    ) -> Self {
        let mut result = Self::fail(code, message);
        let mut metadata = Map::new();
        metadata.insert(hint_key.to_string(), hint);
        result.metadata = Some(Value::Object(metadata));
        result
    }

    pub fn with_state_changes(mut self, changes: Value) -> Self {
        self.state_changes = Some(changes);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
