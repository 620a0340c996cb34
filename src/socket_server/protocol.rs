//! Push daemon protocol message types
//!
//! Control messages are JSON objects tagged by `type`. Change envelopes are
//! pushed as bare JSON arrays and never go through these types.

use serde::{Deserialize, Serialize};

/// Client-to-server message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ping to check connection
    Ping,
    /// Ask for the connection info again
    Info,
    /// Relay a message to every other connection
    SendMessage {
        #[serde(default)]
        message: serde_json::Value,
    },
}

/// Server-to-client message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection registered
    Connected { connection_id: String },
    /// Pong response
    Pong,
    /// Message relayed from another connection
    Message {
        from: String,
        message: serde_json::Value,
    },
    /// Relay finished
    Relayed { delivered: usize },
    /// Error response
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Every variant is a plain object with string keys
        serde_json::to_string(self).unwrap_or_else(|_| String::from(r#"{"type":"error"}"#))
    }
}

/// Whether a text frame is a change envelope rather than a control message
pub fn is_envelope(text: &str) -> bool {
    text.trim_start().starts_with('[')
}
