//! Wire messages shared by the HTTP and WebSocket adapters
//!
//! Frames are JSON text, tagged by `type`:
//! - client → server: `{"type":"write","content":"..."}`
//! - server → client: `{"type":"value","content":"...","version":3,...}`
//!   or `{"type":"error","message":"..."}`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wormhole_core::{SharedValue, ValueState};

/// Client-visible view of the shared value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMessage {
    pub content: String,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    pub state: ValueState,
}

impl From<&SharedValue> for ValueMessage {
    fn from(value: &SharedValue) -> Self {
        Self {
            content: value.content.clone(),
            version: value.version,
            updated_at: value.updated_at,
            state: value.state(),
        }
    }
}

impl From<SharedValue> for ValueMessage {
    fn from(value: SharedValue) -> Self {
        let state = value.state();
        Self {
            content: value.content,
            version: value.version,
            updated_at: value.updated_at,
            state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replace the shared value; `""` clears it
    Write { content: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Value(ValueMessage),
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid client message: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ServerMessage {
    pub fn encode(&self) -> wormhole_core::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<&SharedValue> for ServerMessage {
    fn from(value: &SharedValue) -> Self {
        Self::Value(value.into())
    }
}

/// Body of `POST /api/value`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    #[serde(default)]
    pub content: String,
}

/// Query of `GET /api/value/await`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwaitQuery {
    #[serde(default)]
    pub last_seen: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_write() {
        let message = ClientMessage::decode(r#"{"type":"write","content":"123"}"#).unwrap();
        assert_eq!(
            message,
            ClientMessage::Write {
                content: "123".to_string()
            }
        );
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(ClientMessage::decode(r#"{"type":"delete"}"#).is_err());
        assert!(ClientMessage::decode("not json").is_err());
    }

    #[tokio::test]
    async fn test_value_frame_shape() {
        let mut value = SharedValue::initial(tokio::time::Instant::now(), Utc::now());
        value.content = "hi".to_string();
        value.version = 4;

        let text = ServerMessage::from(&value).encode().unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(json["type"], "value");
        assert_eq!(json["content"], "hi");
        assert_eq!(json["version"], 4);
        assert_eq!(json["state"], "set");
        assert!(json["updated_at"].is_string());
    }

    #[test]
    fn test_error_frame_shape() {
        let text = ServerMessage::Error {
            message: "bad".to_string(),
        }
        .encode()
        .unwrap();

        assert_eq!(text, r#"{"type":"error","message":"bad"}"#);
    }
}
