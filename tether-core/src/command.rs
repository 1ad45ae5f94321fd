//! Control-channel message types.
//!
//! Commands flow toward the daemon, events flow back. Both are JSON
//! objects terminated by a NUL byte on the wire; framing lives in
//! [`EventCodec`](crate::codec::EventCodec).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TetherError;

/// Commands that may be queued while the link is disconnected.
///
/// Only idempotent, always-safe queries belong here: the bounded
/// command buffer exists so a caller can "ask" for state immediately
/// on reconnect, not to replay arbitrary mutations.
pub const BUFFER_SAFE_COMMANDS: &[&str] = &["getState", "getConfig"];

// ── Command ──────────────────────────────────────────────────────

/// A command sent to the daemon over the control socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "cmdName")]
    pub name: String,

    #[serde(rename = "cmdData", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
        }
    }

    pub fn with_data(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data: Some(data),
        }
    }

    /// Whether this command may sit in the disconnected-time buffer.
    pub fn is_buffer_safe(&self) -> bool {
        BUFFER_SAFE_COMMANDS.contains(&self.name.as_str())
    }
}

// ── Event ────────────────────────────────────────────────────────

/// An event received from the daemon over the control socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "eventName")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
        }
    }

    pub fn with_data(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data: Some(data),
        }
    }

    /// Parse one NUL-delimited message body (prefix already stripped).
    pub fn parse(body: &[u8]) -> Result<Self, TetherError> {
        Ok(serde_json::from_slice(body)?)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_wire_field_names() {
        let cmd = Command::with_data("setTorchMode", json!({ "on": true }));
        let text = serde_json::to_string(&cmd).unwrap();
        assert!(text.contains("\"cmdName\":\"setTorchMode\""));
        assert!(text.contains("\"cmdData\""));
    }

    #[test]
    fn command_without_data_omits_field() {
        let cmd = Command::new("getState");
        let text = serde_json::to_string(&cmd).unwrap();
        assert!(!text.contains("cmdData"));
    }

    #[test]
    fn command_roundtrip() {
        let cmd = Command::with_data("configure", json!({ "fps": 30, "res": [640, 480] }));
        let text = serde_json::to_vec(&cmd).unwrap();
        let back: Command = serde_json::from_slice(&text).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn buffer_allow_list() {
        assert!(Command::new("getState").is_buffer_safe());
        assert!(Command::new("getConfig").is_buffer_safe());
        assert!(!Command::new("startRecording").is_buffer_safe());
    }

    #[test]
    fn event_parse() {
        let ev = Event::parse(br#"{"eventName":"stateChange","data":{"state":"idle"}}"#).unwrap();
        assert_eq!(ev.name, "stateChange");
        assert_eq!(ev.data, Some(json!({ "state": "idle" })));
    }

    #[test]
    fn event_parse_rejects_garbage() {
        assert!(Event::parse(b"not json").is_err());
    }
}
