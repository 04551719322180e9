// Line-delimited JSON frames exchanged with clients

use crate::relay::error::RelayError;
use crate::relay::event::Event;
use serde::{Deserialize, Serialize};

/// Client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Obtain a session id for a display name
    Authorize { name: String },
    /// Turn this connection into the event stream for a session
    Connect { session_id: String },
    /// Relay a message to another session by name
    Say {
        source_name: String,
        target_name: String,
        message: String,
    },
}

/// Server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Authorized { session_id: String },
    /// Stream is open; only `Event` frames follow
    Connected,
    /// Say accepted; `delivered` is false when the target was unavailable
    Ack { delivered: bool },
    Event { event: Event },
    Error { kind: String, message: String },
}

impl Response {
    pub fn error(e: &RelayError) -> Self {
        Response::Error {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Response::Error {
            kind: "bad_request".to_string(),
            message: message.into(),
        }
    }
}

/// Encode a frame as JSON followed by a newline
pub fn to_line<T: Serialize>(frame: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(frame)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decode one line (without the newline)
pub fn from_line<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(line)
}
