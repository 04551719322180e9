// Events delivered to connected sessions

use serde::{Deserialize, Serialize};

/// An event queued in a mailbox and written to the session's stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A session opened its stream
    Join { name: String },
    /// A session's stream ended
    Leave { name: String },
    /// A directed message relayed from `name`
    Log { name: String, message: String },
    /// No-op keepalive written when the stream has been idle
    Heartbeat,
}

impl Event {
    pub fn join(name: impl Into<String>) -> Self {
        Event::Join { name: name.into() }
    }

    pub fn leave(name: impl Into<String>) -> Self {
        Event::Leave { name: name.into() }
    }

    pub fn log(name: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Log {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Event::Heartbeat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_string(&Event::log("alice", "hi")).unwrap();
        assert_eq!(json, r#"{"kind":"log","name":"alice","message":"hi"}"#);

        let hb: Event = serde_json::from_str(r#"{"kind":"heartbeat"}"#).unwrap();
        assert!(hb.is_heartbeat());
    }
}
