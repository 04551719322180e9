// Session identifiers and display names

use crate::relay::error::RelayError;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::SystemTime;

/// Length of a session identifier in bytes
pub const SESSION_ID_LEN: usize = 16;

/// Longest accepted display name, in characters
pub const MAX_NAME_CHARS: usize = 20;

/// Opaque handle issued by `authorize` and used for every later lookup.
///
/// Rendered as 32 lowercase hex characters on the wire and in logs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    /// Generate a fresh random identifier.
    ///
    /// Collisions are not checked for; with 128 random bits they are
    /// treated as impossible.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Build an identifier from raw bytes of any length.
    ///
    /// Shorter input is zero-padded, longer input is truncated.
    pub fn align(raw: &[u8]) -> Self {
        let mut bytes = [0u8; SESSION_ID_LEN];
        let n = raw.len().min(SESSION_ID_LEN);
        bytes[..n].copy_from_slice(&raw[..n]);
        Self(bytes)
    }

    /// Parse the hex form produced by `to_hex`
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let raw = hex::decode(s.trim())?;
        Ok(Self::align(&raw))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.to_hex())
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SessionId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Check a display name against the length limit (in characters).
pub fn validate_name(name: &str, max_chars: usize) -> Result<(), RelayError> {
    if name.is_empty() {
        return Err(RelayError::InvalidName("name must be not empty".into()));
    }
    let len = name.chars().count();
    if len > max_chars {
        return Err(RelayError::InvalidName(format!(
            "name must be less than or equal {} characters (got {})",
            max_chars, len
        )));
    }
    Ok(())
}

/// An authorized identity
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub created_at: SystemTime,
}

impl Session {
    pub fn new(id: SessionId, name: String) -> Self {
        Self {
            id,
            name,
            created_at: SystemTime::now(),
        }
    }

    /// Seconds since the session was authorized
    pub fn age_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.created_at)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_form() {
        let id = SessionId::generate();
        let hex = id.to_hex();
        assert_eq!(hex.len(), SESSION_ID_LEN * 2);
        assert_eq!(SessionId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn test_align_pads_and_truncates() {
        let short = SessionId::align(&[1, 2, 3]);
        assert_eq!(&short.as_bytes()[..3], &[1, 2, 3]);
        assert!(short.as_bytes()[3..].iter().all(|b| *b == 0));

        let long: Vec<u8> = (0..40).collect();
        let id = SessionId::align(&long);
        assert_eq!(id.as_bytes()[15], 15);
    }

    #[test]
    fn test_bad_hex_rejected() {
        assert!(SessionId::from_hex("not-hex").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("alice", 20).is_ok());
        assert!(validate_name(&"a".repeat(20), 20).is_ok());
        assert!(matches!(
            validate_name("", 20),
            Err(RelayError::InvalidName(_))
        ));
        assert!(matches!(
            validate_name(&"a".repeat(21), 20),
            Err(RelayError::InvalidName(_))
        ));
        // counted in characters, not bytes
        assert!(validate_name(&"é".repeat(20), 20).is_ok());
    }
}
