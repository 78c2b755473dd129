//! Newtype IDs.
//!
//! A [`SessionId`] is supplied by the caller and is opaque to the
//! orchestrator. A [`TalkbackId`] is minted per opened session (UUID v7,
//! time-ordered) so two consecutive talkbacks to the same camera can be told
//! apart in the logs.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the remote endpoint a talkback session targets.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of one talkback open/close cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TalkbackId(Uuid);

impl TalkbackId {
    /// Mint a new time-ordered ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TalkbackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TalkbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tb_{}", self.0.simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_display_is_raw_value() {
        let id = SessionId::new("cam-42");
        assert_eq!(id.to_string(), "cam-42");
        assert_eq!(id.as_str(), "cam-42");
    }

    #[test]
    fn session_id_from_conversions() {
        assert_eq!(SessionId::from("a"), SessionId::from("a".to_string()));
    }

    #[test]
    fn blank_session_id() {
        assert!(SessionId::new("  ").is_blank());
        assert!(SessionId::new("").is_blank());
        assert!(!SessionId::new("x").is_blank());
    }

    #[test]
    fn session_id_serializes_transparently() {
        let json = serde_json::to_string(&SessionId::new("cam")).unwrap();
        assert_eq!(json, "\"cam\"");
    }

    #[test]
    fn talkback_ids_are_unique_and_prefixed() {
        let a = TalkbackId::new();
        let b = TalkbackId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("tb_"));
        assert_eq!(a.to_string().len(), 3 + 32);
    }
}
