//! Shared data types
//!
//! Immutable snapshots of users and conversations as the server reports
//! them. These carry no lifecycle of their own; they are embedded in
//! socket events or returned by the REST roster endpoints.

use serde::{Deserialize, Serialize};

/// Presence state of a user as reported by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Away,
    Offline,
}

/// A user snapshot embedded in events and roster lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    /// Server-assigned user ID
    pub id: i64,
    /// Display name
    pub username: String,
    /// Presence, when the server includes it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PresenceState>,
}

impl UserRef {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            status: None,
        }
    }
}

/// A conversation as returned by the roster endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Server-assigned conversation ID
    pub id: i64,
    /// Optional display name (direct conversations usually have none)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Members of the conversation
    #[serde(default)]
    pub participants: Vec<UserRef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_state_uses_lowercase_wire_names() {
        assert_eq!(
            serde_json::to_string(&PresenceState::Online).unwrap(),
            "\"online\""
        );
        let parsed: PresenceState = serde_json::from_str("\"away\"").unwrap();
        assert_eq!(parsed, PresenceState::Away);
    }

    #[test]
    fn user_ref_tolerates_missing_status() {
        let user: UserRef = serde_json::from_str(r#"{"id":2,"username":"bob"}"#).unwrap();
        assert_eq!(user.id, 2);
        assert_eq!(user.username, "bob");
        assert!(user.status.is_none());
    }

    #[test]
    fn conversation_defaults_empty_participants() {
        let conv: Conversation = serde_json::from_str(r#"{"id":7}"#).unwrap();
        assert_eq!(conv.id, 7);
        assert!(conv.name.is_none());
        assert!(conv.participants.is_empty());
    }
}
