//! Frame codec
//!
//! Every frame on the wire is a JSON document with a `type` discriminator
//! and a `payload` whose shape depends on it. Decoding is two-stage so an
//! unrecognized discriminator is distinguishable from a broken document:
//! unknown kinds are a forward-compatibility case, not corruption.

use serde::{Deserialize, Serialize};

use crate::types::UserRef;

/// A delivered chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Conversation the message belongs to
    pub conversation_id: i64,
    /// Sender snapshot
    pub author: UserRef,
    /// Message body
    pub content: String,
}

/// A decoded inbound event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum SocketEvent {
    /// A peer connected
    #[serde(rename = "CONNEXION")]
    Presence(UserRef),
    /// A message was delivered
    #[serde(rename = "USER_MESSAGE")]
    ChatMessage(ChatMessage),
}

impl SocketEvent {
    /// The wire discriminator for this event.
    pub fn kind(&self) -> &'static str {
        match self {
            SocketEvent::Presence(_) => "CONNEXION",
            SocketEvent::ChatMessage(_) => "USER_MESSAGE",
        }
    }
}

/// An outbound frame, constructed by the consumer and serialized on send.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum OutgoingMessage {
    #[serde(rename = "USER_MESSAGE")]
    UserMessage {
        /// Target conversation; omitted from the wire when absent
        #[serde(rename = "conversationId", skip_serializing_if = "Option::is_none")]
        conversation_id: Option<i64>,
        content: String,
    },
}

impl OutgoingMessage {
    /// A message without a conversation scope.
    pub fn text(content: impl Into<String>) -> Self {
        Self::UserMessage {
            conversation_id: None,
            content: content.into(),
        }
    }

    /// A message scoped to a conversation.
    pub fn in_conversation(conversation_id: i64, content: impl Into<String>) -> Self {
        Self::UserMessage {
            conversation_id: Some(conversation_id),
            content: content.into(),
        }
    }
}

/// Why an inbound frame could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The document or its payload did not parse
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Valid envelope, unrecognized discriminator
    #[error("unknown event kind: {0}")]
    UnknownKind(String),
}

/// Outer envelope, parsed before the payload is interpreted.
#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Decode one inbound text frame.
///
/// A parse failure at either stage is [`DecodeError::Malformed`]; a valid
/// envelope whose `type` is not recognized is [`DecodeError::UnknownKind`].
/// Neither is fatal to the connection; the caller logs and drops them.
pub fn decode_frame(text: &str) -> Result<SocketEvent, DecodeError> {
    let raw: RawFrame = serde_json::from_str(text)?;
    match raw.kind.as_str() {
        "CONNEXION" => Ok(SocketEvent::Presence(serde_json::from_value(raw.payload)?)),
        "USER_MESSAGE" => Ok(SocketEvent::ChatMessage(serde_json::from_value(
            raw.payload,
        )?)),
        other => Err(DecodeError::UnknownKind(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PresenceState;

    #[test]
    fn decodes_user_message_frame() {
        let text = r#"{"type":"USER_MESSAGE","payload":{"conversationId":1,"author":{"id":2,"username":"bob"},"content":"yo"}}"#;
        let event = decode_frame(text).unwrap();
        match event {
            SocketEvent::ChatMessage(msg) => {
                assert_eq!(msg.conversation_id, 1);
                assert_eq!(msg.author.username, "bob");
                assert_eq!(msg.content, "yo");
            }
            other => panic!("expected ChatMessage, got {other:?}"),
        }
    }

    #[test]
    fn decodes_presence_frame() {
        let text =
            r#"{"type":"CONNEXION","payload":{"id":5,"username":"alice","status":"online"}}"#;
        let event = decode_frame(text).unwrap();
        match event {
            SocketEvent::Presence(user) => {
                assert_eq!(user.id, 5);
                assert_eq!(user.status, Some(PresenceState::Online));
            }
            other => panic!("expected Presence, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_not_malformed() {
        let err = decode_frame(r#"{"type":"PING"}"#).unwrap_err();
        match err {
            DecodeError::UnknownKind(kind) => assert_eq!(kind, "PING"),
            other => panic!("expected UnknownKind, got {other:?}"),
        }
    }

    #[test]
    fn broken_document_is_malformed() {
        assert!(matches!(
            decode_frame("not json at all"),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn wrong_payload_shape_is_malformed() {
        // Valid envelope and known kind, but the payload is missing fields.
        let text = r#"{"type":"USER_MESSAGE","payload":{"content":"hi"}}"#;
        assert!(matches!(
            decode_frame(text),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn encodes_unscoped_message_without_conversation_id() {
        let json = serde_json::to_value(OutgoingMessage::text("hi")).unwrap();
        assert_eq!(json["type"], "USER_MESSAGE");
        assert_eq!(json["payload"]["content"], "hi");
        assert!(json["payload"].get("conversationId").is_none());
    }

    #[test]
    fn encodes_scoped_message_with_conversation_id() {
        let json = serde_json::to_value(OutgoingMessage::in_conversation(3, "hello")).unwrap();
        assert_eq!(json["payload"]["conversationId"], 3);
        assert_eq!(json["payload"]["content"], "hello");
    }

    #[test]
    fn event_serializes_back_to_wire_shape() {
        let event = SocketEvent::Presence(UserRef::new(1, "eve"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CONNEXION");
        assert_eq!(json["payload"]["username"], "eve");
    }
}
