//! Realtime wire envelopes
//!
//! Every frame on the chat channel is a tagged JSON object. Inbound frames
//! are dispatched by tag; unknown tags are logged and ignored by the caller.

use serde::{Deserialize, Serialize};

/// Message subtype: normal chat content versus membership churn. Join/leave
/// frames arrive on the same channel but are never rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Chat,
    Join,
    Leave,
}

impl MessageKind {
    /// Whether this subtype is shown to the user
    pub fn is_displayable(&self) -> bool {
        matches!(self, MessageKind::Chat)
    }
}

/// One chat message payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub message_type: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
}

/// Inbound envelope, dispatched by the `type` tag.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// Chat content (or membership churn, per [`MessageKind`])
    Message(ChatMessage),
    /// Authoritative presence snapshot: replaces local state wholesale
    ParticipantCount { count: u64 },
    /// Authoritative roster snapshot
    UserList { users: Vec<String> },
    /// Server-side error signal; surfaced to the user, no state transition
    Error { message: String },
}

/// Outbound envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Fire-and-forget chat message
    Message { content: String },
    /// Request a presence snapshot
    ParticipantCount,
}

impl Outbound {
    /// Encode for the wire. The envelope shapes are infallible to serialize.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_tag() {
        let frame = r#"{"type":"message","sender":"dana","content":"hi","messageType":"chat"}"#;
        let inbound: Inbound = serde_json::from_str(frame).unwrap();
        match inbound {
            Inbound::Message(m) => {
                assert_eq!(m.content, "hi");
                assert!(m.message_type.is_displayable());
            }
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn test_message_type_defaults_to_chat() {
        let frame = r#"{"type":"message","content":"hi"}"#;
        let inbound: Inbound = serde_json::from_str(frame).unwrap();
        assert!(matches!(
            inbound,
            Inbound::Message(ChatMessage {
                message_type: MessageKind::Chat,
                ..
            })
        ));
    }

    #[test]
    fn test_membership_churn_not_displayable() {
        let frame = r#"{"type":"message","content":"dana joined","messageType":"join"}"#;
        let Inbound::Message(m) = serde_json::from_str::<Inbound>(frame).unwrap() else {
            panic!("expected message envelope");
        };
        assert!(!m.message_type.is_displayable());
    }

    #[test]
    fn test_presence_snapshot() {
        let frame = r#"{"type":"participant_count","count":42}"#;
        let inbound: Inbound = serde_json::from_str(frame).unwrap();
        assert_eq!(inbound, Inbound::ParticipantCount { count: 42 });
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let frame = r#"{"type":"raffle_spin","winner":"dana"}"#;
        assert!(serde_json::from_str::<Inbound>(frame).is_err());
    }

    #[test]
    fn test_outbound_encoding() {
        let out = Outbound::Message {
            content: "hello".to_string(),
        };
        assert_eq!(out.encode(), r#"{"type":"message","content":"hello"}"#);
        assert_eq!(
            Outbound::ParticipantCount.encode(),
            r#"{"type":"participant_count"}"#
        );
    }
}
