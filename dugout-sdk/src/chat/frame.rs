//! Wire protocol for the room socket.
//!
//! Frames are newline-delimited JSON. Destinations embed the room id:
//! the client subscribes to `/sub/rooms/{id}` and publishes to
//! `/pub/rooms/{id}`; enter/leave are distinct payload kinds from chat
//! messages, so presence and content travel on the same channel without
//! ambiguity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Room-scoped subscribe destination.
pub fn subscribe_destination(room_id: u64) -> String {
    format!("/sub/rooms/{room_id}")
}

/// Room-scoped publish destination.
pub fn publish_destination(room_id: u64) -> String {
    format!("/pub/rooms/{room_id}")
}

/// Frames the client writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientFrame {
    /// Handshake; carries the session's bearer credential.
    Connect { token: String },
    Subscribe { destination: String },
    Send {
        destination: String,
        payload: ChatPayload,
    },
    /// Keepalive.
    Ping,
}

/// Frames the server writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerFrame {
    /// Handshake accepted.
    Connected,
    Message {
        destination: String,
        payload: ChatPayload,
    },
    Error { reason: String },
    Pong,
}

/// What a published payload means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadKind {
    Enter,
    Talk,
    Leave,
}

/// Body shared by every room publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    pub room_id: u64,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl ChatPayload {
    pub fn enter(room_id: u64, sender: &str) -> Self {
        Self {
            kind: PayloadKind::Enter,
            room_id,
            sender: sender.to_string(),
            message: None,
            sent_at: Utc::now(),
        }
    }

    pub fn talk(room_id: u64, sender: &str, message: &str) -> Self {
        Self {
            kind: PayloadKind::Talk,
            room_id,
            sender: sender.to_string(),
            message: Some(message.to_string()),
            sent_at: Utc::now(),
        }
    }

    pub fn leave(room_id: u64, sender: &str) -> Self {
        Self {
            kind: PayloadKind::Leave,
            room_id,
            sender: sender.to_string(),
            message: None,
            sent_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destinations_embed_the_room_id() {
        assert_eq!(subscribe_destination(42), "/sub/rooms/42");
        assert_eq!(publish_destination(42), "/pub/rooms/42");
    }

    #[test]
    fn client_frames_round_trip() {
        let frames = vec![
            ClientFrame::Connect {
                token: "tok".to_string(),
            },
            ClientFrame::Subscribe {
                destination: subscribe_destination(7),
            },
            ClientFrame::Send {
                destination: publish_destination(7),
                payload: ChatPayload::talk(7, "cheer", "nice catch"),
            },
            ClientFrame::Ping,
        ];
        for frame in frames {
            let line = serde_json::to_string(&frame).unwrap();
            let back: ClientFrame = serde_json::from_str(&line).unwrap();
            assert_eq!(back, frame);
        }
    }

    #[test]
    fn talk_payload_wire_shape() {
        let payload = ChatPayload::talk(5, "cheer", "play ball");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "TALK");
        assert_eq!(json["roomId"], 5);
        assert_eq!(json["sender"], "cheer");
        assert_eq!(json["message"], "play ball");
        assert!(json.get("sentAt").is_some());
    }

    #[test]
    fn enter_payload_omits_message() {
        let json = serde_json::to_value(ChatPayload::enter(5, "cheer")).unwrap();
        assert_eq!(json["type"], "ENTER");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn server_frame_tag_is_uppercase() {
        let line = serde_json::to_string(&ServerFrame::Connected).unwrap();
        assert_eq!(line, r#"{"type":"CONNECTED"}"#);
        let err: ServerFrame = serde_json::from_str(r#"{"type":"ERROR","reason":"no"}"#).unwrap();
        assert_eq!(
            err,
            ServerFrame::Error {
                reason: "no".to_string()
            }
        );
    }
}
