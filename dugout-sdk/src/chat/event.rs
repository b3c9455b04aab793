//! Events a room socket emits to its popup.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// One chat message as delivered to the popup.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// Events emitted by a room socket for the popup to consume.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Handshake, subscription, and join publication completed.
    Connected,

    /// Transport lost; a reconnect attempt follows after the fixed delay.
    Reconnecting { delay: Duration },

    /// Someone entered the room (including our own join echo).
    MemberEntered { nickname: String },

    /// Someone left the room.
    MemberLeft { nickname: String },

    /// A chat message, in arrival order.
    Message(ChatMessage),

    /// The socket is done: explicit close, teardown, or a terminal error.
    Disconnected { reason: String },
}
