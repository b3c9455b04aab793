//! Per-room view state: bounded message log and presence roster.
//!
//! Owned by the popup that owns the socket; fed by [`ChatEvent`]s. The log
//! is append-only in arrival order with oldest-first eviction past the cap.

use std::collections::{BTreeSet, VecDeque};

use super::event::{ChatEvent, ChatMessage};

#[derive(Debug)]
pub struct RoomState {
    messages: VecDeque<ChatMessage>,
    members: BTreeSet<String>,
    cap: usize,
}

impl RoomState {
    pub fn new(cap: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            members: BTreeSet::new(),
            cap,
        }
    }

    /// Fold one socket event into the view state.
    pub fn apply(&mut self, event: &ChatEvent) {
        match event {
            ChatEvent::Message(message) => {
                self.messages.push_back(message.clone());
                if self.messages.len() > self.cap {
                    self.messages.pop_front();
                }
            }
            ChatEvent::MemberEntered { nickname } => {
                self.members.insert(nickname.clone());
            }
            ChatEvent::MemberLeft { nickname } => {
                self.members.remove(nickname);
            }
            // The roster is only trustworthy while connected.
            ChatEvent::Reconnecting { .. } | ChatEvent::Disconnected { .. } => {
                self.members.clear();
            }
            ChatEvent::Connected => {}
        }
    }

    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(text: &str) -> ChatEvent {
        ChatEvent::Message(ChatMessage {
            sender: "cheer".to_string(),
            text: text.to_string(),
            sent_at: Utc::now(),
        })
    }

    #[test]
    fn messages_keep_arrival_order() {
        let mut room = RoomState::new(100);
        for text in ["A", "B", "C"] {
            room.apply(&msg(text));
        }
        let texts: Vec<&str> = room.messages().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["A", "B", "C"]);
    }

    #[test]
    fn log_evicts_oldest_past_cap() {
        let mut room = RoomState::new(2);
        for text in ["A", "B", "C"] {
            room.apply(&msg(text));
        }
        let texts: Vec<&str> = room.messages().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["B", "C"]);
    }

    #[test]
    fn roster_follows_enter_and_leave() {
        let mut room = RoomState::new(10);
        room.apply(&ChatEvent::MemberEntered {
            nickname: "a".to_string(),
        });
        room.apply(&ChatEvent::MemberEntered {
            nickname: "b".to_string(),
        });
        room.apply(&ChatEvent::MemberEntered {
            nickname: "a".to_string(),
        });
        assert_eq!(room.member_count(), 2);

        room.apply(&ChatEvent::MemberLeft {
            nickname: "a".to_string(),
        });
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn roster_clears_on_disconnect_but_log_survives() {
        let mut room = RoomState::new(10);
        room.apply(&ChatEvent::MemberEntered {
            nickname: "a".to_string(),
        });
        room.apply(&msg("A"));
        room.apply(&ChatEvent::Disconnected {
            reason: "gone".to_string(),
        });
        assert_eq!(room.member_count(), 0);
        assert_eq!(room.messages().count(), 1);
    }
}
