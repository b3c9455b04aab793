//! Registry of currently-open chat popups.
//!
//! Keyed by room id: opening a room that is already open overwrites its
//! metadata instead of duplicating it, which is what lets the presentation
//! layer enforce at-most-one live connection per room simply by keying its
//! rendering on the id. Leader resolution completes asynchronously, so
//! `set_leader_nickname` patches existing entries only — a resolution that
//! lands after the popup closed is dropped.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tokio::sync::watch;

/// Display metadata for one open popup.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedRoom {
    pub room_name: String,
    pub leader_nickname: Option<String>,
    pub member_count: Option<u32>,
}

pub struct ChatWidgetRegistry {
    rooms: Mutex<BTreeMap<u64, OpenedRoom>>,
    tx: watch::Sender<BTreeMap<u64, OpenedRoom>>,
}

impl Default for ChatWidgetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatWidgetRegistry {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BTreeMap::new());
        Self {
            rooms: Mutex::new(BTreeMap::new()),
            tx,
        }
    }

    /// Insert or overwrite the entry for `room_id`.
    pub fn open_popup(
        &self,
        room_id: u64,
        room_name: &str,
        member_count: Option<u32>,
        leader_nickname: Option<String>,
    ) {
        let mut rooms = self.rooms.lock();
        rooms.insert(
            room_id,
            OpenedRoom {
                room_name: room_name.to_string(),
                leader_nickname,
                member_count,
            },
        );
        self.tx.send_replace(rooms.clone());
    }

    /// Remove the entry. Returns whether it existed.
    pub fn close_popup(&self, room_id: u64) -> bool {
        let mut rooms = self.rooms.lock();
        let removed = rooms.remove(&room_id).is_some();
        if removed {
            self.tx.send_replace(rooms.clone());
        }
        removed
    }

    /// Patch an existing entry's leader. No-op if the room is not open.
    /// Returns whether a patch was applied.
    pub fn set_leader_nickname(&self, room_id: u64, nickname: &str) -> bool {
        let mut rooms = self.rooms.lock();
        match rooms.get_mut(&room_id) {
            Some(room) => {
                room.leader_nickname = Some(nickname.to_string());
                self.tx.send_replace(rooms.clone());
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self, room_id: u64) -> bool {
        self.rooms.lock().contains_key(&room_id)
    }

    pub fn open_count(&self) -> usize {
        self.rooms.lock().len()
    }

    pub fn get(&self, room_id: u64) -> Option<OpenedRoom> {
        self.rooms.lock().get(&room_id).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<u64, OpenedRoom> {
        self.rooms.lock().clone()
    }

    /// Observe the open-room map without polling.
    pub fn subscribe(&self) -> watch::Receiver<BTreeMap<u64, OpenedRoom>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopening_a_room_overwrites_instead_of_duplicating() {
        let registry = ChatWidgetRegistry::new();
        registry.open_popup(5, "Room", Some(3), None);
        registry.open_popup(5, "Room", Some(4), None);
        assert_eq!(registry.open_count(), 1);
        assert_eq!(registry.get(5).unwrap().member_count, Some(4));
    }

    #[test]
    fn leader_patch_applies_to_open_rooms_only() {
        let registry = ChatWidgetRegistry::new();
        registry.open_popup(5, "Room", None, None);
        assert!(registry.set_leader_nickname(5, "captain"));
        assert_eq!(
            registry.get(5).unwrap().leader_nickname.as_deref(),
            Some("captain")
        );

        // Resolution landing after close is dropped.
        registry.close_popup(5);
        assert!(!registry.set_leader_nickname(5, "captain"));
        assert!(registry.get(5).is_none());
    }

    #[test]
    fn close_is_idempotent() {
        let registry = ChatWidgetRegistry::new();
        registry.open_popup(5, "Room", None, None);
        assert!(registry.close_popup(5));
        assert!(!registry.close_popup(5));
    }

    #[test]
    fn watch_tracks_open_and_close() {
        let registry = ChatWidgetRegistry::new();
        let rx = registry.subscribe();
        registry.open_popup(1, "A", None, None);
        registry.open_popup(2, "B", None, None);
        assert_eq!(rx.borrow().len(), 2);
        registry.close_popup(1);
        assert_eq!(rx.borrow().len(), 1);
    }
}
