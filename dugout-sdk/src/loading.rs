//! Reference-counted global loading flag.
//!
//! Every in-flight request registers its de-duplication key here; the
//! derived boolean stays `true` until the last key is released, so a global
//! spinner never flickers off while any request is still pending.

use std::collections::HashSet;

use parking_lot::Mutex;
use tokio::sync::watch;

/// Process-wide set of in-flight request keys.
pub struct LoadingRegistry {
    active: Mutex<HashSet<String>>,
    tx: watch::Sender<bool>,
}

impl Default for LoadingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadingRegistry {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            active: Mutex::new(HashSet::new()),
            tx,
        }
    }

    /// Register a key as in flight.
    pub fn show(&self, key: &str) {
        let mut active = self.active.lock();
        active.insert(key.to_string());
        self.tx.send_replace(!active.is_empty());
    }

    /// Release a key. Releasing a key that is not present is a no-op, which
    /// keeps the count exact when both a settle handler and a cancellation
    /// sweep race to clean up the same request.
    pub fn hide(&self, key: &str) {
        let mut active = self.active.lock();
        active.remove(key);
        self.tx.send_replace(!active.is_empty());
    }

    /// Drop every key at once (view-change sweep).
    pub fn clear(&self) {
        self.active.lock().clear();
        self.tx.send_replace(false);
    }

    /// True while any key is registered.
    pub fn is_loading(&self) -> bool {
        !self.active.lock().is_empty()
    }

    /// Number of in-flight keys.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Observe the derived flag without polling.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refcount_holds_until_last_key_hides() {
        let loading = LoadingRegistry::new();
        loading.show("a");
        loading.show("b");
        loading.hide("a");
        assert!(loading.is_loading());
        loading.hide("b");
        assert!(!loading.is_loading());
    }

    #[test]
    fn hide_is_idempotent() {
        let loading = LoadingRegistry::new();
        loading.show("a");
        loading.hide("a");
        loading.hide("a");
        assert!(!loading.is_loading());
        assert_eq!(loading.active_count(), 0);
    }

    #[test]
    fn duplicate_show_counts_once() {
        let loading = LoadingRegistry::new();
        loading.show("a");
        loading.show("a");
        assert_eq!(loading.active_count(), 1);
        loading.hide("a");
        assert!(!loading.is_loading());
    }

    #[test]
    fn clear_drains_everything() {
        let loading = LoadingRegistry::new();
        loading.show("a");
        loading.show("b");
        loading.clear();
        assert!(!loading.is_loading());
        assert_eq!(loading.active_count(), 0);
    }

    #[test]
    fn watch_reflects_transitions() {
        let loading = LoadingRegistry::new();
        let rx = loading.subscribe();
        assert!(!*rx.borrow());
        loading.show("a");
        assert!(*rx.borrow());
        loading.hide("a");
        assert!(!*rx.borrow());
    }
}
