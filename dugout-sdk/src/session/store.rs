//! Token persistence across the two storage scopes.
//!
//! The durable scope is a TOML file under the platform config dir
//! (`~/.config/dugout/tokens.toml`), selected by "remember me"; the session
//! scope is process memory and dies with the application. The scopes are
//! mutually exclusive — saving to one clears the other — and both are
//! cleared together on logout.

use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Which scope a credential was persisted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScope {
    /// Survives restart ("remember me").
    Durable,
    /// In-process only.
    Session,
}

/// The persisted credential pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

pub struct TokenStore {
    path: PathBuf,
    session: Mutex<Option<StoredTokens>>,
}

impl TokenStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            path: dir.join("tokens.toml"),
            session: Mutex::new(None),
        }
    }

    /// Platform default: `<config dir>/dugout`.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dugout")
    }

    /// Persist to one scope, clearing the other.
    pub fn save(&self, scope: StorageScope, tokens: &StoredTokens) {
        match scope {
            StorageScope::Durable => {
                *self.session.lock() = None;
                if let Some(dir) = self.path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                match toml::to_string_pretty(tokens) {
                    Ok(s) => {
                        if let Err(e) = std::fs::write(&self.path, s) {
                            tracing::warn!(path = %self.path.display(), error = %e, "can't persist tokens");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "can't serialize tokens"),
                }
            }
            StorageScope::Session => {
                self.remove_file();
                *self.session.lock() = Some(tokens.clone());
            }
        }
    }

    /// Load whichever scope holds a credential, durable first.
    pub fn load(&self) -> Option<(StorageScope, StoredTokens)> {
        if self.path.exists() {
            match std::fs::read_to_string(&self.path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(tokens) => return Some((StorageScope::Durable, tokens)),
                    Err(e) => {
                        tracing::warn!(path = %self.path.display(), error = %e, "bad token file");
                    }
                },
                Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "can't read token file"),
            }
        }
        self.session
            .lock()
            .clone()
            .map(|tokens| (StorageScope::Session, tokens))
    }

    /// Clear both scopes.
    pub fn clear(&self) {
        self.remove_file();
        *self.session.lock() = None;
    }

    fn remove_file(&self) {
        if self.path.exists()
            && let Err(e) = std::fs::remove_file(&self.path)
        {
            tracing::warn!(path = %self.path.display(), error = %e, "can't remove token file");
        }
    }
}
