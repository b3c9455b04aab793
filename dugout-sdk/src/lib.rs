//! Client coordination core for Dugout — a ticket-marketplace and
//! watch-crew chat application.
//!
//! This crate is the layer between the presentation code and the backend:
//! every REST call, the authentication session, and the per-room chat
//! sockets flow through it. Page and popup code consume plain return values
//! and `watch`/`mpsc` channels; they never talk to the transport directly.
//!
//! ## Request coordination
//!
//! [`api::RequestCoordinator`] is the single choke point for HTTP. Each call
//! carries a de-duplication key (derived from method + path unless supplied
//! explicitly); a newer call under the same key cancels the older one, and a
//! view change sweeps everything the old view still had in flight. The
//! [`loading::LoadingRegistry`] refcounts those keys into one global
//! loading flag.
//!
//! ## Session
//!
//! [`session::SessionManager`] owns the token and profile, persists the
//! credential to a durable or session-scoped store ("remember me"), and
//! drives silent refresh. [`http::HttpClient`] retries a 401 exactly once
//! after a refresh; the reissue endpoint itself is exempt so the policy can
//! never loop.
//!
//! ## Chat
//!
//! [`chat::open_room`] gives each popup its own socket with subscribe,
//! join/leave publication, heartbeat, and fixed-delay reconnect;
//! [`chat::ChatWidgetRegistry`] tracks which rooms are popped open so
//! multiple popups render without prop-drilling.
//!
//! Construct one [`DugoutClient`] at application start and pass it by
//! reference; all shared state lives behind its command methods.

pub mod api;
pub mod chat;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod loading;
pub mod session;

use std::sync::Arc;

use tokio::sync::mpsc;

pub use api::{RequestCoordinator, RequestOptions};
pub use chat::{ChatEvent, ChatMessage, ChatWidgetRegistry, OpenedRoom, RoomHandle, RoomState};
pub use config::{ChatConfig, SdkConfig};
pub use error::{ApiError, ChatError, SessionError};
pub use loading::LoadingRegistry;
pub use session::{SessionEvent, SessionManager, SessionSnapshot, SessionState, UserProfile};

/// The application-wide client: one instance, built at startup.
pub struct DugoutClient {
    config: SdkConfig,
    session: Arc<SessionManager>,
    api: RequestCoordinator,
    loading: Arc<LoadingRegistry>,
    widgets: ChatWidgetRegistry,
}

impl DugoutClient {
    pub fn new(config: SdkConfig) -> Result<Arc<Self>, ApiError> {
        let loading = Arc::new(LoadingRegistry::new());
        let session = Arc::new(SessionManager::new(&config).map_err(ApiError::Network)?);
        let http = Arc::new(http::HttpClient::new(&config, session.clone())?);
        let api = RequestCoordinator::new(http, loading.clone());
        Ok(Arc::new(Self {
            config,
            session,
            api,
            loading,
            widgets: ChatWidgetRegistry::new(),
        }))
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn api(&self) -> &RequestCoordinator {
        &self.api
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn loading(&self) -> &LoadingRegistry {
        &self.loading
    }

    pub fn widgets(&self) -> &ChatWidgetRegistry {
        &self.widgets
    }

    /// Open a chat popup for a room: registers it with the widget registry
    /// and spins up its socket. Refuses a room that is already open — the
    /// registry is the source of truth for "is this room open", which keeps
    /// connections at one per room.
    pub fn open_room(
        &self,
        room_id: u64,
        room_name: &str,
        member_count: Option<u32>,
    ) -> Result<(RoomHandle, mpsc::Receiver<ChatEvent>), ChatError> {
        if self.widgets.is_open(room_id) {
            return Err(ChatError::RoomAlreadyOpen(room_id));
        }
        let opened = chat::open_room(self.config.chat.clone(), room_id, &self.session)?;
        self.widgets
            .open_popup(room_id, room_name, member_count, None);
        Ok(opened)
    }

    /// Close a popup's registry entry. The socket itself is torn down by
    /// dropping the [`RoomHandle`] the popup owns.
    pub fn close_room(&self, room_id: u64) {
        self.widgets.close_popup(room_id);
    }
}
