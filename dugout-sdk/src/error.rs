//! Error types for the SDK's three surfaces: HTTP requests, session
//! management, and room sockets.
//!
//! Cancellation is a first-class variant, not a failure: callers are expected
//! to match on [`ApiError::Canceled`] and suppress it (a superseded or
//! navigated-away request is routine, never user-facing).

use thiserror::Error;

/// Errors surfaced by [`crate::api::RequestCoordinator`] and
/// [`crate::http::HttpClient`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request was superseded by a newer call under the same key,
    /// explicitly canceled, or swept by a view change.
    #[error("request canceled")]
    Canceled,

    /// Transport-level failure (DNS, connect, timeout, body read).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response that did not carry a decodable envelope.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The envelope arrived with a non-success status tag.
    #[error("API error ({status}): {message}")]
    Api { status: String, message: String },

    /// Response body (or request body) failed to (de)serialize.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Authorization could not be recovered: the single refresh-and-retry
    /// attempt was spent and the session has been forced to logged-out.
    #[error("session expired")]
    SessionExpired,
}

impl ApiError {
    /// True for the expected, caller-suppressible cancellation outcome.
    pub fn is_canceled(&self) -> bool {
        matches!(self, ApiError::Canceled)
    }
}

/// Errors surfaced by [`crate::session::SessionManager`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// No persisted credential in either storage scope; silent login is not
    /// possible and no session-expired notice is raised.
    #[error("no stored credential")]
    NoStoredCredential,

    /// Transport-level failure talking to the auth endpoints.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The auth endpoint rejected the credential.
    #[error("authentication rejected: {0}")]
    Rejected(String),

    /// Malformed response from an auth endpoint.
    #[error("auth response decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The session has been forced to logged-out.
    #[error("session expired")]
    Expired,
}

/// Errors surfaced by the room socket layer.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A room socket needs a live session for its bearer credential.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The widget registry already holds a live popup for this room.
    #[error("room {0} is already open")]
    RoomAlreadyOpen(u64),

    /// Socket-level failure (connect, read, write).
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// The chat address did not yield a valid TLS server name.
    #[error("invalid server name: {0}")]
    ServerName(String),

    /// A frame failed to (de)serialize.
    #[error("frame encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
