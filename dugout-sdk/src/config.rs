//! SDK configuration.
//!
//! One [`SdkConfig`] is built at application start and handed to
//! [`crate::DugoutClient::new`]. Defaults target a local development stack.

use std::path::PathBuf;
use std::time::Duration;

/// Default REST base URL.
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080/api";
/// Default chat socket address (host:port).
pub const DEFAULT_CHAT_ADDR: &str = "127.0.0.1:9190";

/// Top-level SDK configuration.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// REST base URL, joined with request paths.
    pub api_base_url: String,
    /// Token reissue endpoint path. Requests to this path are exempt from
    /// the retry-on-401 policy.
    pub reissue_path: String,
    /// Server-side logout notification path (best-effort).
    pub logout_path: String,
    /// Per-request timeout applied to the shared HTTP client.
    pub request_timeout: Duration,
    /// Delay between the session-expired notice and the redirect event,
    /// so the notice can render before navigation.
    pub expiry_grace: Duration,
    /// Override for the durable token storage directory. `None` uses
    /// the platform config dir.
    pub storage_dir: Option<PathBuf>,
    /// Room socket tuning.
    pub chat: ChatConfig,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            reissue_path: "/auth/reissue".to_string(),
            logout_path: "/auth/logout".to_string(),
            request_timeout: Duration::from_secs(10),
            expiry_grace: Duration::from_millis(1500),
            storage_dir: None,
            chat: ChatConfig::default(),
        }
    }
}

/// Room socket configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Chat server address (host:port).
    pub addr: String,
    /// Use TLS for the room socket.
    pub tls: bool,
    /// Idle interval after which the client publishes a ping frame.
    pub heartbeat_interval: Duration,
    /// Server silence beyond this window is treated as a disconnect.
    pub silence_timeout: Duration,
    /// Fixed delay before a reconnect attempt after an unexpected disconnect.
    pub reconnect_delay: Duration,
    /// Cap on each room's retained message log.
    pub room_log_cap: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_CHAT_ADDR.to_string(),
            tls: false,
            heartbeat_interval: Duration::from_secs(15),
            silence_timeout: Duration::from_secs(45),
            reconnect_delay: Duration::from_secs(3),
            room_log_cap: 500,
        }
    }
}
