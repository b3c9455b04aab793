//! The single choke point for outbound API calls.
//!
//! Guarantees, per logical de-duplication key, at most one in-flight request
//! (last writer wins — the newer call cancels the older), registers every
//! call with the [`LoadingRegistry`], and sweeps everything a view issued
//! when the active view changes, so a stale response can never mutate state
//! after navigation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::http::HttpClient;
use crate::loading::LoadingRegistry;

/// Per-call options.
#[derive(Debug, Default, Clone)]
pub struct RequestOptions {
    /// Explicit de-duplication key. When omitted the key is derived from
    /// `method + url`, which collides for distinct logical operations that
    /// share a method and URL — such callers must supply their own key.
    pub key: Option<String>,
}

impl RequestOptions {
    pub fn keyed(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
        }
    }
}

struct Pending {
    seq: u64,
    view_gen: u64,
    cancel: CancellationToken,
}

pub struct RequestCoordinator {
    http: Arc<HttpClient>,
    loading: Arc<LoadingRegistry>,
    pending: Mutex<HashMap<String, Pending>>,
    next_seq: AtomicU64,
    view_gen: AtomicU64,
}

impl RequestCoordinator {
    pub fn new(http: Arc<HttpClient>, loading: Arc<LoadingRegistry>) -> Self {
        Self {
            http,
            loading,
            pending: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            view_gen: AtomicU64::new(0),
        }
    }

    pub fn loading(&self) -> &LoadingRegistry {
        &self.loading
    }

    // ── Convenience verbs ──

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        opts: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(Method::GET, path, None, opts).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOptions,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, Some(body), opts).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOptions,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, path, Some(body), opts).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOptions,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PATCH, path, Some(body), opts).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        opts: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(Method::DELETE, path, None, opts).await
    }

    /// Issue one request under the coordination contract.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        opts: RequestOptions,
    ) -> Result<T, ApiError> {
        let key = opts.key.unwrap_or_else(|| derive_key(&method, path));
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        {
            let mut pending = self.pending.lock();
            let superseded = pending.insert(
                key.clone(),
                Pending {
                    seq,
                    view_gen: self.view_gen.load(Ordering::Relaxed),
                    cancel: cancel.clone(),
                },
            );
            if let Some(old) = superseded {
                // Last writer wins: the stale call settles as Canceled.
                old.cancel.cancel();
                tracing::debug!(key, "superseding in-flight request");
            }
        }
        self.loading.show(&key);

        // Guaranteed cleanup on every settle path, including the caller
        // dropping this future mid-flight.
        let _guard = SettleGuard {
            coordinator: self,
            key: &key,
            seq,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApiError::Canceled),
            result = self.http.request::<T>(method, path, body.as_ref()) => result,
        }
    }

    /// Cancel a specific in-flight call. No-op if nothing is pending under
    /// the key.
    pub fn cancel(&self, key: &str) {
        if let Some(pending) = self.pending.lock().get(key) {
            pending.cancel.cancel();
        }
    }

    /// The active view changed: forcibly cancel every request the old view
    /// issued and drain their loading keys.
    pub fn on_view_change(&self) {
        let old_gen = self.view_gen.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.pending.lock();
        pending.retain(|key, entry| {
            if entry.view_gen <= old_gen {
                entry.cancel.cancel();
                self.loading.hide(key);
                false
            } else {
                true
            }
        });
    }

    /// Number of in-flight requests (test/diagnostic hook).
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn settle(&self, key: &str, seq: u64) {
        let mut pending = self.pending.lock();
        // Only release the slot if it still belongs to this request; a
        // superseding call or a view sweep may already own (or have
        // cleaned) the key.
        if pending.get(key).is_some_and(|entry| entry.seq == seq) {
            pending.remove(key);
            self.loading.hide(key);
        }
    }
}

fn derive_key(method: &Method, path: &str) -> String {
    format!("{method} {path}")
}

struct SettleGuard<'a> {
    coordinator: &'a RequestCoordinator,
    key: &'a str,
    seq: u64,
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.settle(self.key, self.seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SdkConfig;
    use crate::session::SessionManager;

    fn coordinator() -> RequestCoordinator {
        let config = SdkConfig::default();
        let session = Arc::new(SessionManager::new(&config).unwrap());
        let http = Arc::new(HttpClient::new(&config, session).unwrap());
        RequestCoordinator::new(http, Arc::new(LoadingRegistry::new()))
    }

    #[test]
    fn key_derivation_is_method_plus_path() {
        assert_eq!(derive_key(&Method::GET, "/games"), "GET /games");
        assert_eq!(derive_key(&Method::DELETE, "/games/3"), "DELETE /games/3");
    }

    #[tokio::test]
    async fn cancel_without_pending_request_is_a_noop() {
        let api = coordinator();
        api.cancel("nothing-here");
        assert_eq!(api.pending_count(), 0);
    }

    #[tokio::test]
    async fn view_change_with_no_pending_requests_is_a_noop() {
        let api = coordinator();
        api.on_view_change();
        assert!(!api.loading().is_loading());
    }
}
