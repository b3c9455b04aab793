//! Shared HTTP client with the retry-once-on-401 interceptor policy.
//!
//! Every REST call in the application flows through one `reqwest::Client`.
//! A 401 response triggers at most one silent token refresh followed by one
//! re-issue of the original request with the new bearer token; a second 401
//! (or a failed refresh) forces the session to logged-out. Requests to the
//! reissue endpoint itself are exempt, so the refresh path can never loop.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::SdkConfig;
use crate::envelope;
use crate::error::ApiError;
use crate::session::SessionManager;

pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    reissue_path: String,
    session: Arc<SessionManager>,
}

impl HttpClient {
    pub fn new(config: &SdkConfig, session: Arc<SessionManager>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            reissue_path: config.reissue_path.clone(),
            session,
        })
    }

    /// Join a request path onto the base URL. Absolute URLs pass through.
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn is_reissue_endpoint(&self, path: &str) -> bool {
        path.trim_start_matches('/') == self.reissue_path.trim_start_matches('/')
            || path.ends_with(&self.reissue_path)
    }

    /// Send one request under the interceptor policy and decode the
    /// response envelope into its payload.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        // One-shot retry flag for this original request.
        let mut retried = false;
        loop {
            let mut builder = self.http.request(method.clone(), &url);
            if let Some(token) = self.session.access_token() {
                builder = builder.bearer_auth(token);
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }
            let resp = builder.send().await?;
            let status = resp.status();

            if status == StatusCode::UNAUTHORIZED && !self.is_reissue_endpoint(path) {
                if !retried {
                    retried = true;
                    tracing::debug!(%method, path, "401; attempting silent refresh and retry");
                    self.session
                        .refresh_access_token()
                        .await
                        .map_err(|_| ApiError::SessionExpired)?;
                    continue;
                }
                // The single retry was spent and the server still says no.
                tracing::warn!(%method, path, "401 after token refresh; giving up");
                self.session
                    .expire_session("authorization failed after token refresh");
                return Err(ApiError::SessionExpired);
            }

            let text = resp.text().await?;
            if !status.is_success() {
                return Err(ApiError::Http {
                    status: status.as_u16(),
                    body: text,
                });
            }
            return envelope::decode(&text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpClient {
        let config = SdkConfig {
            api_base_url: "http://127.0.0.1:9/api/".to_string(),
            ..SdkConfig::default()
        };
        let session = Arc::new(SessionManager::new(&config).unwrap());
        HttpClient::new(&config, session).unwrap()
    }

    #[test]
    fn url_joining_normalizes_slashes() {
        let http = client();
        assert_eq!(http.url("/games/7"), "http://127.0.0.1:9/api/games/7");
        assert_eq!(http.url("games/7"), "http://127.0.0.1:9/api/games/7");
        assert_eq!(http.url("https://cdn.example.com/x"), "https://cdn.example.com/x");
    }

    #[test]
    fn reissue_endpoint_is_recognized_with_or_without_leading_slash() {
        let http = client();
        assert!(http.is_reissue_endpoint("/auth/reissue"));
        assert!(http.is_reissue_endpoint("auth/reissue"));
        assert!(!http.is_reissue_endpoint("/auth/login"));
    }
}
