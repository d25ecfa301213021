//! HTTP client for the telemetry backend
//!
//! Implements [`Gateway`] for the relay and the account calls used by the
//! command-line tools.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::session::SessionStore;
use crate::types::{Endpoint, HeartRateSample, Session};

use super::account::{
    extract_error_message, extract_token, LoginRequest, Registration, LOGIN_PATH,
    RECENT_HEART_RATE_PATH, REGISTER_PATH,
};
use super::{Gateway, BULK_HEART_RATE_PATH};

/// HTTP client for the backend API
pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: String,
    sessions: Arc<SessionStore>,
}

impl ApiClient {
    /// Create a client for `config.base_url`, signing requests with the
    /// token held by `sessions`.
    pub fn new(config: &ApiConfig, sessions: Arc<SessionStore>) -> Result<Self> {
        config.validate()?;

        let base_url = config.base_url.trim().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            sessions,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Start a request, attaching the bearer token when logged in.
    ///
    /// The token is read per request so a login takes effect immediately.
    fn request(&self, method: Method, path_and_query: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path_and_query);
        let builder = self.http_client.request(method, &url);

        match self.sessions.token() {
            Some(token) => builder.bearer_auth(token),
            None => {
                tracing::debug!(url = %url, "No token available");
                builder
            }
        }
    }

    /// Send a request and accept only HTTP 200.
    async fn execute(&self, builder: RequestBuilder) -> Result<String> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::OK {
            tracing::debug!(status = %status, "API request successful");
            Ok(body)
        } else {
            tracing::warn!(status = %status, body = %body, "API request failed");
            Err(Error::Api {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// POST a JSON body to `path`
    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<String> {
        self.execute(self.request(Method::POST, path).json(body)).await
    }

    /// Log in and persist the resulting session
    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        let body = self
            .post_json(LOGIN_PATH, &LoginRequest { username, password })
            .await
            .map_err(with_server_message)?;

        self.store_session(username, &body)
    }

    /// Create an account and persist the resulting session
    pub async fn register(&self, registration: &Registration) -> Result<Session> {
        let body = self
            .post_json(REGISTER_PATH, registration)
            .await
            .map_err(with_server_message)?;

        self.store_session(&registration.username, &body)
    }

    /// Forget the stored session
    pub fn logout(&self) -> Result<()> {
        self.sessions.clear()
    }

    /// Heart-rate history between two ISO-8601 instants
    pub async fn recent_heart_rate(&self, from: &str, to: &str) -> Result<Vec<HeartRateSample>> {
        let path = format!(
            "{}?from={}&to={}",
            RECENT_HEART_RATE_PATH,
            urlencoding::encode(from),
            urlencoding::encode(to)
        );

        let body = self.execute(self.request(Method::GET, &path)).await?;
        let samples: Vec<HeartRateSample> = serde_json::from_str(&body)?;
        Ok(samples)
    }

    fn store_session(&self, username: &str, body: &str) -> Result<Session> {
        let token = extract_token(body)
            .ok_or_else(|| Error::Session("response did not contain a token".to_string()))?;

        let session = Session {
            username: username.to_string(),
            token,
        };
        self.sessions.save(session.clone())?;
        tracing::info!(username = %session.username, "Session saved");
        Ok(session)
    }
}

#[async_trait]
impl Gateway for ApiClient {
    async fn send_single(&self, endpoint: Endpoint, payload: serde_json::Value) -> Result<String> {
        self.post_json(endpoint.path(), &payload).await
    }

    async fn send_bulk(&self, samples: Vec<HeartRateSample>) -> Result<String> {
        self.post_json(BULK_HEART_RATE_PATH, &samples).await
    }
}

/// Replace an API error body with the server's `message`, when it sent one.
fn with_server_message(error: Error) -> Error {
    match error {
        Error::Api { status, body } => {
            let body = extract_error_message(&body).unwrap_or(body);
            Error::Api { status, body }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_rejects_invalid_base_url() {
        let config = ApiConfig {
            base_url: "".to_string(),
            ..Default::default()
        };
        assert!(ApiClient::new(&config, Arc::new(SessionStore::in_memory())).is_err());
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let config = ApiConfig {
            base_url: "https://care.example.com/".to_string(),
            ..Default::default()
        };
        let client = ApiClient::new(&config, Arc::new(SessionStore::in_memory())).unwrap();
        assert_eq!(client.base_url(), "https://care.example.com");
    }

    #[test]
    fn test_server_message_replaces_body() {
        let err = with_server_message(Error::Api {
            status: 400,
            body: r#"{"message":"Username taken"}"#.to_string(),
        });
        assert_eq!(err.diagnostic(), "Username taken");

        let err = with_server_message(Error::Api {
            status: 502,
            body: "Bad Gateway".to_string(),
        });
        assert_eq!(err.diagnostic(), "Bad Gateway");
    }
}
