//! HTTP boundary to the remote auth service.
//!
//! The manager speaks to the service through [`AuthTransport`] so it can be
//! driven without a network. [`HttpTransport`] is the `reqwest`-backed
//! implementation used in production.

use crate::error::{AuthError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Message shown for connection-level failures.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error. Please check your connection.";

/// HTTP method of an auth call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

/// One request to the auth service, relative to its base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path such as `/auth/login`
    pub path: String,
    /// Query parameters, URL-encoded by the transport
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<Value>,
    /// Bearer token for the `Authorization` header
    pub bearer: Option<String>,
}

impl ApiRequest {
    /// `GET path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// `POST path` with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    /// Request with no body, query, or credentials.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a bearer token.
    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Value of a query parameter.
    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Response from the auth service. Bodies that are not JSON arrive as
/// `Value::String`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    /// HTTP status
    pub status: u16,
    /// Parsed body
    pub body: Value,
}

impl ApiReply {
    /// Build a reply.
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport to the remote auth service.
///
/// Implementations return `Err` only for transport failures (connection,
/// timeout). Any HTTP status, including errors, is an `Ok(ApiReply)`.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// Send one request.
    async fn send(&self, request: ApiRequest) -> Result<ApiReply>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for `base_url` with a per-request timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "X-Requested-With",
            HeaderValue::from_static("XMLHttpRequest"),
        );

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| AuthError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_send_error(&self, err: &reqwest::Error) -> AuthError {
        if err.is_timeout() {
            tracing::warn!(timeout_secs = self.timeout.as_secs(), "Auth request timed out");
            AuthError::Transport(format!(
                "Request timed out after {}s. Please try again.",
                self.timeout.as_secs()
            ))
        } else {
            tracing::warn!(error = %err, "Auth request failed");
            AuthError::Transport(NETWORK_ERROR_MESSAGE.to_string())
        }
    }
}

#[async_trait]
impl AuthTransport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiReply> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };

        builder = builder.header(CONTENT_TYPE, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = ?request.method, path = %request.path, "Sending auth request");

        let response = builder.send().await.map_err(|e| self.map_send_error(&e))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.map_send_error(&e))?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        tracing::debug!(path = %request.path, status, "Auth response received");
        Ok(ApiReply { status, body })
    }
}
