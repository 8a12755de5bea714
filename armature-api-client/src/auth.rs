//! Authentication strategies.

use crate::plugin::{Next, Plugin};
use crate::{ApiClientError, Request, Response, Result};
use async_trait::async_trait;
use base64::Engine;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use std::sync::Arc;

/// Adds credentials to an outgoing request.
pub trait Authentication: Send + Sync {
    /// Return the authenticated request.
    fn authenticate(&self, request: Request) -> Result<Request>;
}

/// `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct Bearer {
    token: String,
}

impl Bearer {
    /// Create a bearer token strategy.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl Authentication for Bearer {
    fn authenticate(&self, request: Request) -> Result<Request> {
        set_header(request, AUTHORIZATION, &format!("Bearer {}", self.token))
    }
}

/// `Authorization: Basic <base64(username:password)>`.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    /// Create a basic auth strategy.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Authentication for BasicAuth {
    fn authenticate(&self, request: Request) -> Result<Request> {
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.username, self.password));
        set_header(request, AUTHORIZATION, &format!("Basic {}", credentials))
    }
}

/// API key sent in a custom header.
#[derive(Debug, Clone)]
pub struct ApiKey {
    header: String,
    key: String,
}

impl ApiKey {
    /// Create an API key strategy.
    pub fn new(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            key: key.into(),
        }
    }
}

impl Authentication for ApiKey {
    fn authenticate(&self, request: Request) -> Result<Request> {
        let name = HeaderName::from_bytes(self.header.as_bytes())
            .map_err(|e| ApiClientError::Authentication(e.to_string()))?;
        set_header(request, name, &self.key)
    }
}

/// Credential sent as a query parameter (e.g. `?appid=...`).
#[derive(Debug, Clone)]
pub struct QueryParam {
    name: String,
    value: String,
}

impl QueryParam {
    /// Create a query parameter strategy.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Authentication for QueryParam {
    fn authenticate(&self, mut request: Request) -> Result<Request> {
        let existing: Vec<(String, String)> = request
            .url()
            .query_pairs()
            .filter(|(k, _)| k != self.name.as_str())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        request
            .url_mut()
            .query_pairs_mut()
            .clear()
            .extend_pairs(existing)
            .append_pair(&self.name, &self.value);
        Ok(request)
    }
}

fn set_header(mut request: Request, name: HeaderName, value: &str) -> Result<Request> {
    let mut value =
        HeaderValue::from_str(value).map_err(|e| ApiClientError::Authentication(e.to_string()))?;
    value.set_sensitive(true);
    request.headers_mut().insert(name, value);
    Ok(request)
}

/// Applies an [`Authentication`] strategy to every request passing through.
#[derive(Clone)]
pub struct AuthenticationPlugin {
    authentication: Arc<dyn Authentication>,
}

impl AuthenticationPlugin {
    /// Create the plugin around a strategy.
    pub fn new(authentication: Arc<dyn Authentication>) -> Self {
        Self { authentication }
    }
}

#[async_trait]
impl Plugin for AuthenticationPlugin {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let request = self.authentication.authenticate(request)?;
        next.run(request).await
    }

    fn name(&self) -> &'static str {
        "authentication"
    }
}
