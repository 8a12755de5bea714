//! Transport capability and the default reqwest transport.

use async_trait::async_trait;
use tracing::debug;

use crate::{ApiClientError, Request, Response, Result, TransportConfig};

/// Sends a fully built request over the network.
///
/// Implementations report network and protocol failures as
/// [`ApiClientError::Transport`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return the buffered response.
    async fn send(&self, request: Request) -> Result<Response>;
}

/// Transport backed by a pooled `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with the given configuration.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent);

        if config.gzip {
            builder = builder.gzip(true);
        }
        if config.brotli {
            builder = builder.brotli(true);
        }

        let inner = builder.build().map_err(ApiClientError::transport)?;
        Ok(Self { inner })
    }

    /// Wrap an already configured reqwest client.
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(&TransportConfig::default()).unwrap_or_else(|_| Self {
            inner: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        debug!(
            method = %request.method(),
            url = %request.url(),
            "Sending HTTP request"
        );

        let mut builder = self
            .inner
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());

        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let response = self.inner.execute(builder.build()?).await?;
        let response = Response::from_reqwest(response).await?;

        debug!(status = %response.status(), "Received HTTP response");
        Ok(response)
    }
}
