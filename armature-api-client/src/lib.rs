//! # Armature API Client
//!
//! A base for building typed HTTP API clients.
//!
//! An [`Api`] holds everything a concrete client shares between its
//! endpoints: a base URL, default query parameters and headers, an optional
//! response cache, an optional request logger, an authentication strategy
//! and a pipeline of lifecycle listeners. Endpoint methods build a path,
//! call [`Api::request`] and receive the response [`Contents`].
//!
//! ## Features
//!
//! - **Plugins**: priority-ordered wrappers around the transport
//! - **Caching**: read-through response cache honoring `Cache-Control`
//! - **Logging**: request/response logging with timing and correlation ids
//! - **Authentication**: bearer, basic, API key header and query parameter
//! - **Listeners**: pre-request, post-request and response-contents stages
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use armature_api_client::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut api = Api::new();
//!     api.set_base_url("https://api.openweathermap.org/data/2.5")?
//!         .add_query_default("appid", "secret")
//!         .add_header_default("Accept", "application/json")
//!         .set_cache_config(Some(CacheConfig::in_memory()))
//!         .set_logger_config(Some(LoggerConfig::tracing()))
//!         .add_post_request_listener(|_, response| response.error_for_status(), 0)
//!         .add_response_contents_listener(Contents::decode_json, 0);
//!
//!     let weather = api
//!         .request(Method::GET, "/weather")
//!         .query("q", "Lisbon")
//!         .send()
//!         .await?;
//!
//!     println!("{:?}", weather.as_json());
//!     Ok(())
//! }
//! ```
//!
//! ## Custom Plugins
//!
//! ```rust,no_run
//! use armature_api_client::prelude::*;
//! use async_trait::async_trait;
//!
//! struct RequestId;
//!
//! #[async_trait]
//! impl Plugin for RequestId {
//!     async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
//!         next.run(request.with_header("X-Request-Id", "42")).await
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let mut api = Api::new();
//! api.client_builder_mut().add_plugin(RequestId, 100)?;
//! # Ok(())
//! # }
//! ```

mod api;
mod auth;
mod cache;
mod client;
mod config;
mod content;
mod contents;
mod error;
mod events;
mod helpers;
mod log;
mod plugin;
mod request;
mod response;
mod transport;

pub use api::{Api, ApiRequest};
pub use auth::{ApiKey, Authentication, AuthenticationPlugin, BasicAuth, Bearer, QueryParam};
pub use cache::{
    CacheConfig, CacheEntry, CacheError, CacheKeyPolicy, CachePlugin, CacheResult, CacheStore,
    CachedResponse, MemoryCacheStore,
};
pub use client::ClientBuilder;
pub use config::{TransportConfig, TransportConfigBuilder};
pub use content::{ContentLengthPlugin, ContentTypePlugin};
pub use contents::Contents;
pub use error::{ApiClientError, BoxError, Result};
pub use events::{
    EventPipeline, PostRequestListener, PreRequestListener, ResponseContentsListener, Stage,
};
pub use helpers::{build_path, reduce_duplicate_slashes};
pub use log::{
    Formatter, FullHttpMessageFormatter, LogFields, LogSink, LoggerConfig, LoggerPlugin,
    SimpleFormatter, TracingSink,
};
pub use plugin::{priority, Next, Plugin, PluginChain, PluginClient};
pub use request::Request;
pub use response::Response;
pub use transport::{ReqwestTransport, Transport};

// Re-export common types
pub use bytes::Bytes;
pub use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use armature_api_client::prelude::*;
/// ```
pub mod prelude {
    pub use crate::api::{Api, ApiRequest};
    pub use crate::auth::{ApiKey, Authentication, BasicAuth, Bearer, QueryParam};
    pub use crate::cache::{CacheConfig, CacheStore, MemoryCacheStore};
    pub use crate::client::ClientBuilder;
    pub use crate::config::TransportConfig;
    pub use crate::contents::Contents;
    pub use crate::error::{ApiClientError, Result};
    pub use crate::log::{LoggerConfig, LogSink};
    pub use crate::plugin::{Next, Plugin};
    pub use crate::request::Request;
    pub use crate::response::Response;
    pub use crate::transport::Transport;
    pub use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
}
