//! The API base every typed client is built on.

use crate::auth::{Authentication, AuthenticationPlugin};
use crate::cache::{CacheConfig, CachePlugin};
use crate::content::{ContentLengthPlugin, ContentTypePlugin};
use crate::events::EventPipeline;
use crate::helpers::{self, merge_params, reduce_duplicate_slashes, upsert};
use crate::log::{LoggerConfig, LoggerPlugin};
use crate::plugin::{priority, PluginChain};
use crate::{ApiClientError, ClientBuilder, Contents, Request, Response, Result, Transport};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Base for typed HTTP API clients.
///
/// Concrete clients embed an `Api`, configure it once (base URL, defaults,
/// cache, logger, authentication, listeners) and implement their endpoints
/// on top of [`Api::request`].
///
/// Configuration methods take `&mut self`; [`request`](Api::request) takes
/// `&self`, so a fully configured `Api` can be shared between tasks.
///
/// ```rust,no_run
/// use armature_api_client::{Api, Contents, Method, Result};
///
/// struct PokeApi {
///     api: Api,
/// }
///
/// impl PokeApi {
///     fn new() -> Result<Self> {
///         let mut api = Api::new();
///         api.set_base_url("https://pokeapi.co/api/v2")?;
///         api.add_post_request_listener(|_, response| response.error_for_status(), 0);
///         api.add_response_contents_listener(Contents::decode_json, 0);
///         Ok(Self { api })
///     }
///
///     async fn pokemon(&self, name: &str) -> Result<Contents> {
///         let path = self.api.build_path("/pokemon/{name}", &[("name", name)]);
///         self.api.request(Method::GET, path).send().await
///     }
/// }
/// ```
#[derive(Clone)]
pub struct Api {
    base_url: Option<String>,
    query_defaults: Vec<(String, String)>,
    header_defaults: Vec<(String, String)>,
    client_builder: ClientBuilder,
    cache: Option<CacheConfig>,
    logger: Option<LoggerConfig>,
    authentication: Option<Arc<dyn Authentication>>,
    events: EventPipeline,
}

impl Api {
    /// Create an API base with the default reqwest transport.
    pub fn new() -> Self {
        Self::with_client_builder(ClientBuilder::default())
    }

    /// Create an API base with the given transport setup.
    pub fn with_client_builder(client_builder: ClientBuilder) -> Self {
        Self {
            base_url: None,
            query_defaults: Vec::new(),
            header_defaults: Vec::new(),
            client_builder,
            cache: None,
            logger: None,
            authentication: None,
            events: EventPipeline::new(),
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Set the base URL. It must be an absolute `http` or `https` URL.
    pub fn set_base_url(&mut self, base_url: impl Into<String>) -> Result<&mut Self> {
        let base_url = base_url.into();
        let parsed = Url::parse(&base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") || !parsed.has_host() {
            return Err(ApiClientError::InvalidUrl(format!(
                "{} is not an http(s) URL",
                base_url
            )));
        }
        self.base_url = Some(base_url);
        Ok(self)
    }

    /// Get a query default.
    pub fn query_default(&self, name: &str) -> Option<&str> {
        find(&self.query_defaults, name)
    }

    /// Get all query defaults in insertion order.
    pub fn query_defaults(&self) -> &[(String, String)] {
        &self.query_defaults
    }

    /// Add or replace a query default.
    pub fn add_query_default(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        upsert(&mut self.query_defaults, name.into(), value.into());
        self
    }

    /// Remove a query default.
    pub fn remove_query_default(&mut self, name: &str) -> &mut Self {
        self.query_defaults.retain(|(k, _)| k != name);
        self
    }

    /// Get a header default.
    pub fn header_default(&self, name: &str) -> Option<&str> {
        self.header_defaults
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get all header defaults in insertion order.
    pub fn header_defaults(&self) -> &[(String, String)] {
        &self.header_defaults
    }

    /// Add or replace a header default.
    pub fn add_header_default(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.header_defaults.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.header_defaults.push((name, value.into()));
        self
    }

    /// Remove a header default.
    pub fn remove_header_default(&mut self, name: &str) -> &mut Self {
        self.header_defaults.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self
    }

    /// Get the transport setup.
    pub fn client_builder(&self) -> &ClientBuilder {
        &self.client_builder
    }

    /// Get the transport setup for modification.
    pub fn client_builder_mut(&mut self) -> &mut ClientBuilder {
        &mut self.client_builder
    }

    /// Replace the transport setup.
    pub fn set_client_builder(&mut self, client_builder: ClientBuilder) -> &mut Self {
        self.client_builder = client_builder;
        self
    }

    /// Get the cache configuration.
    pub fn cache_config(&self) -> Option<&CacheConfig> {
        self.cache.as_ref()
    }

    /// Enable, replace or (with `None`) disable response caching.
    pub fn set_cache_config(&mut self, cache: Option<CacheConfig>) -> &mut Self {
        self.cache = cache;
        self
    }

    /// Get the logger configuration.
    pub fn logger_config(&self) -> Option<&LoggerConfig> {
        self.logger.as_ref()
    }

    /// Enable, replace or (with `None`) disable request logging.
    pub fn set_logger_config(&mut self, logger: Option<LoggerConfig>) -> &mut Self {
        self.logger = logger;
        self
    }

    /// Get the authentication strategy.
    pub fn authentication(&self) -> Option<&Arc<dyn Authentication>> {
        self.authentication.as_ref()
    }

    /// Set or (with `None`) clear the authentication strategy.
    pub fn set_authentication(&mut self, authentication: Option<Arc<dyn Authentication>>) -> &mut Self {
        self.authentication = authentication;
        self
    }

    /// Get the listener pipeline.
    pub fn events(&self) -> &EventPipeline {
        &self.events
    }

    /// Get the listener pipeline for modification.
    pub fn events_mut(&mut self) -> &mut EventPipeline {
        &mut self.events
    }

    /// Register a listener run before each request is sent.
    pub fn add_pre_request_listener<F>(&mut self, handler: F, priority: i32) -> &mut Self
    where
        F: Fn(Request) -> Result<Request> + Send + Sync + 'static,
    {
        self.events.add_pre_request_listener(handler, priority);
        self
    }

    /// Register a listener run on each response.
    ///
    /// This is where clients turn error statuses into errors.
    pub fn add_post_request_listener<F>(&mut self, handler: F, priority: i32) -> &mut Self
    where
        F: Fn(&Request, Response) -> Result<Response> + Send + Sync + 'static,
    {
        self.events.add_post_request_listener(handler, priority);
        self
    }

    /// Register a listener run on the response contents.
    pub fn add_response_contents_listener<F>(&mut self, handler: F, priority: i32) -> &mut Self
    where
        F: Fn(Contents) -> Result<Contents> + Send + Sync + 'static,
    {
        self.events.add_response_contents_listener(handler, priority);
        self
    }

    /// Substitute `{name}` placeholders in a path template.
    pub fn build_path<K, V>(&self, template: &str, parameters: &[(K, V)]) -> String
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        helpers::build_path(template, parameters)
    }

    /// Start a request.
    pub fn request(&self, method: Method, path: impl Into<String>) -> ApiRequest<'_> {
        ApiRequest::new(self, method, path.into())
    }

    /// Send a request and return its final contents.
    ///
    /// Request query and header values override the configured defaults.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: Vec<(String, String)>,
        headers: Vec<(String, String)>,
        body: Option<Bytes>,
    ) -> Result<Contents> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| ApiClientError::Config("A base URL must be set.".to_string()))?;

        let query = merge_params(&self.query_defaults, query);
        let url = build_uri(base_url, path, &query)?;

        let mut request = Request::new(method, url);
        *request.headers_mut() = build_headers(&self.header_defaults, &headers);
        request.set_body(body);

        let client = self
            .plugin_chain()?
            .into_client(self.client_builder.transport().clone());

        debug!(method = %request.method(), url = %request.url(), "Dispatching API request");

        let request = self.events.pre_request(request)?;
        let response = client.send(request.clone()).await?;
        let response = self.events.post_request(&request, response)?;

        let contents = Contents::from_body(response.into_bytes());
        self.events.response_contents(contents)
    }

    /// Assemble the plugin chain from the current configuration.
    ///
    /// Built fresh on every call, so configuration changes between calls
    /// always take effect.
    pub fn plugin_chain(&self) -> Result<PluginChain> {
        let mut chain = self.client_builder.plugins().clone();

        chain.add(ContentTypePlugin::new(), priority::CONTENT_TYPE)?;
        chain.add(ContentLengthPlugin, priority::CONTENT_LENGTH)?;

        if let Some(authentication) = &self.authentication {
            chain.add(
                AuthenticationPlugin::new(authentication.clone()),
                priority::AUTHENTICATION,
            )?;
        }

        if let Some(cache) = &self.cache {
            let mut plugin = CachePlugin::new(cache.clone());
            if let Some(logger) = &self.logger {
                plugin = plugin.with_logger(logger.clone());
            }
            chain.add(plugin, priority::CACHE)?;
        }

        if let Some(logger) = &self.logger {
            chain.add(LoggerPlugin::new(logger.clone()), priority::LOGGER)?;
        }

        Ok(chain)
    }
}

impl Default for Api {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("base_url", &self.base_url)
            .field("query_defaults", &self.query_defaults)
            .field("header_defaults", &self.header_defaults.len())
            .field("plugins", self.client_builder.plugins())
            .field("cache", &self.cache.is_some())
            .field("logger", &self.logger.is_some())
            .field("authentication", &self.authentication.is_some())
            .field("events", &self.events)
            .finish()
    }
}

fn find<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Join base URL and path, collapse duplicate slashes and append the query.
fn build_uri(base_url: &str, path: &str, query: &[(String, String)]) -> Result<Url> {
    let mut url = Url::parse(&reduce_duplicate_slashes(&format!("{}{}", base_url, path)))?;

    if !query.is_empty() {
        let encoded =
            serde_urlencoded::to_string(query).map_err(|e| ApiClientError::Config(e.to_string()))?;
        let combined = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, encoded),
            _ => encoded,
        };
        url.set_query(Some(&combined));
    }

    Ok(url)
}

/// Defaults first, then request headers; later values replace earlier ones.
fn build_headers(defaults: &[(String, String)], headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in defaults.iter().chain(headers) {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid header"),
        }
    }
    map
}

/// Request builder returned by [`Api::request`].
pub struct ApiRequest<'a> {
    api: &'a Api,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    error: Option<ApiClientError>,
}

impl<'a> ApiRequest<'a> {
    fn new(api: &'a Api, method: Method, path: String) -> Self {
        Self {
            api,
            method,
            path,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            error: None,
        }
    }

    /// Add a query parameter, replacing one of the same name.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        upsert(&mut self.query, key.into(), value.to_string());
        self
    }

    /// Add multiple query parameters.
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            upsert(&mut self.query, k.into(), v.into());
        }
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add multiple headers.
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the request body as raw bytes.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the request body as JSON.
    pub fn json<T: Serialize>(mut self, json: &T) -> Self {
        match serde_json::to_vec(json) {
            Ok(bytes) => {
                self.body = Some(Bytes::from(bytes));
                self.header("Content-Type", "application/json")
            }
            Err(e) => {
                self.error = Some(e.into());
                self
            }
        }
    }

    /// Send the request.
    pub async fn send(self) -> Result<Contents> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.api
            .send(self.method, &self.path, self.query, self.headers, self.body)
            .await
    }
}
