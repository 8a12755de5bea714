//! Response caching.
//!
//! [`CachePlugin`] is a read-through cache in front of the transport. Keys
//! come from a [`CacheKeyPolicy`]; lifetimes come from the configured TTL
//! or, when respected, the response `Cache-Control` directives.

mod plugin;
mod store;

pub use plugin::CachePlugin;
pub use store::{
    CacheEntry, CacheError, CacheResult, CacheStore, CachedResponse, MemoryCacheStore,
};

use crate::Request;
use http::{HeaderName, Method};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Derives cache keys from requests.
///
/// The key hashes the method, the full URI, the values of the vary headers
/// and the body.
#[derive(Debug, Clone)]
pub struct CacheKeyPolicy {
    prefix: Option<String>,
    vary_headers: Vec<HeaderName>,
}

impl Default for CacheKeyPolicy {
    fn default() -> Self {
        Self {
            prefix: None,
            vary_headers: vec![http::header::AUTHORIZATION, http::header::ACCEPT],
        }
    }
}

impl CacheKeyPolicy {
    /// Prepend a prefix to every key.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Replace the set of headers that take part in the key.
    pub fn with_vary_headers(mut self, headers: Vec<HeaderName>) -> Self {
        self.vary_headers = headers;
        self
    }

    /// Headers that take part in the key.
    pub fn vary_headers(&self) -> &[HeaderName] {
        &self.vary_headers
    }

    /// Compute the key of a request.
    pub fn key(&self, request: &Request) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.method().as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(request.url().as_str().as_bytes());

        for name in &self.vary_headers {
            for value in request.headers().get_all(name) {
                hasher.update(b"\n");
                hasher.update(name.as_str().as_bytes());
                hasher.update(b": ");
                hasher.update(value.as_bytes());
            }
        }

        if let Some(body) = request.body().filter(|b| !b.is_empty()) {
            hasher.update(b" ");
            hasher.update(body);
        }

        let hash = hex::encode(hasher.finalize());
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, hash),
            None => hash,
        }
    }
}

/// Cache configuration.
#[derive(Clone)]
pub struct CacheConfig {
    store: Arc<dyn CacheStore>,
    ttl: Option<Duration>,
    methods: Vec<Method>,
    cache_directives: Vec<String>,
    key_policy: CacheKeyPolicy,
}

impl CacheConfig {
    /// Create a configuration with a 60 second TTL, caching `GET` and
    /// `HEAD` and respecting `max-age`.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            ttl: Some(Duration::from_secs(60)),
            methods: vec![Method::GET, Method::HEAD],
            cache_directives: vec!["max-age".to_string()],
            key_policy: CacheKeyPolicy::default(),
        }
    }

    /// Cache in process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()))
    }

    /// Set the default lifetime. `None` caches only responses whose
    /// directives give a lifetime.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the cacheable methods.
    pub fn with_methods(mut self, methods: Vec<Method>) -> Self {
        self.methods = methods;
        self
    }

    /// Set which response directives are respected
    /// (`max-age`, `expires`, `no-cache`, `no-store`, `private`).
    pub fn with_cache_directives<I, S>(mut self, directives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_directives = directives
            .into_iter()
            .map(|d| d.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Set the key policy.
    pub fn with_key_policy(mut self, policy: CacheKeyPolicy) -> Self {
        self.key_policy = policy;
        self
    }

    /// Get the store.
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Get the default lifetime.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Get the cacheable methods.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Get the respected response directives.
    pub fn cache_directives(&self) -> &[String] {
        &self.cache_directives
    }

    /// Get the key policy.
    pub fn key_policy(&self) -> &CacheKeyPolicy {
        &self.key_policy
    }

    /// Check whether requests with this method are cached.
    pub fn applies_to(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    fn respects(&self, directive: &str) -> bool {
        self.cache_directives.iter().any(|d| d == directive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn get(url: &str) -> Request {
        Request::new(Method::GET, Url::parse(url).unwrap())
    }

    #[test]
    fn test_defaults() {
        let config = CacheConfig::in_memory();
        assert_eq!(config.ttl(), Some(Duration::from_secs(60)));
        assert_eq!(config.methods(), &[Method::GET, Method::HEAD]);
        assert_eq!(config.cache_directives(), &["max-age".to_string()]);
        assert!(config.applies_to(&Method::HEAD));
        assert!(!config.applies_to(&Method::POST));
    }

    #[test]
    fn test_overrides() {
        let config = CacheConfig::in_memory()
            .with_ttl(Some(Duration::from_secs(600)))
            .with_methods(vec![Method::GET])
            .with_cache_directives(["No-Cache", "max-age"]);

        assert_eq!(config.ttl(), Some(Duration::from_secs(600)));
        assert_eq!(config.methods(), &[Method::GET]);
        assert!(config.respects("no-cache"));
    }

    #[test]
    fn test_key_is_stable_and_distinguishes_uri() {
        let policy = CacheKeyPolicy::default();
        let a = policy.key(&get("https://pokeapi.co/api/v2/pokemon/1"));
        let b = policy.key(&get("https://pokeapi.co/api/v2/pokemon/1"));
        let c = policy.key(&get("https://pokeapi.co/api/v2/pokemon/2"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_key_varies_on_authorization() {
        let policy = CacheKeyPolicy::default();
        let anonymous = get("https://api.example.com/me");
        let alice = anonymous.clone().with_header("Authorization", "Bearer alice");
        let bob = anonymous.clone().with_header("Authorization", "Bearer bob");
        let traced = anonymous.clone().with_header("X-Trace", "1");

        assert_ne!(policy.key(&alice), policy.key(&bob));
        assert_ne!(policy.key(&anonymous), policy.key(&alice));
        assert_eq!(policy.key(&anonymous), policy.key(&traced));
    }

    #[test]
    fn test_key_prefix() {
        let policy = CacheKeyPolicy::default().with_prefix("pokeapi:");
        assert!(policy.key(&get("https://pokeapi.co/")).starts_with("pokeapi:"));
    }
}
