//! Read-through cache plugin.

use super::{CacheConfig, CacheEntry, CachedResponse};
use crate::log::{LogFields, LoggerConfig};
use crate::plugin::{Next, Plugin};
use crate::{Request, Response, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::header::{AGE, CACHE_CONTROL, EXPIRES};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Statuses whose responses may be stored.
const CACHEABLE_STATUSES: [u16; 5] = [200, 203, 300, 301, 410];

/// Directives that forbid storing a response when respected.
const NO_CACHE_DIRECTIVES: [&str; 3] = ["no-cache", "private", "no-store"];

/// Upper bound for a lifetime in seconds (2^31, RFC 9111 §1.2.2).
const MAX_LIFETIME_SECONDS: u64 = 1 << 31;

/// Serves repeated requests from a [`CacheStore`](super::CacheStore).
///
/// Store failures are logged and treated as misses.
pub struct CachePlugin {
    config: CacheConfig,
    logger: Option<LoggerConfig>,
}

impl CachePlugin {
    /// Create the plugin.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            logger: None,
        }
    }

    /// Report hits and stores to the given logger.
    pub fn with_logger(mut self, logger: LoggerConfig) -> Self {
        self.logger = Some(logger);
        self
    }

    async fn lookup(&self, key: &str) -> Option<(CacheEntry, Response)> {
        let store = self.config.store();
        let entry = match store.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, falling back to transport");
                return None;
            }
        };

        if !entry.is_fresh() {
            if let Err(e) = store.delete(key).await {
                warn!(key, error = %e, "Failed to delete expired cache entry");
            }
            return None;
        }

        match entry.response.to_response() {
            Ok(response) => Some((entry, response)),
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable cache entry");
                None
            }
        }
    }

    /// Lifetime of a response, or `None` if it must not be stored.
    fn lifetime(&self, response: &Response) -> Option<Duration> {
        if !CACHEABLE_STATUSES.contains(&response.status().as_u16()) {
            return None;
        }

        let directives = cache_control(response);
        let has = |name: &str| directives.iter().any(|(k, _)| k == name);

        if NO_CACHE_DIRECTIVES
            .iter()
            .any(|flag| self.config.respects(flag) && has(*flag))
        {
            return None;
        }

        let from_directives = if self.config.respects("max-age") {
            max_age(&directives).map(|max_age| {
                let age = response
                    .header(AGE)
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .unwrap_or(0);
                max_age.saturating_sub(age)
            })
        } else {
            None
        };

        let from_expires = if from_directives.is_none() && self.config.respects("expires") {
            response
                .header(EXPIRES)
                .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
                .map(|expires| (expires.with_timezone(&Utc) - Utc::now()).num_seconds().max(0) as u64)
        } else {
            None
        };

        let seconds = from_directives
            .or(from_expires)
            .or_else(|| self.config.ttl().map(|ttl| ttl.as_secs()))?;

        (seconds > 0).then(|| Duration::from_secs(seconds.min(MAX_LIFETIME_SECONDS)))
    }

    fn log(&self, message: String, key: &str, expires_at: &DateTime<Utc>) {
        if let Some(logger) = &self.logger {
            let mut fields = LogFields::new();
            fields.insert("key".into(), Value::String(key.to_string()));
            fields.insert("expires_at".into(), Value::String(expires_at.to_rfc3339()));
            logger.sink().info(&message, &fields);
        }
    }
}

/// Parse `Cache-Control` into lowercased `(directive, value)` pairs.
fn cache_control(response: &Response) -> Vec<(String, Option<String>)> {
    response
        .headers()
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            match part.split_once('=') {
                Some((k, v)) => Some((
                    k.trim().to_ascii_lowercase(),
                    Some(v.trim().trim_matches('"').to_string()),
                )),
                None => Some((part.to_ascii_lowercase(), None)),
            }
        })
        .collect()
}

fn max_age(directives: &[(String, Option<String>)]) -> Option<u64> {
    let value = |name: &str| {
        directives
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.as_deref())
            .and_then(|v| v.parse::<u64>().ok())
    };
    value("s-maxage").or_else(|| value("max-age"))
}

#[async_trait]
impl Plugin for CachePlugin {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        if !self.config.applies_to(request.method()) {
            return next.run(request).await;
        }

        let key = self.config.key_policy().key(&request);

        if let Some((entry, response)) = self.lookup(&key).await {
            debug!(key = %key, "Serving response from cache");
            if let Some(logger) = &self.logger {
                let formatted = logger.formatter().format_request(&request);
                self.log(format!("Cache hit:\n{}", formatted), &key, &entry.expires_at);
            }
            return Ok(response);
        }

        let response = next.run(request).await?;

        let Some(lifetime) = self.lifetime(&response) else {
            return Ok(response);
        };
        let Some(expires_at) = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
        else {
            return Ok(response);
        };

        let entry = CacheEntry {
            response: CachedResponse::from_response(&response),
            expires_at,
        };

        match self.config.store().put(&key, entry, Some(lifetime)).await {
            Ok(()) => {
                if let Some(logger) = &self.logger {
                    let formatted = logger.formatter().format_response(&response);
                    self.log(format!("Cached response:\n{}", formatted), &key, &expires_at);
                }
            }
            Err(e) => warn!(key = %key, error = %e, "Cache write failed"),
        }

        Ok(response)
    }

    fn name(&self) -> &'static str {
        "cache"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, CacheResult, CacheStore};
    use crate::log::LogSink;
    use crate::{PluginChain, Transport};
    use http::{HeaderMap, HeaderValue, Method, StatusCode};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    struct Counting {
        calls: AtomicUsize,
        status: StatusCode,
        cache_control: Option<&'static str>,
    }

    impl Counting {
        fn new(status: StatusCode, cache_control: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                status,
                cache_control,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for Counting {
        async fn send(&self, _request: Request) -> Result<Response> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let mut headers = HeaderMap::new();
            if let Some(cc) = self.cache_control {
                headers.insert(CACHE_CONTROL, HeaderValue::from_static(cc));
            }
            Ok(Response::new(self.status, headers, format!("call {}", n)))
        }
    }

    #[derive(Default)]
    struct MemorySink(Mutex<Vec<(String, LogFields)>>);

    impl LogSink for MemorySink {
        fn info(&self, message: &str, fields: &LogFields) {
            self.0.lock().push((message.to_string(), fields.clone()));
        }
    }

    struct Broken;

    #[async_trait]
    impl CacheStore for Broken {
        async fn get(&self, _key: &str) -> CacheResult<Option<CacheEntry>> {
            Err(CacheError::Connection("refused".into()))
        }

        async fn put(&self, _: &str, _: CacheEntry, _: Option<Duration>) -> CacheResult<()> {
            Err(CacheError::Connection("refused".into()))
        }

        async fn delete(&self, _key: &str) -> CacheResult<()> {
            Err(CacheError::Connection("refused".into()))
        }
    }

    fn client(plugin: CachePlugin, transport: Arc<Counting>) -> crate::PluginClient {
        let mut chain = PluginChain::new();
        chain.add(plugin, 16).unwrap();
        chain.into_client(transport)
    }

    fn request(method: Method) -> Request {
        Request::new(method, Url::parse("https://pokeapi.co/api/v2/pokemon/1").unwrap())
    }

    #[tokio::test]
    async fn test_second_get_served_from_cache() {
        let transport = Counting::new(StatusCode::OK, None);
        let client = client(CachePlugin::new(CacheConfig::in_memory()), transport.clone());

        let first = client.send(request(Method::GET)).await.unwrap();
        let second = client.send(request(Method::GET)).await.unwrap();

        assert_eq!(transport.calls(), 1);
        assert_eq!(first.bytes(), second.bytes());
    }

    #[tokio::test]
    async fn test_post_is_not_cached() {
        let transport = Counting::new(StatusCode::OK, None);
        let client = client(CachePlugin::new(CacheConfig::in_memory()), transport.clone());

        client.send(request(Method::POST)).await.unwrap();
        client.send(request(Method::POST)).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_error_status_is_not_cached() {
        let transport = Counting::new(StatusCode::INTERNAL_SERVER_ERROR, None);
        let client = client(CachePlugin::new(CacheConfig::in_memory()), transport.clone());

        client.send(request(Method::GET)).await.unwrap();
        client.send(request(Method::GET)).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_respected_no_store_prevents_caching() {
        let transport = Counting::new(StatusCode::OK, Some("no-store"));
        let config = CacheConfig::in_memory().with_cache_directives(["no-store", "max-age"]);
        let client = client(CachePlugin::new(config), transport.clone());

        client.send(request(Method::GET)).await.unwrap();
        client.send(request(Method::GET)).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_unrespected_no_store_is_ignored() {
        let transport = Counting::new(StatusCode::OK, Some("no-store"));
        let client = client(CachePlugin::new(CacheConfig::in_memory()), transport.clone());

        client.send(request(Method::GET)).await.unwrap();
        client.send(request(Method::GET)).await.unwrap();
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_without_ttl_relies_on_directives() {
        let plain = Counting::new(StatusCode::OK, None);
        let config = CacheConfig::in_memory().with_ttl(None);
        let plain_client = client(CachePlugin::new(config.clone()), plain.clone());
        plain_client.send(request(Method::GET)).await.unwrap();
        plain_client.send(request(Method::GET)).await.unwrap();
        assert_eq!(plain.calls(), 2);

        let directed = Counting::new(StatusCode::OK, Some("public, max-age=300"));
        let directed_client = client(CachePlugin::new(config), directed.clone());
        directed_client.send(request(Method::GET)).await.unwrap();
        directed_client.send(request(Method::GET)).await.unwrap();
        assert_eq!(directed.calls(), 1);
    }

    #[tokio::test]
    async fn test_max_age_zero_is_not_cached() {
        let transport = Counting::new(StatusCode::OK, Some("max-age=0"));
        let client = client(CachePlugin::new(CacheConfig::in_memory()), transport.clone());

        client.send(request(Method::GET)).await.unwrap();
        client.send(request(Method::GET)).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_miss() {
        let transport = Counting::new(StatusCode::OK, None);
        let config = CacheConfig::new(Arc::new(Broken));
        let client = client(CachePlugin::new(config), transport.clone());

        let response = client.send(request(Method::GET)).await.unwrap();
        assert_eq!(response.text().unwrap(), "call 0");
        client.send(request(Method::GET)).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_logs_store_and_hit() {
        let transport = Counting::new(StatusCode::OK, None);
        let sink = Arc::new(MemorySink::default());
        let plugin = CachePlugin::new(CacheConfig::in_memory())
            .with_logger(LoggerConfig::new(sink.clone()));
        let client = client(plugin, transport.clone());

        client.send(request(Method::GET)).await.unwrap();
        client.send(request(Method::GET)).await.unwrap();

        let entries = sink.0.lock();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "Cached response:\n200 OK");
        assert_eq!(
            entries[1].0,
            "Cache hit:\nGET https://pokeapi.co/api/v2/pokemon/1"
        );
        assert_eq!(entries[0].1["key"], entries[1].1["key"]);
        assert!(entries[1].1.contains_key("expires_at"));
    }

    fn response_with(headers: &[(http::HeaderName, String)]) -> Response {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        Response::new(StatusCode::OK, map, "")
    }

    #[tokio::test]
    async fn test_huge_max_age_is_clamped_and_cached() {
        let transport = Counting::new(StatusCode::OK, Some("max-age=10000000000000"));
        let plugin = CachePlugin::new(CacheConfig::in_memory().with_ttl(None));
        assert_eq!(
            plugin.lifetime(&response_with(&[(
                CACHE_CONTROL,
                "max-age=10000000000000".to_string()
            )])),
            Some(Duration::from_secs(MAX_LIFETIME_SECONDS))
        );

        let client = client(plugin, transport.clone());
        client.send(request(Method::GET)).await.unwrap();
        client.send(request(Method::GET)).await.unwrap();
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_s_maxage_takes_precedence_over_max_age() {
        let plugin = CachePlugin::new(CacheConfig::in_memory());
        let response = response_with(&[(CACHE_CONTROL, "max-age=60, s-maxage=600".to_string())]);

        assert_eq!(plugin.lifetime(&response), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_respected_expires_header_sets_lifetime() {
        let plugin = CachePlugin::new(
            CacheConfig::in_memory()
                .with_ttl(None)
                .with_cache_directives(["max-age", "expires"]),
        );
        let expires = (Utc::now() + chrono::Duration::seconds(3600)).to_rfc2822();
        let response = response_with(&[(EXPIRES, expires)]);

        let lifetime = plugin.lifetime(&response).unwrap();
        assert!(lifetime > Duration::from_secs(3590) && lifetime <= Duration::from_secs(3600));
    }

    #[test]
    fn test_max_age_wins_over_expires() {
        let plugin = CachePlugin::new(
            CacheConfig::in_memory().with_cache_directives(["max-age", "expires"]),
        );
        let expires = (Utc::now() + chrono::Duration::seconds(3600)).to_rfc2822();
        let response = response_with(&[
            (CACHE_CONTROL, "max-age=30".to_string()),
            (EXPIRES, expires),
        ]);

        assert_eq!(plugin.lifetime(&response), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_past_expires_header_is_not_stored() {
        let plugin = CachePlugin::new(
            CacheConfig::in_memory().with_cache_directives(["max-age", "expires"]),
        );
        let expires = (Utc::now() - chrono::Duration::seconds(60)).to_rfc2822();
        let response = response_with(&[(EXPIRES, expires)]);

        assert_eq!(plugin.lifetime(&response), None);
    }

    #[test]
    fn test_unrespected_expires_falls_back_to_ttl() {
        let plugin = CachePlugin::new(CacheConfig::in_memory());
        let expires = (Utc::now() + chrono::Duration::seconds(3600)).to_rfc2822();
        let response = response_with(&[(EXPIRES, expires)]);

        assert_eq!(plugin.lifetime(&response), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_lifetime_subtracts_age() {
        let plugin = CachePlugin::new(CacheConfig::in_memory());
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=120"));
        headers.insert(AGE, HeaderValue::from_static("20"));
        let response = Response::new(StatusCode::OK, headers, "");

        assert_eq!(plugin.lifetime(&response), Some(Duration::from_secs(100)));
    }
}
