//! Cache store trait and the in-memory backend.

use crate::Response;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Cache-specific errors.
///
/// These never abort a request; the cache plugin logs them and falls back
/// to the transport.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Generic error
    #[error("Cache error: {0}")]
    Other(String),
}

/// A response in storable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Header name/value pairs in arrival order.
    pub headers: Vec<(String, String)>,
    /// Body bytes, base64 encoded when serialized.
    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
}

impl CachedResponse {
    /// Capture a response.
    pub fn from_response(response: &Response) -> Self {
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            status: response.status().as_u16(),
            headers,
            body: response.bytes().to_vec(),
        }
    }

    /// Rebuild the response.
    pub fn to_response(&self) -> CacheResult<Response> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| CacheError::Deserialization(e.to_string()))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| CacheError::Deserialization(e.to_string()))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| CacheError::Deserialization(e.to_string()))?;
            headers.append(name, value);
        }

        Ok(Response::new(status, headers, self.body.clone()))
    }
}

mod base64_body {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// A stored response with its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The stored response.
    pub response: CachedResponse,
    /// When the entry stops being served.
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Check whether the entry is still fresh.
    pub fn is_fresh(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

/// Key/value store backing the response cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get an entry from the cache.
    ///
    /// Returns `Ok(None)` if the key is not present.
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Store an entry, optionally evicting it after `ttl`.
    async fn put(&self, key: &str, entry: CacheEntry, ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete a key from the cache.
    async fn delete(&self, key: &str) -> CacheResult<()>;
}

/// In-process cache store.
///
/// Entries past their deadline are dropped when read and swept on every
/// write.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, (CacheEntry, Option<Instant>)>>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, including ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let expired = match self.entries.read().get(key) {
            None => return Ok(None),
            Some((_, Some(deadline))) if *deadline <= Instant::now() => true,
            Some((entry, _)) => return Ok(Some(entry.clone())),
        };

        if expired {
            self.entries.write().remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, entry: CacheEntry, ttl: Option<Duration>) -> CacheResult<()> {
        let now = Instant::now();
        let deadline = match ttl {
            Some(ttl) => Some(
                now.checked_add(ttl)
                    .ok_or_else(|| CacheError::Other(format!("TTL out of range: {:?}", ttl)))?,
            ),
            None => None,
        };

        let mut entries = self.entries.write();
        entries.retain(|_, (_, expiry)| expiry.is_none_or(|at| at > now));
        entries.insert(key.to_string(), (entry, deadline));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}
