//! Content negotiation plugins.

use crate::plugin::{Next, Plugin};
use crate::{Request, Response, Result};
use async_trait::async_trait;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::HeaderValue;

/// Sets `Content-Type` on requests whose body is recognisably JSON or XML.
#[derive(Debug, Clone)]
pub struct ContentTypePlugin {
    skip_detection: bool,
    size_limit: usize,
}

impl ContentTypePlugin {
    /// Create the plugin with a 16 MiB sniffing limit.
    pub fn new() -> Self {
        Self {
            skip_detection: false,
            size_limit: 16_000_000,
        }
    }

    /// Never inspect the body.
    pub fn skip_detection(mut self, skip: bool) -> Self {
        self.skip_detection = skip;
        self
    }

    /// Bodies larger than this are not inspected.
    pub fn size_limit(mut self, limit: usize) -> Self {
        self.size_limit = limit;
        self
    }

    fn detect(&self, body: &[u8]) -> Option<&'static str> {
        if self.skip_detection || body.is_empty() || body.len() > self.size_limit {
            return None;
        }
        if serde_json::from_slice::<serde::de::IgnoredAny>(body).is_ok() {
            return Some("application/json");
        }
        let text = std::str::from_utf8(body).ok()?.trim();
        (text.starts_with('<') && text.ends_with('>')).then_some("application/xml")
    }
}

impl Default for ContentTypePlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for ContentTypePlugin {
    async fn handle(&self, mut request: Request, next: Next<'_>) -> Result<Response> {
        if !request.headers().contains_key(CONTENT_TYPE) {
            let detected = request.body().and_then(|body| self.detect(body));
            if let Some(content_type) = detected {
                request
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }
        next.run(request).await
    }

    fn name(&self) -> &'static str {
        "content-type"
    }
}

/// Sets `Content-Length` from the buffered body when it is missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentLengthPlugin;

#[async_trait]
impl Plugin for ContentLengthPlugin {
    async fn handle(&self, mut request: Request, next: Next<'_>) -> Result<Response> {
        if !request.headers().contains_key(CONTENT_LENGTH) {
            let length = HeaderValue::from(request.body_len());
            request.headers_mut().insert(CONTENT_LENGTH, length);
        }
        next.run(request).await
    }

    fn name(&self) -> &'static str {
        "content-length"
    }
}
