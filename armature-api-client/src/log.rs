//! Request/response logging.
//!
//! The logger writes to a [`LogSink`] and renders messages through a
//! [`Formatter`]. [`TracingSink`] forwards everything to `tracing`.

use crate::plugin::{Next, Plugin};
use crate::{Request, Response, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Structured fields attached to a log entry.
pub type LogFields = Map<String, Value>;

/// Destination of log entries.
pub trait LogSink: Send + Sync {
    /// Write an info-level entry.
    fn info(&self, message: &str, fields: &LogFields);

    /// Write an error-level entry.
    fn error(&self, message: &str, fields: &LogFields) {
        self.info(message, fields);
    }
}

/// Log sink that emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn info(&self, message: &str, fields: &LogFields) {
        let fields = Value::Object(fields.clone());
        tracing::info!(
            target: "armature_api_client",
            fields = %fields,
            "{}",
            message
        );
    }

    fn error(&self, message: &str, fields: &LogFields) {
        let fields = Value::Object(fields.clone());
        tracing::error!(
            target: "armature_api_client",
            fields = %fields,
            "{}",
            message
        );
    }
}

/// Renders requests and responses for log messages.
pub trait Formatter: Send + Sync {
    /// Render a request.
    fn format_request(&self, request: &Request) -> String;

    /// Render a response.
    fn format_response(&self, response: &Response) -> String;
}

/// One-line formatter: `GET https://host/path` and `200 OK`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleFormatter;

impl Formatter for SimpleFormatter {
    fn format_request(&self, request: &Request) -> String {
        format!("{} {}", request.method(), request.url())
    }

    fn format_response(&self, response: &Response) -> String {
        let status = response.status();
        format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        )
        .trim_end()
        .to_string()
    }
}

/// Formatter that includes headers and a truncated body.
#[derive(Debug, Clone, Copy)]
pub struct FullHttpMessageFormatter {
    max_body_length: usize,
}

impl FullHttpMessageFormatter {
    /// Create a formatter that prints at most `max_body_length` body bytes.
    pub fn new(max_body_length: usize) -> Self {
        Self { max_body_length }
    }

    fn write_message(&self, out: &mut String, headers: &http::HeaderMap, body: &[u8]) {
        for (name, value) in headers {
            let value = if value.is_sensitive() {
                "[redacted]"
            } else {
                value.to_str().unwrap_or("[binary]")
            };
            let _ = writeln!(out, "{}: {}", name, value);
        }
        out.push('\n');
        let shown = &body[..body.len().min(self.max_body_length)];
        out.push_str(&String::from_utf8_lossy(shown));
    }
}

impl Default for FullHttpMessageFormatter {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Formatter for FullHttpMessageFormatter {
    fn format_request(&self, request: &Request) -> String {
        let mut out = format!("{} {}\n", request.method(), request.url());
        let body = request.body().map(|b| &b[..]).unwrap_or_default();
        self.write_message(&mut out, request.headers(), body);
        out
    }

    fn format_response(&self, response: &Response) -> String {
        let mut out = format!("{}\n", SimpleFormatter.format_response(response));
        self.write_message(&mut out, response.headers(), response.bytes());
        out
    }
}

/// Logger configuration: where entries go and how messages are rendered.
#[derive(Clone)]
pub struct LoggerConfig {
    sink: Arc<dyn LogSink>,
    formatter: Arc<dyn Formatter>,
    log_responses: bool,
}

impl LoggerConfig {
    /// Create a logger configuration with the [`SimpleFormatter`].
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            formatter: Arc::new(SimpleFormatter),
            log_responses: true,
        }
    }

    /// Logger writing to `tracing`.
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    /// Set the formatter.
    pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Enable or disable the per-response entry.
    pub fn log_responses(mut self, enable: bool) -> Self {
        self.log_responses = enable;
        self
    }

    /// Get the sink.
    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    /// Get the formatter.
    pub fn formatter(&self) -> &Arc<dyn Formatter> {
        &self.formatter
    }

    /// Whether responses are logged.
    pub fn logs_responses(&self) -> bool {
        self.log_responses
    }
}

/// Logs every request attempt and its outcome.
pub struct LoggerPlugin {
    config: LoggerConfig,
}

impl LoggerPlugin {
    /// Create the plugin from a logger configuration.
    pub fn new(config: LoggerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Plugin for LoggerPlugin {
    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let LoggerConfig {
            sink,
            formatter,
            log_responses,
        } = &self.config;

        let uid = Uuid::new_v4().to_string();
        let formatted_request = formatter.format_request(&request);

        let mut fields = LogFields::new();
        fields.insert("uid".into(), Value::String(uid));
        sink.info(&format!("Sending request:\n{}", formatted_request), &fields);

        let start = Instant::now();
        let result = next.run(request).await;
        let milliseconds = start.elapsed().as_millis() as u64;
        fields.insert("milliseconds".into(), Value::from(milliseconds));

        match &result {
            Ok(response) if *log_responses => sink.info(
                &format!(
                    "Received response:\n{} in {} ms",
                    formatter.format_response(response),
                    milliseconds
                ),
                &fields,
            ),
            Ok(_) => {}
            Err(e) => sink.error(
                &format!("Error:\n{}\nwhen sending request:\n{}", e, formatted_request),
                &fields,
            ),
        }

        result
    }

    fn name(&self) -> &'static str {
        "logger"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApiClientError, PluginChain, Transport};
    use http::{HeaderMap, Method, StatusCode};
    use parking_lot::Mutex;
    use url::Url;

    #[derive(Default)]
    struct MemorySink(Mutex<Vec<(String, LogFields)>>);

    impl LogSink for MemorySink {
        fn info(&self, message: &str, fields: &LogFields) {
            self.0.lock().push((format!("INFO {}", message), fields.clone()));
        }

        fn error(&self, message: &str, fields: &LogFields) {
            self.0.lock().push((format!("ERROR {}", message), fields.clone()));
        }
    }

    struct Fixed(Option<StatusCode>);

    #[async_trait]
    impl Transport for Fixed {
        async fn send(&self, _request: Request) -> Result<Response> {
            match self.0 {
                Some(status) => Ok(Response::new(status, HeaderMap::new(), "")),
                None => Err(ApiClientError::transport("connection refused")),
            }
        }
    }

    fn request() -> Request {
        let url = Url::parse("https://pokeapi.co/api/v2/pokemon").unwrap();
        Request::new(Method::GET, url)
    }

    async fn run(config: LoggerConfig, transport: Fixed) -> Result<Response> {
        let mut chain = PluginChain::new();
        chain.add(LoggerPlugin::new(config), 8).unwrap();
        chain.into_client(Arc::new(transport)).send(request()).await
    }

    #[test]
    fn test_tracing_sink_accepts_fields() {
        let mut fields = LogFields::new();
        fields.insert("uid".into(), Value::String("abc".into()));
        fields.insert("milliseconds".into(), Value::from(12u64));

        TracingSink.info("Sending request:\nGET https://api.example.com/", &fields);
        TracingSink.error("Error:\nboom", &fields);
        LoggerConfig::tracing().sink().info("Received response:\n200 OK in 12 ms", &fields);
    }

    #[test]
    fn test_simple_formatter() {
        assert_eq!(
            SimpleFormatter.format_request(&request()),
            "GET https://pokeapi.co/api/v2/pokemon"
        );
        assert_eq!(SimpleFormatter.format_response(&Response::ok("")), "200 OK");
    }

    #[test]
    fn test_full_formatter_truncates_and_redacts() {
        let request = request()
            .with_header("Accept", "application/json")
            .with_body("abcdefgh");
        let request = crate::auth::Authentication::authenticate(
            &crate::auth::Bearer::new("secret"),
            request,
        )
        .unwrap();

        let out = FullHttpMessageFormatter::new(4).format_request(&request);
        assert!(out.starts_with("GET https://pokeapi.co/api/v2/pokemon\n"));
        assert!(out.contains("accept: application/json"));
        assert!(out.contains("authorization: [redacted]"));
        assert!(out.ends_with("\n\nabcd"));
    }

    #[tokio::test]
    async fn test_logs_request_and_response() {
        let sink = Arc::new(MemorySink::default());
        let config = LoggerConfig::new(sink.clone());

        run(config, Fixed(Some(StatusCode::OK))).await.unwrap();

        let entries = sink.0.lock();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].0,
            "INFO Sending request:\nGET https://pokeapi.co/api/v2/pokemon"
        );
        assert!(entries[1].0.starts_with("INFO Received response:\n200 OK in "));
        assert_eq!(entries[0].1["uid"], entries[1].1["uid"]);
        assert!(entries[1].1.contains_key("milliseconds"));
    }

    #[tokio::test]
    async fn test_response_logging_can_be_disabled() {
        let sink = Arc::new(MemorySink::default());
        let config = LoggerConfig::new(sink.clone()).log_responses(false);

        run(config, Fixed(Some(StatusCode::OK))).await.unwrap();
        assert_eq!(sink.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_logs_transport_error() {
        let sink = Arc::new(MemorySink::default());
        let result = run(LoggerConfig::new(sink.clone()), Fixed(None)).await;

        assert!(result.unwrap_err().is_transport());
        let entries = sink.0.lock();
        assert!(entries[1].0.starts_with("ERROR Error:\nTransport error: connection refused"));
    }
}
