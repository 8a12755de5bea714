//! API client error types.

use thiserror::Error;

/// Result type for API client operations.
pub type Result<T> = std::result::Result<T, ApiClientError>;

/// Boxed error carried by transport and listener failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// API client errors.
#[derive(Debug, Error)]
pub enum ApiClientError {
    /// Required configuration is missing or invalid.
    #[error("{0}")]
    Config(String),

    /// A URL could not be parsed as an absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Two plugins were registered with the same priority.
    #[error("A plugin with priority {priority} already exists.")]
    PluginConflict {
        /// The contested priority.
        priority: i32,
    },

    /// Network or protocol failure reported by the transport.
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// A request lifecycle listener rejected the call.
    #[error("Listener error: {0}")]
    Listener(#[source] BoxError),

    /// Response carried an error status.
    #[error("Response error: {status} - {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message (usually the response body).
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// An authentication strategy could not be applied.
    #[error("Authentication error: {0}")]
    Authentication(String),
}

impl ApiClientError {
    /// Wrap a transport failure.
    pub fn transport(error: impl Into<BoxError>) -> Self {
        Self::Transport(error.into())
    }

    /// Wrap an arbitrary listener failure.
    pub fn listener(error: impl Into<BoxError>) -> Self {
        Self::Listener(error.into())
    }

    /// Check if this error stems from configuration.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::InvalidUrl(_) | Self::PluginConflict { .. }
        )
    }

    /// Check if this error was raised by the transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if this error was raised by a listener.
    pub fn is_listener(&self) -> bool {
        matches!(self, Self::Listener(_) | Self::Status { .. })
    }

    /// Get the HTTP status code if this is a status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e
                .downcast_ref::<reqwest::Error>()
                .and_then(|e| e.status())
                .map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Downcast a wrapped listener or transport error.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Transport(e) | Self::Listener(e) => e.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiClientError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(Box::new(error))
    }
}

impl From<url::ParseError> for ApiClientError {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidUrl(error.to_string())
    }
}

impl From<serde_json::Error> for ApiClientError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}
