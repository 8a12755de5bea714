//! Decoded response contents.

use crate::{ApiClientError, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Response contents threaded through the response-contents stage.
///
/// A request starts out with [`Contents::Text`] (or [`Contents::Binary`] when
/// the body is not valid UTF-8); listeners typically turn it into
/// [`Contents::Json`].
#[derive(Debug, Clone, PartialEq)]
pub enum Contents {
    /// Raw body text.
    Text(String),
    /// Raw body bytes that are not valid UTF-8.
    Binary(Bytes),
    /// Structured value.
    Json(Value),
}

impl Contents {
    /// Build the initial contents from a response body.
    pub fn from_body(body: Bytes) -> Self {
        match String::from_utf8(body.to_vec()) {
            Ok(text) => Self::Text(text),
            Err(_) => Self::Binary(body),
        }
    }

    /// Get the raw text, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Get the structured value, if this is JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Check if the contents are still undecoded.
    pub fn is_raw(&self) -> bool {
        !matches!(self, Self::Json(_))
    }

    /// Decode raw contents as JSON. Already decoded contents pass through.
    ///
    /// An empty body decodes to `null`.
    pub fn decode_json(self) -> Result<Self> {
        match self {
            Self::Text(text) if text.trim().is_empty() => Ok(Self::Json(Value::Null)),
            Self::Text(text) => Ok(Self::Json(serde_json::from_str(&text)?)),
            Self::Binary(bytes) => Ok(Self::Json(serde_json::from_slice(&bytes)?)),
            json @ Self::Json(_) => Ok(json),
        }
    }

    /// Deserialize the contents into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Self::Text(text) => Ok(serde_json::from_str(text)?),
            Self::Binary(bytes) => Ok(serde_json::from_slice(bytes)?),
            Self::Json(value) => serde_json::from_value(value.clone())
                .map_err(|e| ApiClientError::Json(e.to_string())),
        }
    }
}

impl From<Value> for Contents {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Contents {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}
