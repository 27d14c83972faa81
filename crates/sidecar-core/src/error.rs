//! Error types for the sidecar core
//!
//! Provides error handling for:
//! - Bootstrap / configuration problems
//! - Remote configuration provider failures
//! - Analytics transport failures
//! - Directive payload decoding

/// Bootstrap and configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The hosting script carried no `apikey` parameter
    #[error("missing api key")]
    MissingApiKey,

    /// The hosting script URL could not be parsed
    #[error("invalid script url '{url}': {reason}")]
    InvalidScriptUrl {
        /// Raw script source
        url: String,
        /// Parser message
        reason: String,
    },

    /// A parameter had a value outside its domain
    #[error("invalid value for '{key}': {value}")]
    InvalidValue {
        /// Parameter name
        key: String,
        /// Rejected value
        value: String,
    },
}

impl ConfigError {
    /// Create invalid value error
    pub fn invalid_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Errors reported by a [`ConfigProvider`](crate::ConfigProvider)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Remote initialization failed
    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    /// Provider returned data in an unexpected shape
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Errors reported by an [`EventSink`](crate::EventSink)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Buffered events could not be sent
    #[error("flush failed: {0}")]
    FlushFailed(String),
}

/// A directive entry that could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("directive {index} could not be decoded: {message}")]
pub struct DecodeError {
    /// Position in the experiment's directive list
    pub index: usize,
    /// Decoder message
    pub message: String,
}
