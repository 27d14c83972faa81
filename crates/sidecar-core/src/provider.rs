//! Capabilities the agent consumes from its surroundings
//!
//! - [`ConfigProvider`]: remote experiment store
//! - [`EventSink`]: analytics transport
//! - [`HostPage`]: location, user agent and navigation of the hosting page

use crate::config::ClientOptions;
use crate::error::{ProviderError, SinkError};
use crate::types::{EndUser, QueuedEvent};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn typed_get<T: DeserializeOwned>(value: &Value, key: &str, default: T) -> T {
    match value.get(key) {
        None | Some(Value::Null) => default,
        Some(raw) => match T::deserialize(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(key, error = %e, "config value has unexpected shape");
                default
            }
        },
    }
}

/// A named dynamic config as evaluated for the current user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicConfig {
    /// Config name
    pub name: String,
    /// Config value (a JSON object)
    pub value: Value,
}

impl DynamicConfig {
    /// Create config
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Typed value under `key`, `default` when absent or mistyped
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        typed_get(&self.value, key, default)
    }
}

/// An experiment as evaluated for the current user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Experiment id
    pub name: String,
    /// Variant parameters (a JSON object)
    pub value: Value,
    /// Rule that assigned the variant
    pub rule_id: String,
}

impl ExperimentConfig {
    /// Create experiment config
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            rule_id: String::new(),
        }
    }

    /// With rule id
    #[inline]
    #[must_use]
    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = rule_id.into();
        self
    }

    /// Typed value under `key`, `default` when absent or mistyped
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        typed_get(&self.value, key, default)
    }
}

/// Remote experiment store
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Fetch assignments for `user`
    ///
    /// # Errors
    /// `ProviderError::InitializationFailed` when the remote store is unreachable
    async fn initialize(&self, user: &EndUser, options: &ClientOptions)
        -> Result<(), ProviderError>;

    /// Dynamic config by name, `None` when unknown or not initialized
    fn dynamic_config(&self, name: &str) -> Option<DynamicConfig>;

    /// Experiment by id; unknown experiments evaluate to an empty value
    fn experiment(&self, id: &str) -> ExperimentConfig;
}

/// Analytics transport
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Hand one event to the transport
    fn log_event(&self, event: QueuedEvent);

    /// Send everything buffered
    ///
    /// # Errors
    /// `SinkError::FlushFailed` when the transport rejects the batch
    async fn flush(&self) -> Result<(), SinkError>;
}

/// The page hosting the agent
pub trait HostPage: Send + Sync {
    /// Current location
    fn href(&self) -> String;

    /// Browser user agent
    fn user_agent(&self) -> String;

    /// Browser language
    fn language(&self) -> String;

    /// Replace the current location
    fn navigate(&self, url: &str);
}
