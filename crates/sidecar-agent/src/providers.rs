//! In-process implementations of the external capabilities
//!
//! Drive the simulator and the test suites:
//! - [`StaticConfigProvider`]: serves a JSON snapshot of the remote config
//! - [`TracingSink`]: buffers events and reports them through `tracing`
//! - [`MemoryHostPage`]: a page location that records navigations

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sidecar_core::{
    ClientOptions, ConfigProvider, DynamicConfig, EndUser, EventSink, ExperimentConfig, HostPage,
    ProviderError, QueuedEvent, SinkError,
};
use std::collections::BTreeMap;
use std::time::Duration;

/// An experiment entry of a [`ConfigSnapshot`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotExperiment {
    /// Variant parameters, usually `{"directives": [...]}`
    #[serde(default)]
    pub value: Value,
    /// Assigning rule
    #[serde(default, rename = "ruleID")]
    pub rule_id: String,
}

/// Remote configuration as seen by one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    /// Dynamic configs by name
    #[serde(default)]
    pub dynamic_configs: BTreeMap<String, Value>,
    /// Experiments by id
    #[serde(default)]
    pub experiments: BTreeMap<String, SnapshotExperiment>,
}

impl ConfigSnapshot {
    /// Parse a snapshot document
    ///
    /// Only a JSON object is a snapshot; serde would otherwise accept a
    /// positional array for the struct.
    ///
    /// # Errors
    /// `ProviderError::MalformedPayload` when `raw` is not a snapshot object
    pub fn from_json(raw: &str) -> Result<Self, ProviderError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ProviderError::MalformedPayload(e.to_string()))?;
        if !value.is_object() {
            return Err(ProviderError::MalformedPayload(
                "config snapshot must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| ProviderError::MalformedPayload(e.to_string()))
    }
}

/// Provider serving a fixed snapshot
#[derive(Debug, Default)]
pub struct StaticConfigProvider {
    snapshot: ConfigSnapshot,
    latency: Option<Duration>,
    failure: Option<String>,
    user: Mutex<Option<EndUser>>,
}

impl StaticConfigProvider {
    /// Provider for `snapshot`
    #[must_use]
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            snapshot,
            ..Self::default()
        }
    }

    /// Provider for a JSON snapshot
    ///
    /// # Errors
    /// `ProviderError::MalformedPayload` when `raw` is not a snapshot
    pub fn from_json(raw: &str) -> Result<Self, ProviderError> {
        ConfigSnapshot::from_json(raw).map(Self::new)
    }

    /// With simulated initialization latency
    #[inline]
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Initialization fails with `reason`
    #[inline]
    #[must_use]
    pub fn with_failure(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    /// User passed to the last successful initialization
    #[must_use]
    pub fn user(&self) -> Option<EndUser> {
        self.user.lock().clone()
    }

    fn initialized(&self) -> bool {
        self.user.lock().is_some()
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn initialize(
        &self,
        user: &EndUser,
        options: &ClientOptions,
    ) -> Result<(), ProviderError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(reason) = &self.failure {
            return Err(ProviderError::InitializationFailed(reason.clone()));
        }
        tracing::debug!(
            user_id = %user.user_id,
            initialize_api = ?options.initialize_api,
            experiments = self.snapshot.experiments.len(),
            "static provider initialized"
        );
        *self.user.lock() = Some(user.clone());
        Ok(())
    }

    fn dynamic_config(&self, name: &str) -> Option<DynamicConfig> {
        if !self.initialized() {
            return None;
        }
        self.snapshot
            .dynamic_configs
            .get(name)
            .map(|value| DynamicConfig::new(name, value.clone()))
    }

    fn experiment(&self, id: &str) -> ExperimentConfig {
        match self.snapshot.experiments.get(id) {
            Some(exp) if self.initialized() => {
                ExperimentConfig::new(id, exp.value.clone()).with_rule_id(exp.rule_id.clone())
            }
            _ => ExperimentConfig::new(id, Value::Object(serde_json::Map::new())),
        }
    }
}

/// Sink reporting events through `tracing`
#[derive(Debug, Default)]
pub struct TracingSink {
    buffer: Mutex<Vec<QueuedEvent>>,
    sent: Mutex<Vec<QueuedEvent>>,
}

impl TracingSink {
    /// Empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events sent by flushes so far
    #[must_use]
    pub fn sent(&self) -> Vec<QueuedEvent> {
        self.sent.lock().clone()
    }

    /// Events accepted but not yet flushed
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }
}

#[async_trait]
impl EventSink for TracingSink {
    fn log_event(&self, event: QueuedEvent) {
        tracing::debug!(event = %event.event_name, value = %event.value, "event accepted");
        self.buffer.lock().push(event);
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let batch = std::mem::take(&mut *self.buffer.lock());
        for event in &batch {
            tracing::info!(
                event = %event.event_name,
                value = %event.value,
                metadata = ?event.metadata,
                "event sent"
            );
        }
        tracing::debug!(count = batch.len(), "events flushed");
        self.sent.lock().extend(batch);
        Ok(())
    }
}

/// Page location held in memory
#[derive(Debug)]
pub struct MemoryHostPage {
    href: Mutex<String>,
    user_agent: String,
    language: String,
    navigations: Mutex<Vec<String>>,
}

impl MemoryHostPage {
    /// Page at `href`
    #[must_use]
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Mutex::new(href.into()),
            user_agent: String::new(),
            language: "en-US".to_string(),
            navigations: Mutex::new(Vec::new()),
        }
    }

    /// With user agent
    #[inline]
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// With language
    #[inline]
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Every URL navigated to, in order
    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().clone()
    }
}

impl HostPage for MemoryHostPage {
    fn href(&self) -> String {
        self.href.lock().clone()
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    fn language(&self) -> String {
        self.language.clone()
    }

    fn navigate(&self, url: &str) {
        *self.href.lock() = url.to_string();
        self.navigations.lock().push(url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> EndUser {
        EndUser {
            user_id: "u".to_string(),
            custom_ids: BTreeMap::new(),
            custom: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn snapshot_is_served_after_initialize() {
        let provider = StaticConfigProvider::from_json(
            r#"{
                "dynamicConfigs": {"sidecar_dynamic_config": {"activeExperiments": []}},
                "experiments": {"exp": {"value": {"directives": []}, "ruleID": "r1"}}
            }"#,
        )
        .unwrap();
        assert!(provider.dynamic_config("sidecar_dynamic_config").is_none());

        provider
            .initialize(&user(), &ClientOptions::default())
            .await
            .unwrap();
        assert!(provider.dynamic_config("sidecar_dynamic_config").is_some());
        let exp = provider.experiment("exp");
        assert_eq!(exp.rule_id, "r1");
        assert_eq!(exp.value, json!({"directives": []}));
        assert_eq!(provider.experiment("other").value, json!({}));
        assert_eq!(provider.user().map(|u| u.user_id), Some("u".to_string()));
    }

    #[tokio::test]
    async fn failure_is_reported() {
        let provider = StaticConfigProvider::default().with_failure("offline");
        let err = provider
            .initialize(&user(), &ClientOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::InitializationFailed("offline".to_string()));
        assert!(provider.user().is_none());
    }

    #[test]
    fn malformed_snapshot() {
        for raw in ["[]", "[{}, {}]", "42", "null", "{\"experiments\": []}", "{"] {
            assert!(
                matches!(
                    StaticConfigProvider::from_json(raw),
                    Err(ProviderError::MalformedPayload(_))
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn object_snapshot_parses() {
        let snapshot = ConfigSnapshot::from_json(r#"{"experiments": {"exp": {"ruleID": "r"}}}"#)
            .unwrap();
        assert_eq!(snapshot.experiments["exp"].rule_id, "r");
        assert!(snapshot.dynamic_configs.is_empty());
        assert_eq!(ConfigSnapshot::from_json("{}").unwrap(), ConfigSnapshot::default());
    }

    #[tokio::test]
    async fn tracing_sink_moves_events_on_flush() {
        let sink = TracingSink::new();
        sink.log_event(QueuedEvent::new("a"));
        assert_eq!(sink.buffered(), 1);
        sink.flush().await.unwrap();
        assert_eq!(sink.buffered(), 0);
        assert_eq!(sink.sent().len(), 1);
    }

    #[test]
    fn host_page_records_navigation() {
        let page = MemoryHostPage::new("https://a.example/").with_language("fr");
        page.navigate("https://b.example/");
        assert_eq!(page.href(), "https://b.example/");
        assert_eq!(page.navigations(), vec!["https://b.example/".to_string()]);
        assert_eq!(page.language(), "fr");
    }
}
