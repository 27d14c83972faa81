//! Testing utilities for the sidecar workspace
//!
//! Shared fixtures: a recording event sink, config snapshot builders, and a
//! harness wiring a [`Sidecar`] to in-memory capabilities.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sidecar_agent::{
    ConfigSnapshot, MemoryHostPage, MemoryStore, Sidecar, SidecarParts, SnapshotExperiment,
    StableIdStore, StaticConfigProvider,
};
use sidecar_core::{AgentConfig, ConfigProvider, EventSink, HostPage, QueuedEvent, SinkError};
use sidecar_dom::{Document, MemoryDocument};
use std::sync::Arc;
use std::time::Duration;

pub const DESKTOP_SAFARI_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) \
    AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15";

pub const DESKTOP_CHROME_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// What the sink saw, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Event(String),
    Flush,
}

/// Sink recording every call
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    events: Mutex<Vec<QueuedEvent>>,
    flush_delay: Option<Duration>,
    fail_flush: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flush takes `delay` before it records
    pub fn with_flush_delay(mut self, delay: Duration) -> Self {
        self.flush_delay = Some(delay);
        self
    }

    pub fn failing_flush(mut self) -> Self {
        self.fail_flush = true;
        self
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn events(&self) -> Vec<QueuedEvent> {
        self.events.lock().clone()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|e| e.event_name.clone())
            .collect()
    }

    pub fn flush_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| **c == SinkCall::Flush)
            .count()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    fn log_event(&self, event: QueuedEvent) {
        self.calls.lock().push(SinkCall::Event(event.event_name.clone()));
        self.events.lock().push(event);
    }

    async fn flush(&self) -> Result<(), SinkError> {
        if let Some(delay) = self.flush_delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().push(SinkCall::Flush);
        if self.fail_flush {
            return Err(SinkError::FlushFailed("transport closed".to_string()));
        }
        Ok(())
    }
}

/// Builds a [`ConfigSnapshot`] experiment by experiment
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    descriptors: Vec<Value>,
    experiments: Vec<(String, Value)>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor (raw JSON) and its directive list
    pub fn experiment(mut self, descriptor: Value, directives: Value) -> Self {
        let id = descriptor["id"].as_str().unwrap_or_default().to_string();
        self.descriptors.push(descriptor);
        self.experiments.push((id, directives));
        self
    }

    /// Add directives for an id that is not listed as a descriptor
    pub fn unlisted_experiment(mut self, id: &str, directives: Value) -> Self {
        self.experiments.push((id.to_string(), directives));
        self
    }

    /// Add a raw descriptor entry without directives
    pub fn raw_descriptor(mut self, descriptor: Value) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn build(self) -> ConfigSnapshot {
        let mut snapshot = ConfigSnapshot::default();
        snapshot.dynamic_configs.insert(
            "sidecar_dynamic_config".to_string(),
            json!({ "activeExperiments": self.descriptors }),
        );
        for (id, directives) in self.experiments {
            snapshot.experiments.insert(
                id.clone(),
                SnapshotExperiment {
                    value: json!({ "directives": directives }),
                    rule_id: format!("rule_{id}"),
                },
            );
        }
        snapshot
    }
}

/// A [`Sidecar`] wired to in-memory capabilities
pub struct Harness {
    pub document: Arc<MemoryDocument>,
    pub page: Arc<MemoryHostPage>,
    pub provider: Arc<StaticConfigProvider>,
    pub sink: Arc<RecordingSink>,
    pub store: Arc<MemoryStore>,
    pub agent: Arc<Sidecar>,
}

/// Configures a [`Harness`]
pub struct HarnessBuilder {
    config: AgentConfig,
    document: Arc<MemoryDocument>,
    href: String,
    user_agent: String,
    provider: StaticConfigProvider,
    sink: RecordingSink,
}

impl HarnessBuilder {
    pub fn new(markup: &str) -> Self {
        Self::with_document(MemoryDocument::parse(markup).unwrap())
    }

    pub fn loading(markup: &str) -> Self {
        Self::with_document(MemoryDocument::loading(markup).unwrap())
    }

    pub fn with_document(document: MemoryDocument) -> Self {
        Self {
            config: AgentConfig::new("client-test"),
            document: Arc::new(document),
            href: "https://shop.example/".to_string(),
            user_agent: DESKTOP_CHROME_UA.to_string(),
            provider: StaticConfigProvider::default(),
            sink: RecordingSink::new(),
        }
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn href(mut self, href: &str) -> Self {
        self.href = href.to_string();
        self
    }

    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn snapshot(mut self, snapshot: ConfigSnapshot) -> Self {
        self.provider = StaticConfigProvider::new(snapshot);
        self
    }

    pub fn provider(mut self, provider: StaticConfigProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn sink(mut self, sink: RecordingSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> Harness {
        let page = Arc::new(MemoryHostPage::new(self.href).with_user_agent(self.user_agent));
        let provider = Arc::new(self.provider);
        let sink = Arc::new(self.sink);
        let store = Arc::new(MemoryStore::new());
        let agent = Sidecar::new(
            self.config,
            SidecarParts {
                document: Arc::clone(&self.document) as Arc<dyn Document>,
                page: Arc::clone(&page) as Arc<dyn HostPage>,
                provider: Arc::clone(&provider) as Arc<dyn ConfigProvider>,
                sink: Arc::clone(&sink) as Arc<dyn EventSink>,
                store: Arc::clone(&store) as Arc<dyn StableIdStore>,
            },
        );
        Harness {
            document: self.document,
            page,
            provider,
            sink,
            store,
            agent: Arc::new(agent),
        }
    }
}

impl Harness {
    /// Inner markup of the element with `id`
    pub fn inner_html_of(&self, id: &str) -> String {
        let node = self.document.element_by_id(id).unwrap();
        self.document.inner_html(node).unwrap()
    }

    /// Attribute of the element with `id`
    pub fn attribute_of(&self, id: &str, name: &str) -> Option<String> {
        let node = self.document.element_by_id(id).unwrap();
        self.document.attribute(node, name).unwrap()
    }

    pub fn is_hidden(&self) -> bool {
        self.document.element_by_id("__sbpd").is_some()
    }
}

/// Let spawned watch tasks observe pending mutations and re-apply
pub async fn settle_watches() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
