//! The agent context
//!
//! [`Sidecar`] owns every moving part of the agent and runs the bootstrap
//! sequence:
//!
//! 1. Hide the page (reveal gate)
//! 2. Initialize the provider for the resolved end user
//! 3. Drain queued analytics
//! 4. Select experiments (explicit ids or URL matching)
//! 5. Apply each experiment's directives, then the deferred ones
//! 6. Reveal the page

use crate::channel::{host_channel, HostChannel, HostEventReceiver};
use crate::error::{DirectiveError, Result, SidecarError};
use crate::identity::{end_user, StableIdStore};
use crate::interpreter::{ApplyReport, Interpreter};
use crate::queue::EventQueue;
use crate::readiness::ClientReadiness;
use crate::redirect::{RedirectOutcome, Redirector};
use crate::reveal::RevealGate;
use serde_json::Value;
use sidecar_core::config::{ACTIVE_EXPERIMENTS_KEY, DIRECTIVES_KEY, SIDECAR_CONFIG_NAME};
use sidecar_core::{
    auto_run_experiments, matching_experiments, normalize_url, AgentConfig, ConfigProvider,
    Directive, EventSink, ExperimentDescriptor, HostPage, ProviderError, QueuedEvent,
};
use sidecar_dom::Document;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// How [`Sidecar::setup`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Experiments were selected and applied
    Completed {
        /// Ids of the experiments run, in order
        experiments: Vec<String>,
        /// Directive outcome counts
        report: ApplyReport,
    },
    /// Client initialized, `autostart` off
    AutoStartDisabled,
    /// Provider could not be initialized; nothing was applied
    ProviderFailed(ProviderError),
}

/// Capabilities a [`Sidecar`] is assembled from
pub struct SidecarParts {
    /// Live document
    pub document: Arc<dyn Document>,
    /// Hosting page
    pub page: Arc<dyn HostPage>,
    /// Remote experiment store
    pub provider: Arc<dyn ConfigProvider>,
    /// Analytics transport
    pub sink: Arc<dyn EventSink>,
    /// Stable id storage
    pub store: Arc<dyn StableIdStore>,
}

/// The experiment agent
pub struct Sidecar {
    config: AgentConfig,
    page: Arc<dyn HostPage>,
    provider: Arc<dyn ConfigProvider>,
    store: Arc<dyn StableIdStore>,
    queue: Arc<EventQueue>,
    readiness: ClientReadiness,
    redirector: Arc<Redirector>,
    interpreter: Interpreter,
    reveal: RevealGate,
}

impl fmt::Debug for Sidecar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sidecar")
            .field("api_key", &self.config.api_key)
            .field("readiness", &self.readiness.state())
            .field("queue", &self.queue)
            .field("interpreter", &self.interpreter)
            .finish_non_exhaustive()
    }
}

impl Sidecar {
    /// Assemble an agent
    #[must_use]
    pub fn new(config: AgentConfig, parts: SidecarParts) -> Self {
        let queue = Arc::new(EventQueue::new(parts.sink));
        let readiness = ClientReadiness::new();
        let redirector = Arc::new(Redirector::new(
            Arc::clone(&parts.page),
            Arc::clone(&queue),
            readiness.clone(),
        ));
        let interpreter = Interpreter::new(Arc::clone(&parts.document), Arc::clone(&redirector))
            .with_nonce(config.nonce.clone())
            .with_image_override_attributes(config.image_override_attributes.clone());
        let reveal = RevealGate::new(
            parts.document,
            config.reduce_flicker,
            config.reveal_timeout(),
        );

        Self {
            config,
            page: parts.page,
            provider: parts.provider,
            store: parts.store,
            queue,
            readiness,
            redirector,
            interpreter,
            reveal,
        }
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Client readiness
    #[inline]
    #[must_use]
    pub fn readiness(&self) -> &ClientReadiness {
        &self.readiness
    }

    /// Event queue
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Directive interpreter
    #[inline]
    #[must_use]
    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Run the bootstrap sequence
    pub async fn setup(&self) -> SetupOutcome {
        match self.reveal.engage() {
            Ok(hidden) => tracing::debug!(hidden, "reveal gate engaged"),
            Err(e) => tracing::warn!(error = %e, "could not hide page"),
        }

        let user = end_user(
            self.store.as_ref(),
            self.page.as_ref(),
            self.config.override_user.as_deref(),
        );
        tracing::info!(api_key = %self.config.api_key, user_id = %user.user_id, "initializing sidecar");

        if let Err(e) = self.provider.initialize(&user, &self.config.client).await {
            tracing::error!(error = %e, "config fetch failed; page revealed without experiments");
            self.readiness.mark_failed(e.to_string());
            self.queue.follow(&self.readiness).await;
            self.reveal.reveal();
            return SetupOutcome::ProviderFailed(e);
        }

        self.readiness.mark_ready();
        self.queue.follow(&self.readiness).await;
        if let Err(e) = self.queue.flush().await {
            tracing::warn!(error = %e, "flushing queued events failed");
        }

        if !self.config.auto_start {
            tracing::info!("autostart disabled; no experiments applied");
            self.reveal.reveal();
            return SetupOutcome::AutoStartDisabled;
        }

        let descriptors = self.descriptors();
        let selected: Vec<(String, Option<ExperimentDescriptor>)> =
            match &self.config.experiment_ids {
                Some(ids) => ids
                    .iter()
                    .map(|id| (id.clone(), descriptors.iter().find(|d| d.id == *id).cloned()))
                    .collect(),
                None => {
                    let url = normalize_url(&self.page.href());
                    auto_run_experiments(&descriptors, &url)
                        .into_iter()
                        .map(|d| (d.id.clone(), Some(d.clone())))
                        .collect()
                }
            };

        let mut report = ApplyReport::default();
        for (id, descriptor) in &selected {
            report.merge(self.run_experiment(id, descriptor.as_ref()).await);
        }
        report.merge(self.interpreter.settle().await);
        self.reveal.reveal();

        let experiments: Vec<String> = selected.into_iter().map(|(id, _)| id).collect();
        tracing::info!(
            experiments = ?experiments,
            applied = report.applied,
            failed = report.failed,
            "sidecar setup complete"
        );
        SetupOutcome::Completed {
            experiments,
            report,
        }
    }

    /// Record an analytics event
    pub fn log_event(
        &self,
        event_name: impl Into<String>,
        value: impl Into<Value>,
        metadata: BTreeMap<String, String>,
    ) {
        self.queue.log_event(QueuedEvent {
            event_name: event_name.into(),
            value: value.into(),
            metadata,
        });
    }

    /// Experiments matching the current page, including manual-only ones
    #[must_use]
    pub fn matching_experiments(&self) -> Vec<ExperimentDescriptor> {
        let url = normalize_url(&self.page.href());
        let descriptors = self.descriptors();
        matching_experiments(&descriptors, &url)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Apply one matching experiment on demand
    ///
    /// # Errors
    /// - `SidecarError::NotReady` before the provider initialized
    /// - `SidecarError::ExperimentNotMatched` if `id` does not match the page
    pub async fn activate_experiment(&self, id: &str) -> Result<ApplyReport> {
        if !self.readiness.is_ready() {
            return Err(SidecarError::NotReady);
        }
        let descriptor = self
            .matching_experiments()
            .into_iter()
            .find(|d| d.id == id)
            .ok_or_else(|| SidecarError::ExperimentNotMatched(id.to_string()))?;

        let mut report = self.run_experiment(id, Some(&descriptor)).await;
        report.merge(self.interpreter.settle().await);
        Ok(report)
    }

    /// Redirect the page, preserving queued analytics
    pub async fn redirect_page(&self, url: &str) -> RedirectOutcome {
        self.redirector.redirect(url).await
    }

    /// Show the page now
    pub fn reveal(&self) -> bool {
        self.reveal.reveal()
    }

    /// Open the host channel named after this agent's api key
    #[must_use]
    pub fn open_host_channel(&self) -> (HostChannel, HostEventReceiver) {
        host_channel(self.config.host_channel_name())
    }

    /// Apply host-pushed directives until every sender is dropped
    pub async fn serve_host_events(&self, mut receiver: HostEventReceiver) {
        while let Some(event) = receiver.recv().await {
            let handled = match &event.directive {
                Directive::InjectScript { .. } => {
                    match self.interpreter.apply(event.directive.clone()).await {
                        Ok(_) => true,
                        Err(e) => {
                            tracing::warn!(error = %e, "host directive failed");
                            false
                        }
                    }
                }
                other => {
                    let e = DirectiveError::Rejected(other.action_type());
                    tracing::warn!(error = %e, "host directive rejected");
                    false
                }
            };
            event.acknowledge(handled);
        }
        tracing::debug!("host channel closed");
    }

    fn descriptors(&self) -> Vec<ExperimentDescriptor> {
        let Some(config) = self.provider.dynamic_config(SIDECAR_CONFIG_NAME) else {
            tracing::debug!("no sidecar dynamic config");
            return Vec::new();
        };
        ExperimentDescriptor::decode_list(config.get(ACTIVE_EXPERIMENTS_KEY, Vec::new()))
    }

    async fn run_experiment(
        &self,
        id: &str,
        descriptor: Option<&ExperimentDescriptor>,
    ) -> ApplyReport {
        let experiment = self.provider.experiment(id);
        let directives: Value = experiment.get(DIRECTIVES_KEY, Value::Array(Vec::new()));
        tracing::info!(experiment = id, rule_id = %experiment.rule_id, "running experiment");

        let mut entries = Vec::new();
        if let Some(script) = descriptor.and_then(|d| d.prerun_script.clone()) {
            entries.push(Ok(Directive::InjectScript { value: script }));
        }
        entries.extend(Directive::decode_list(&directives));
        self.interpreter.apply_list(id, entries).await
    }
}
