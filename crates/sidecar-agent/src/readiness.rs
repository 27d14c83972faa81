//! Client readiness
//!
//! Tracks whether the config provider finished initializing. The state moves
//! out of [`ReadinessState::Pending`] exactly once.

use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle of the provider client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    /// Initialization still running
    Pending,
    /// Provider initialized
    Ready,
    /// Initialization failed with the given reason
    Failed(String),
}

/// Shared, cloneable readiness flag
#[derive(Debug, Clone)]
pub struct ClientReadiness {
    state: Arc<watch::Sender<ReadinessState>>,
}

impl ClientReadiness {
    /// New readiness in the pending state
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(ReadinessState::Pending);
        Self {
            state: Arc::new(state),
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> ReadinessState {
        self.state.borrow().clone()
    }

    /// Whether the client is ready
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == ReadinessState::Ready
    }

    /// Transition to ready; `false` if already settled
    pub fn mark_ready(&self) -> bool {
        self.settle(ReadinessState::Ready)
    }

    /// Transition to failed; `false` if already settled
    pub fn mark_failed(&self, reason: impl Into<String>) -> bool {
        self.settle(ReadinessState::Failed(reason.into()))
    }

    fn settle(&self, next: ReadinessState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if *state == ReadinessState::Pending {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!(state = ?self.state(), "client readiness settled");
        }
        changed
    }

    /// Wait until the state leaves `Pending`
    pub async fn wait(&self) -> ReadinessState {
        let mut rx = self.state.subscribe();
        if let Ok(state) = rx.wait_for(|s| *s != ReadinessState::Pending).await {
            return state.clone();
        }
        self.state()
    }
}

impl Default for ClientReadiness {
    fn default() -> Self {
        Self::new()
    }
}
