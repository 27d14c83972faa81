//! Host event channel
//!
//! Host page code can hand directives to a running agent after setup through
//! the channel named `sidecar_<apikey>`. Only script injection is accepted on
//! this path; the agent acknowledges every event, `true` meaning the event
//! was handled (the default action is prevented).

use sidecar_core::Directive;
use tokio::sync::{mpsc, oneshot};

/// One directive pushed by host code
#[derive(Debug)]
pub struct HostEvent {
    /// Directive to apply
    pub directive: Directive,
    ack: oneshot::Sender<bool>,
}

impl HostEvent {
    /// Acknowledge the event
    pub fn acknowledge(self, handled: bool) {
        // The host may have stopped waiting.
        let _ = self.ack.send(handled);
    }
}

/// Receiving end, consumed by [`Sidecar::serve_host_events`](crate::Sidecar::serve_host_events)
pub type HostEventReceiver = mpsc::UnboundedReceiver<HostEvent>;

/// Sending end held by host code
#[derive(Debug, Clone)]
pub struct HostChannel {
    name: String,
    sender: mpsc::UnboundedSender<HostEvent>,
}

impl HostChannel {
    /// Channel name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a directive without waiting for the acknowledgement
    ///
    /// The returned receiver resolves to the acknowledgement, or errors if
    /// the agent is gone.
    pub fn dispatch(&self, directive: Directive) -> oneshot::Receiver<bool> {
        let (ack, receiver) = oneshot::channel();
        if self.sender.send(HostEvent { directive, ack }).is_err() {
            tracing::debug!(channel = %self.name, "no agent listening");
        }
        receiver
    }

    /// Send a directive and wait for the acknowledgement
    ///
    /// `false` when the agent rejected the directive or is not listening.
    pub async fn send(&self, directive: Directive) -> bool {
        self.dispatch(directive).await.unwrap_or(false)
    }
}

/// Open a named host channel
#[must_use]
pub fn host_channel(name: impl Into<String>) -> (HostChannel, HostEventReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        HostChannel {
            name: name.into(),
            sender,
        },
        receiver,
    )
}
