//! Page reveal gate
//!
//! Hides the body while experiments are applied so visitors never see the
//! control variant flash. A timer guarantees the page is shown even if setup
//! stalls.

use sidecar_core::config::{REVEAL_STYLE_BODY, REVEAL_STYLE_ID};
use sidecar_dom::{Document, DomResult};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Hides and restores page visibility
#[derive(Clone)]
pub struct RevealGate {
    document: Arc<dyn Document>,
    enabled: bool,
    timeout: Duration,
}

impl fmt::Debug for RevealGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevealGate")
            .field("enabled", &self.enabled)
            .field("timeout", &self.timeout)
            .field("hidden", &self.is_hidden())
            .finish_non_exhaustive()
    }
}

impl RevealGate {
    /// Gate over `document`
    #[must_use]
    pub fn new(document: Arc<dyn Document>, enabled: bool, timeout: Duration) -> Self {
        Self {
            document,
            enabled,
            timeout,
        }
    }

    /// Hide the body and arm the fallback timer
    ///
    /// Returns whether the body was hidden. Must be called from within a
    /// tokio runtime.
    ///
    /// # Errors
    /// Document errors while inserting the style element
    pub fn engage(&self) -> DomResult<bool> {
        if !self.enabled {
            return Ok(false);
        }
        if self.is_hidden() {
            return Ok(true);
        }
        let Some(head) = self.document.head() else {
            tracing::warn!("no <head>; page stays visible during setup");
            return Ok(false);
        };

        let style = self.document.create_element("style");
        self.document.set_attribute(style, "id", REVEAL_STYLE_ID)?;
        self.document.set_text_content(style, REVEAL_STYLE_BODY)?;
        self.document.append_child(head, style)?;

        let gate = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(gate.timeout).await;
            if gate.reveal() {
                tracing::info!(timeout_ms = gate.timeout.as_millis(), "reveal timeout elapsed");
            }
        });
        Ok(true)
    }

    /// Show the page; `false` if it was not hidden
    pub fn reveal(&self) -> bool {
        let Some(style) = self.document.element_by_id(REVEAL_STYLE_ID) else {
            return false;
        };
        match self.document.remove(style) {
            Ok(()) => {
                tracing::debug!("page revealed");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not remove reveal gate");
                false
            }
        }
    }

    /// Whether the gate element is in the document
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.document.element_by_id(REVEAL_STYLE_ID).is_some()
    }
}
