//! Mutation persistence
//!
//! Page scripts (hydration, carousels, A/B frameworks of their own) often
//! rewrite elements after a directive touched them. A watch re-runs the
//! directive whenever the nearest existing ancestor of its target mutates.
//!
//! Re-application must be idempotent: a re-run that changes nothing emits no
//! mutation records, so the observe/re-apply cycle settles on its own.

use crate::error::DirectiveResult;
use sidecar_dom::{Document, NodeId};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A running watch
///
/// Watches live for the lifetime of the page unless cancelled; dropping the
/// handle detaches the task without stopping it.
pub struct WatchHandle {
    selector: String,
    task: JoinHandle<()>,
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("selector", &self.selector)
            .field("active", &self.is_active())
            .finish()
    }
}

impl WatchHandle {
    /// Selector the watch re-applies
    #[inline]
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Whether the watch task is still running
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop re-applying; records already delivered are discarded
    pub fn cancel(&self) {
        tracing::trace!(selector = %self.selector, "watch cancelled");
        self.task.abort();
    }
}

/// Registers watches against a document
#[derive(Clone)]
pub struct Persistence {
    document: Arc<dyn Document>,
}

impl fmt::Debug for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}

impl Persistence {
    /// Persistence layer for `document`
    #[must_use]
    pub fn new(document: Arc<dyn Document>) -> Self {
        Self { document }
    }

    /// Run `reapply` now and again after every mutation near `selector`
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// The first run's error; no watch is registered in that case
    pub fn watch<F>(&self, selector: &str, reapply: F) -> DirectiveResult<WatchHandle>
    where
        F: Fn() -> DirectiveResult<()> + Send + Sync + 'static,
    {
        reapply()?;

        let target = self.resolve_target(selector);
        let mut stream = self.document.observe(target);
        let label = selector.to_string();
        tracing::trace!(selector, target = %target, "watch registered");

        let task = tokio::spawn(async move {
            while stream.recv().await.is_some() {
                // One re-application per batch of records.
                while stream.try_recv().is_ok() {}
                tokio::task::yield_now().await;
                while stream.try_recv().is_ok() {}

                if let Err(e) = reapply() {
                    tracing::debug!(selector = %label, error = %e, "re-application failed");
                }
            }
        });

        Ok(WatchHandle {
            selector: selector.to_string(),
            task,
        })
    }

    /// Nearest existing ancestor of whatever `selector` targets
    ///
    /// Falls back to `<body>`, then to the document's first child.
    #[must_use]
    pub fn resolve_target(&self, selector: &str) -> NodeId {
        let mut current = truncate_at_combinator(selector);
        while let Some(candidate) = current {
            if let Ok(Some(node)) = self.document.query_selector(&candidate) {
                return node;
            }
            current = truncate_at_combinator(&candidate);
        }
        self.document
            .body()
            .or_else(|| self.document.head())
            .unwrap_or(NodeId(0))
    }
}

fn is_combinator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '>' | '+' | '~')
}

/// Drop the last compound selector, `None` when nothing is left
fn truncate_at_combinator(selector: &str) -> Option<String> {
    let selector = selector.trim();
    let mut depth = 0_i32;
    let mut quote: Option<char> = None;
    let mut cut = None;

    for (i, c) in selector.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth -= 1,
            (None, _) if depth == 0 && is_combinator(c) => cut = Some(i),
            _ => {}
        }
    }

    let prefix = selector[..cut?].trim_end_matches(is_combinator);
    (!prefix.is_empty()).then(|| prefix.to_string())
}
