//! Directive interpreter
//!
//! Applies directives in submission order. Injections run immediately;
//! directives touching existing elements wait for the document to become
//! interactive and are then registered with the persistence layer so they
//! survive later rewrites by page scripts.
//!
//! At most one watch exists per target and directive kind. A later directive
//! for the same target replaces the earlier watch, so two experiments
//! rewriting one element cannot undo each other forever. Style changes are
//! additive and keyed by their declarations as well.

use crate::error::{DirectiveError, DirectiveResult};
use crate::persistence::{Persistence, WatchHandle};
use crate::redirect::Redirector;
use parking_lot::Mutex;
use sidecar_core::{DecodeError, Directive, ReorderOperator};
use sidecar_dom::{Document, NodeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Result of submitting one directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Executed (possibly as a no-op)
    Now,
    /// Parked until the document is interactive
    Deferred,
}

/// Counts of directive outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Directives executed
    pub applied: usize,
    /// Directives parked until the document is interactive
    pub deferred: usize,
    /// Directives that failed to decode or apply
    pub failed: usize,
}

impl ApplyReport {
    /// Fold another report into this one
    pub fn merge(&mut self, other: ApplyReport) {
        self.applied += other.applied;
        self.deferred += other.deferred;
        self.failed += other.failed;
    }

    fn record(&mut self, result: &DirectiveResult<Applied>) {
        match result {
            Ok(Applied::Now) => self.applied += 1,
            Ok(Applied::Deferred) => self.deferred += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Applies directives against a document
pub struct Interpreter {
    document: Arc<dyn Document>,
    persistence: Persistence,
    redirector: Arc<Redirector>,
    nonce: Option<String>,
    image_override_attributes: Arc<[String]>,
    pending: Mutex<Vec<Directive>>,
    watches: Mutex<HashMap<String, WatchHandle>>,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("pending", &self.pending_len())
            .field("watches", &self.watch_count())
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Interpreter over `document`
    #[must_use]
    pub fn new(document: Arc<dyn Document>, redirector: Arc<Redirector>) -> Self {
        Self {
            persistence: Persistence::new(Arc::clone(&document)),
            document,
            redirector,
            nonce: None,
            image_override_attributes: Arc::from(vec!["srcset".to_string()]),
            pending: Mutex::new(Vec::new()),
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// With CSP nonce for injected scripts
    #[inline]
    #[must_use]
    pub fn with_nonce(mut self, nonce: Option<String>) -> Self {
        self.nonce = nonce;
        self
    }

    /// With attributes removed by `image-change`
    #[inline]
    #[must_use]
    pub fn with_image_override_attributes(mut self, attrs: Vec<String>) -> Self {
        self.image_override_attributes = Arc::from(attrs);
        self
    }

    /// Directives waiting for the document
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Registered persistence watches
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watches.lock().len()
    }

    /// Submit one directive
    ///
    /// # Errors
    /// `DirectiveError` when the directive could not be applied
    pub async fn apply(&self, directive: Directive) -> DirectiveResult<Applied> {
        if directive.requires_dom() {
            let mut pending = self.pending.lock();
            if !pending.is_empty() || !self.document.ready_state().is_interactive() {
                tracing::debug!(action = directive.action_type(), "directive deferred until interactive");
                pending.push(directive);
                return Ok(Applied::Deferred);
            }
        }
        self.execute(directive).await.map(|()| Applied::Now)
    }

    /// Submit a decoded directive list, isolating failures
    pub async fn apply_list(
        &self,
        experiment: &str,
        entries: Vec<Result<Directive, DecodeError>>,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        for entry in entries {
            let (action, result) = match entry {
                Ok(directive) => (directive.action_type(), self.apply(directive).await),
                Err(e) => ("undecoded", Err(DirectiveError::from(e))),
            };
            if let Err(e) = &result {
                tracing::warn!(experiment, action, error = %e, "directive skipped");
            }
            report.record(&result);
        }
        report
    }

    /// Wait for the document and apply every deferred directive in order
    pub async fn settle(&self) -> ApplyReport {
        let mut report = ApplyReport::default();
        if self.pending_len() == 0 {
            return report;
        }
        self.document.until_interactive().await;

        loop {
            let batch = std::mem::take(&mut *self.pending.lock());
            if batch.is_empty() {
                break;
            }
            for directive in batch {
                let action = directive.action_type();
                let result = self.execute(directive).await.map(|()| Applied::Now);
                if let Err(e) = &result {
                    tracing::warn!(action, error = %e, "deferred directive skipped");
                }
                report.record(&result);
            }
        }
        tracing::debug!(applied = report.applied, failed = report.failed, "deferred directives settled");
        report
    }

    async fn execute(&self, directive: Directive) -> DirectiveResult<()> {
        match directive {
            Directive::InjectScript { value } => {
                inject(self.document.as_ref(), "script", &value, self.nonce.as_deref())
            }
            Directive::InjectStyle { value } => {
                inject(self.document.as_ref(), "style", &value, None)
            }
            Directive::RedirectPage { value } => {
                self.redirector.redirect(&value).await;
                Ok(())
            }
            Directive::ContentChange { query_path, value } => {
                let doc = Arc::clone(&self.document);
                let selector = query_path.clone();
                let signature = Mutex::new(None);
                let key = watch_key("content-change", &query_path);
                self.persist(key, &query_path, move || {
                    content_change(doc.as_ref(), &selector, &value, &signature)
                })
            }
            Directive::StyleChange { query_path, value } => {
                let doc = Arc::clone(&self.document);
                let selector = query_path.clone();
                let key = format!("{}\u{0}{value}", watch_key("style-change", &query_path));
                self.persist(key, &query_path, move || {
                    style_change(doc.as_ref(), &selector, &value)
                })
            }
            Directive::ImageChange { query_path, value } => {
                let doc = Arc::clone(&self.document);
                let selector = query_path.clone();
                let overrides = Arc::clone(&self.image_override_attributes);
                let key = watch_key("image-change", &query_path);
                self.persist(key, &query_path, move || {
                    image_change(doc.as_ref(), &selector, &value, &overrides)
                })
            }
            Directive::ReorderElement {
                query_path,
                anchor_query_path,
                operator,
            } => {
                let doc = Arc::clone(&self.document);
                let selector = query_path.clone();
                let key = watch_key("reorder-element", &query_path);
                self.persist(key, &query_path, move || {
                    reorder(doc.as_ref(), &selector, &anchor_query_path, operator)
                })
            }
        }
    }

    /// Apply and watch `reapply`, replacing any watch registered under `key`
    fn persist<F>(&self, key: String, selector: &str, reapply: F) -> DirectiveResult<()>
    where
        F: Fn() -> DirectiveResult<()> + Send + Sync + 'static,
    {
        let handle = self.persistence.watch(selector, reapply)?;
        // No await since the first run, so the replaced task has not seen
        // the records it produced.
        if let Some(replaced) = self.watches.lock().insert(key, handle) {
            tracing::debug!(selector, "superseded earlier watch");
            replaced.cancel();
        }
        Ok(())
    }
}

fn watch_key(kind: &str, selector: &str) -> String {
    format!("{kind}\u{0}{}", selector.trim())
}

fn inject(doc: &dyn Document, tag: &str, body: &str, nonce: Option<&str>) -> DirectiveResult<()> {
    let head = doc.head().ok_or(DirectiveError::MissingHead)?;
    let element = doc.create_element(tag);
    if let Some(nonce) = nonce {
        doc.set_attribute(element, "nonce", nonce)?;
    }
    doc.set_text_content(element, body)?;
    doc.append_child(head, element)?;
    Ok(())
}

/// `signature` holds the markup as read back after the last write, which
/// may differ from `value` once the document normalizes it.
fn content_change(
    doc: &dyn Document,
    selector: &str,
    value: &str,
    signature: &Mutex<Option<String>>,
) -> DirectiveResult<()> {
    let Some(node) = doc.query_selector(selector)? else {
        return Ok(());
    };
    let current = doc.inner_html(node)?;
    let mut signature = signature.lock();
    if current == value || signature.as_deref() == Some(current.as_str()) {
        return Ok(());
    }
    doc.set_inner_html(node, value)?;
    *signature = Some(doc.inner_html(node)?);
    Ok(())
}

fn style_change(doc: &dyn Document, selector: &str, value: &str) -> DirectiveResult<()> {
    let Some(node) = doc.query_selector(selector)? else {
        return Ok(());
    };
    let current = doc.attribute(node, "style")?.unwrap_or_default();
    if current.contains(value) {
        return Ok(());
    }
    let base = current.trim_end();
    let style = if base.is_empty() {
        value.to_string()
    } else if base.ends_with(';') {
        format!("{base} {value}")
    } else {
        format!("{base}; {value}")
    };
    doc.set_attribute(node, "style", &style)?;
    Ok(())
}

fn image_change(
    doc: &dyn Document,
    selector: &str,
    value: &str,
    overrides: &[String],
) -> DirectiveResult<()> {
    let Some(node) = doc.query_selector(selector)? else {
        return Ok(());
    };
    if doc.attribute(node, "src")?.as_deref() != Some(value) {
        doc.set_attribute(node, "src", value)?;
    }
    for attr in overrides {
        doc.remove_attribute(node, attr)?;
    }
    Ok(())
}

fn reorder(
    doc: &dyn Document,
    selector: &str,
    anchor_selector: &str,
    operator: ReorderOperator,
) -> DirectiveResult<()> {
    let (Some(target), Some(anchor)) = (
        doc.query_selector(selector)?,
        doc.query_selector(anchor_selector)?,
    ) else {
        return Ok(());
    };
    if target == anchor || in_position(doc, target, anchor, operator) {
        return Ok(());
    }

    match operator {
        ReorderOperator::Before => {
            let Some(parent) = doc.parent(anchor) else {
                return Ok(());
            };
            doc.insert_before(parent, target, Some(anchor))?;
        }
        ReorderOperator::After => {
            let Some(parent) = doc.parent(anchor) else {
                return Ok(());
            };
            doc.insert_before(parent, target, doc.next_sibling(anchor))?;
        }
        ReorderOperator::First => {
            doc.insert_before(anchor, target, doc.first_child(anchor))?;
        }
        ReorderOperator::Last => doc.append_child(anchor, target)?,
    }
    Ok(())
}

fn in_position(doc: &dyn Document, target: NodeId, anchor: NodeId, op: ReorderOperator) -> bool {
    match op {
        ReorderOperator::Before => doc.next_element_sibling(target) == Some(anchor),
        ReorderOperator::After => doc.previous_element_sibling(target) == Some(anchor),
        ReorderOperator::First => doc.first_element_child(anchor) == Some(target),
        ReorderOperator::Last => doc.last_element_child(anchor) == Some(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::EventQueue;
    use crate::readiness::ClientReadiness;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use sidecar_core::{EventSink, HostPage, QueuedEvent, SinkError};
    use sidecar_dom::{MemoryDocument, ReadyState};

    struct NullSink;

    #[async_trait]
    impl EventSink for NullSink {
        fn log_event(&self, _event: QueuedEvent) {}

        async fn flush(&self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    struct StaticPage;

    impl HostPage for StaticPage {
        fn href(&self) -> String {
            "https://shop.example/".to_string()
        }

        fn user_agent(&self) -> String {
            String::new()
        }

        fn language(&self) -> String {
            "en-US".to_string()
        }

        fn navigate(&self, _url: &str) {}
    }

    fn interpreter(doc: &Arc<MemoryDocument>) -> Interpreter {
        let queue = Arc::new(EventQueue::new(Arc::new(NullSink)));
        let redirector = Arc::new(Redirector::new(
            Arc::new(StaticPage),
            queue,
            ClientReadiness::new(),
        ));
        Interpreter::new(Arc::clone(doc) as Arc<dyn Document>, redirector)
    }

    fn content(selector: &str, value: &str) -> Directive {
        Directive::ContentChange {
            query_path: selector.to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn content_change_sets_markup() {
        let doc = Arc::new(MemoryDocument::parse(r#"<h1 id="t">Old</h1>"#).unwrap());
        let interp = interpreter(&doc);
        assert_eq!(interp.apply(content("#t", "<em>New</em>")).await, Ok(Applied::Now));
        let node = doc.element_by_id("t").unwrap();
        assert_eq!(doc.inner_html(node).unwrap(), "<em>New</em>");
        assert_eq!(interp.watch_count(), 1);
    }

    #[tokio::test]
    async fn later_content_change_replaces_watch() {
        let doc = Arc::new(MemoryDocument::parse(r#"<h1 id="t">Old</h1>"#).unwrap());
        let interp = interpreter(&doc);
        interp.apply(content("#t", "A")).await.unwrap();
        interp.apply(content("#t", "B")).await.unwrap();
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        let node = doc.element_by_id("t").unwrap();
        assert_eq!(doc.inner_html(node).unwrap(), "B");
        assert_eq!(interp.watch_count(), 1);

        let settled = doc.mutation_count();
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert_eq!(doc.mutation_count(), settled);
    }

    #[tokio::test]
    async fn unresolved_selector_is_a_no_op() {
        let doc = Arc::new(MemoryDocument::parse("<p>x</p>").unwrap());
        let interp = interpreter(&doc);
        let before = doc.mutation_count();
        assert_eq!(interp.apply(content("#nope", "y")).await, Ok(Applied::Now));
        assert_eq!(doc.mutation_count(), before);
    }

    #[tokio::test]
    async fn invalid_selector_fails() {
        let doc = Arc::new(MemoryDocument::parse("<p>x</p>").unwrap());
        let interp = interpreter(&doc);
        let err = interp.apply(content("p[", "y")).await.unwrap_err();
        assert!(matches!(err, DirectiveError::Dom(_)));
        assert_eq!(interp.watch_count(), 0);
    }

    #[tokio::test]
    async fn style_change_appends_once() {
        let doc = Arc::new(MemoryDocument::parse(r#"<p id="p" style="color: red">x</p>"#).unwrap());
        let interp = interpreter(&doc);
        let directive = Directive::StyleChange {
            query_path: "#p".to_string(),
            value: "font-weight: bold".to_string(),
        };
        interp.apply(directive.clone()).await.unwrap();
        interp.apply(directive).await.unwrap();
        let node = doc.element_by_id("p").unwrap();
        assert_eq!(
            doc.attribute(node, "style").unwrap().as_deref(),
            Some("color: red; font-weight: bold")
        );
    }

    #[tokio::test]
    async fn image_change_drops_srcset() {
        let doc = Arc::new(
            MemoryDocument::parse(r#"<img id="hero" src="a.png" srcset="a@2x.png 2x">"#).unwrap(),
        );
        let interp = interpreter(&doc);
        interp
            .apply(Directive::ImageChange {
                query_path: "#hero".to_string(),
                value: "b.png".to_string(),
            })
            .await
            .unwrap();
        let img = doc.element_by_id("hero").unwrap();
        assert_eq!(doc.attribute(img, "src").unwrap().as_deref(), Some("b.png"));
        assert_eq!(doc.attribute(img, "srcset").unwrap(), None);
    }

    #[tokio::test]
    async fn reorder_operators() {
        let markup = r#"<ul id="list"><li id="a"></li><li id="b"></li><li id="c"></li></ul>"#;
        let cases = [
            (ReorderOperator::Before, "#c", "#a", vec!["c", "a", "b"]),
            (ReorderOperator::After, "#a", "#c", vec!["b", "c", "a"]),
            (ReorderOperator::First, "#c", "#list", vec!["c", "a", "b"]),
            (ReorderOperator::Last, "#a", "#list", vec!["b", "c", "a"]),
        ];
        for (operator, target, anchor, expected) in cases {
            let doc = Arc::new(MemoryDocument::parse(markup).unwrap());
            let interp = interpreter(&doc);
            interp
                .apply(Directive::ReorderElement {
                    query_path: target.to_string(),
                    anchor_query_path: anchor.to_string(),
                    operator,
                })
                .await
                .unwrap();
            let list = doc.element_by_id("list").unwrap();
            let ids: Vec<String> = doc
                .element_children(list)
                .into_iter()
                .filter_map(|n| doc.attribute(n, "id").unwrap())
                .collect();
            assert_eq!(ids, expected, "{operator:?}");
        }
    }

    #[tokio::test]
    async fn reorder_in_position_emits_nothing() {
        let doc = Arc::new(
            MemoryDocument::parse(r#"<div id="p"><span id="a"></span><span id="b"></span></div>"#)
                .unwrap(),
        );
        let interp = interpreter(&doc);
        let before = doc.mutation_count();
        interp
            .apply(Directive::ReorderElement {
                query_path: "#a".to_string(),
                anchor_query_path: "#b".to_string(),
                operator: ReorderOperator::Before,
            })
            .await
            .unwrap();
        assert_eq!(doc.mutation_count(), before);
    }

    #[tokio::test]
    async fn injections_carry_nonce_and_run_while_loading() {
        let doc = Arc::new(MemoryDocument::loading("").unwrap());
        let interp = interpreter(&doc).with_nonce(Some("n0nce".to_string()));
        interp
            .apply(Directive::InjectScript { value: "run()".to_string() })
            .await
            .unwrap();
        interp
            .apply(Directive::InjectStyle { value: "p{}".to_string() })
            .await
            .unwrap();
        let head = doc.head().unwrap();
        assert_eq!(
            doc.inner_html(head).unwrap(),
            r#"<script nonce="n0nce">run()</script><style>p{}</style>"#
        );
    }

    #[tokio::test]
    async fn dom_directives_wait_for_interactive() {
        let doc = Arc::new(MemoryDocument::loading(r#"<h1 id="t">Old</h1>"#).unwrap());
        let interp = interpreter(&doc);
        assert_eq!(interp.apply(content("#t", "One")).await, Ok(Applied::Deferred));
        assert_eq!(interp.pending_len(), 1);
        let node = doc.element_by_id("t").unwrap();
        assert_eq!(doc.inner_html(node).unwrap(), "Old");

        doc.set_ready_state(ReadyState::Interactive);
        let report = interp.settle().await;
        assert_eq!(report.applied, 1);
        assert_eq!(doc.inner_html(node).unwrap(), "One");
        assert_eq!(interp.pending_len(), 0);
    }

    #[tokio::test]
    async fn apply_list_isolates_failures() {
        let doc = Arc::new(MemoryDocument::parse(r#"<h1 id="t">Old</h1>"#).unwrap());
        let interp = interpreter(&doc);
        let entries = vec![
            Ok(content("p[", "bad")),
            Err(DecodeError {
                index: 1,
                message: "unknown variant".to_string(),
            }),
            Ok(content("#t", "New")),
        ];
        let report = interp.apply_list("exp", entries).await;
        assert_eq!(
            report,
            ApplyReport {
                applied: 1,
                deferred: 0,
                failed: 2
            }
        );
        let node = doc.element_by_id("t").unwrap();
        assert_eq!(doc.inner_html(node).unwrap(), "New");
    }
}
