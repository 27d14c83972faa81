//! In-memory [`Document`] implementation
//!
//! Backs the simulator and the test suites. Mutations made through the
//! [`Document`] trait are reported to observers the same way a browser's
//! `MutationObserver` would see them: one record per attribute change or
//! child-list change, delivered to every subscription whose target is an
//! inclusive ancestor of the mutated node.

use crate::document::{
    Document, MutationKind, MutationRecord, MutationStream, NodeId, ReadyState,
};
use crate::error::DomResult;
use crate::html::{parse_into, serialize_children};
use crate::selector::SelectorList;
use crate::tree::{Element, NodeKind, Tree};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use tokio::sync::{mpsc, watch};

struct Observer {
    target: NodeId,
    sender: mpsc::UnboundedSender<MutationRecord>,
}

/// Document held entirely in process memory
pub struct MemoryDocument {
    tree: Mutex<Tree>,
    observers: Mutex<Vec<Observer>>,
    ready: watch::Sender<ReadyState>,
    mutation_count: Mutex<usize>,
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDocument")
            .field("ready_state", &*self.ready.borrow())
            .field("observers", &self.observers.lock().len())
            .finish_non_exhaustive()
    }
}

impl MemoryDocument {
    /// Parse a full page in the `complete` state
    ///
    /// Missing `<html>`, `<head>` or `<body>` elements are synthesized so
    /// every document has both insertion points.
    ///
    /// # Errors
    /// Propagates tree errors from the parser; well-formed input never fails
    pub fn parse(markup: &str) -> DomResult<Self> {
        Self::parse_with_state(markup, ReadyState::Complete)
    }

    /// Parse a page that is still `loading`
    ///
    /// # Errors
    /// See [`MemoryDocument::parse`]
    pub fn loading(markup: &str) -> DomResult<Self> {
        Self::parse_with_state(markup, ReadyState::Loading)
    }

    /// Parse with an explicit initial ready state
    ///
    /// # Errors
    /// See [`MemoryDocument::parse`]
    pub fn parse_with_state(markup: &str, state: ReadyState) -> DomResult<Self> {
        let mut tree = Tree::new();
        let root = tree.root();
        parse_into(&mut tree, root, markup)?;
        ensure_skeleton(&mut tree)?;
        let (ready, _) = watch::channel(state);
        Ok(Self {
            tree: Mutex::new(tree),
            observers: Mutex::new(Vec::new()),
            ready,
            mutation_count: Mutex::new(0),
        })
    }

    /// Advance the loading state, waking readiness waiters
    pub fn set_ready_state(&self, state: ReadyState) {
        tracing::debug!(state = %state, "document ready state changed");
        self.ready.send_replace(state);
    }

    /// Serialized document
    #[must_use]
    pub fn html(&self) -> String {
        let tree = self.tree.lock();
        serialize_children(&tree, tree.root())
    }

    /// Total mutation records produced so far, observed or not
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        *self.mutation_count.lock()
    }

    /// Number of live subscriptions
    #[must_use]
    pub fn observer_count(&self) -> usize {
        let mut observers = self.observers.lock();
        observers.retain(|o| !o.sender.is_closed());
        observers.len()
    }

    /// Element children of `node`
    #[must_use]
    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree.lock().element_children(node).collect()
    }

    fn notify(&self, tree: &Tree, records: Vec<MutationRecord>) {
        if records.is_empty() {
            return;
        }
        *self.mutation_count.lock() += records.len();
        let mut observers = self.observers.lock();
        observers.retain(|observer| {
            for record in &records {
                if tree.is_inclusive_ancestor(observer.target, record.target)
                    && observer.sender.send(record.clone()).is_err()
                {
                    return false;
                }
            }
            !observer.sender.is_closed()
        });
    }

    fn child_list(target: NodeId) -> MutationRecord {
        MutationRecord {
            target,
            kind: MutationKind::ChildList,
        }
    }
}

fn ensure_skeleton(tree: &mut Tree) -> DomResult<()> {
    let root = tree.root();
    let html = match tree.find_tag("html") {
        Some(html) => html,
        None => {
            let html = tree.create(NodeKind::Element(Element::new("html")));
            let loose: Vec<NodeId> = tree.children(root).to_vec();
            tree.insert(root, html, None)?;
            let body = tree.create(NodeKind::Element(Element::new("body")));
            tree.insert(html, body, None)?;
            for node in loose {
                tree.insert(body, node, None)?;
            }
            html
        }
    };
    let body = match tree.find_tag("body") {
        Some(body) => body,
        None => {
            let body = tree.create(NodeKind::Element(Element::new("body")));
            tree.insert(html, body, None)?;
            body
        }
    };
    if tree.find_tag("head").is_none() {
        let head = tree.create(NodeKind::Element(Element::new("head")));
        let parent = tree.parent(body).unwrap_or(html);
        tree.insert(parent, head, Some(body))?;
    }
    Ok(())
}

#[async_trait]
impl Document for MemoryDocument {
    fn ready_state(&self) -> ReadyState {
        *self.ready.borrow()
    }

    async fn until_interactive(&self) {
        let mut receiver = self.ready.subscribe();
        // The sender lives as long as `self`, so the wait cannot fail.
        let _ = receiver.wait_for(|state| state.is_interactive()).await;
    }

    fn head(&self) -> Option<NodeId> {
        self.tree.lock().find_tag("head")
    }

    fn body(&self) -> Option<NodeId> {
        self.tree.lock().find_tag("body")
    }

    fn query_selector(&self, selector: &str) -> DomResult<Option<NodeId>> {
        let list = SelectorList::parse(selector)?;
        let tree = self.tree.lock();
        Ok(list.first_match(&tree))
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.tree.lock().find_id(id)
    }

    fn inner_html(&self, node: NodeId) -> DomResult<String> {
        let tree = self.tree.lock();
        tree.node(node)?;
        Ok(serialize_children(&tree, node))
    }

    fn set_inner_html(&self, node: NodeId, markup: &str) -> DomResult<()> {
        let mut tree = self.tree.lock();
        tree.element(node)?;
        tree.clear_children(node)?;
        parse_into(&mut tree, node, markup)?;
        self.notify(&tree, vec![Self::child_list(node)]);
        Ok(())
    }

    fn set_text_content(&self, node: NodeId, text: &str) -> DomResult<()> {
        let mut tree = self.tree.lock();
        tree.element(node)?;
        tree.clear_children(node)?;
        if !text.is_empty() {
            let text_node = tree.create(NodeKind::Text(text.to_string()));
            tree.insert(node, text_node, None)?;
        }
        self.notify(&tree, vec![Self::child_list(node)]);
        Ok(())
    }

    fn attribute(&self, node: NodeId, name: &str) -> DomResult<Option<String>> {
        let tree = self.tree.lock();
        Ok(tree.element(node)?.attr(name).map(str::to_string))
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> DomResult<()> {
        let mut tree = self.tree.lock();
        tree.element_mut(node)?.set_attr(name, value);
        // Browsers report a record even when the value is unchanged.
        let record = MutationRecord {
            target: node,
            kind: MutationKind::Attributes {
                name: name.to_ascii_lowercase(),
            },
        };
        self.notify(&tree, vec![record]);
        Ok(())
    }

    fn remove_attribute(&self, node: NodeId, name: &str) -> DomResult<bool> {
        let mut tree = self.tree.lock();
        let removed = tree.element_mut(node)?.remove_attr(name);
        if removed {
            let record = MutationRecord {
                target: node,
                kind: MutationKind::Attributes {
                    name: name.to_ascii_lowercase(),
                },
            };
            self.notify(&tree, vec![record]);
        }
        Ok(removed)
    }

    fn create_element(&self, tag: &str) -> NodeId {
        self.tree
            .lock()
            .create(NodeKind::Element(Element::new(tag)))
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.lock().parent(node)
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.tree.lock().first_child(node)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.tree.lock().next_sibling(node)
    }

    fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.tree.lock().previous_element_sibling(node)
    }

    fn next_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.tree.lock().next_element_sibling(node)
    }

    fn first_element_child(&self, node: NodeId) -> Option<NodeId> {
        self.tree.lock().first_element_child(node)
    }

    fn last_element_child(&self, node: NodeId) -> Option<NodeId> {
        self.tree.lock().last_element_child(node)
    }

    fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<()> {
        let mut tree = self.tree.lock();
        let old_parent = tree.insert(parent, child, reference)?;
        let mut records = Vec::with_capacity(2);
        if let Some(old) = old_parent.filter(|old| *old != parent && tree.is_connected(*old)) {
            records.push(Self::child_list(old));
        }
        records.push(Self::child_list(parent));
        self.notify(&tree, records);
        Ok(())
    }

    fn remove(&self, node: NodeId) -> DomResult<()> {
        let mut tree = self.tree.lock();
        if let Some(parent) = tree.detach(node)? {
            self.notify(&tree, vec![Self::child_list(parent)]);
        }
        Ok(())
    }

    fn observe(&self, target: NodeId) -> MutationStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.observers.lock().push(Observer { target, sender });
        receiver
    }
}
