//! The document capability consumed by the agent
//!
//! [`Document`] is the narrow surface of a live DOM the directive engine
//! needs: readiness, selector queries, markup and attribute edits, tree
//! insertion, and mutation observation. Any DOM binding can implement it;
//! [`MemoryDocument`](crate::MemoryDocument) is the in-process implementation.

use crate::error::DomResult;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use tokio::sync::mpsc;

/// Handle to a node inside a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Document loading state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    /// Markup is still being parsed
    Loading,
    /// Parsing finished, subresources may still load
    Interactive,
    /// Everything loaded (`loaded` on legacy engines)
    Complete,
}

impl ReadyState {
    /// Whether existing elements can be queried safely
    #[inline]
    #[must_use]
    pub fn is_interactive(self) -> bool {
        self >= ReadyState::Interactive
    }

    /// String form as reported by `document.readyState`
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReadyState::Loading => "loading",
            ReadyState::Interactive => "interactive",
            ReadyState::Complete => "complete",
        }
    }
}

impl FromStr for ReadyState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loading" => Ok(ReadyState::Loading),
            "interactive" => Ok(ReadyState::Interactive),
            "complete" | "loaded" => Ok(ReadyState::Complete),
            other => Err(format!("unknown ready state: {other}")),
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of change carried by a [`MutationRecord`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    /// An attribute was set or removed
    Attributes {
        /// Attribute name
        name: String,
    },
    /// Children were added, removed or replaced
    ChildList,
}

/// A single observed change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Node whose attributes or children changed
    pub target: NodeId,
    /// What changed
    pub kind: MutationKind,
}

/// Receiving end of a mutation subscription
///
/// Records are delivered for the observed node and its whole subtree.
/// Dropping the receiver ends the subscription.
pub type MutationStream = mpsc::UnboundedReceiver<MutationRecord>;

/// Live document capability
#[async_trait]
pub trait Document: Send + Sync {
    /// Current loading state
    fn ready_state(&self) -> ReadyState;

    /// Resolve once the document is at least [`ReadyState::Interactive`]
    async fn until_interactive(&self);

    /// The `<head>` element, if present
    fn head(&self) -> Option<NodeId>;

    /// The `<body>` element, if present
    fn body(&self) -> Option<NodeId>;

    /// First element in document order matching `selector`
    ///
    /// # Errors
    /// `DomError::InvalidSelector` when the selector cannot be parsed
    fn query_selector(&self, selector: &str) -> DomResult<Option<NodeId>>;

    /// Element carrying the given `id` attribute
    fn element_by_id(&self, id: &str) -> Option<NodeId>;

    /// Serialized children of `node`
    fn inner_html(&self, node: NodeId) -> DomResult<String>;

    /// Replace the children of `node` with parsed `markup`
    fn set_inner_html(&self, node: NodeId, markup: &str) -> DomResult<()>;

    /// Replace the children of `node` with a single text node
    fn set_text_content(&self, node: NodeId, text: &str) -> DomResult<()>;

    /// Attribute value, `None` when absent
    fn attribute(&self, node: NodeId, name: &str) -> DomResult<Option<String>>;

    /// Set or overwrite an attribute
    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> DomResult<()>;

    /// Remove an attribute, returning whether it was present
    fn remove_attribute(&self, node: NodeId, name: &str) -> DomResult<bool>;

    /// Create a detached element
    fn create_element(&self, tag: &str) -> NodeId;

    /// Parent node
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// First child node of any kind
    fn first_child(&self, node: NodeId) -> Option<NodeId>;

    /// Next sibling node of any kind
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    /// Previous sibling that is an element
    fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId>;

    /// Next sibling that is an element
    fn next_element_sibling(&self, node: NodeId) -> Option<NodeId>;

    /// First child that is an element
    fn first_element_child(&self, node: NodeId) -> Option<NodeId>;

    /// Last child that is an element
    fn last_element_child(&self, node: NodeId) -> Option<NodeId>;

    /// Insert `child` under `parent` before `reference`, or append when `None`
    ///
    /// A `child` already attached elsewhere is moved.
    ///
    /// # Errors
    /// - `DomError::HierarchyRequest` if `child` is `parent` or one of its ancestors
    /// - `DomError::NotAChild` if `reference` is not a child of `parent`
    fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<()>;

    /// Append `child` as the last child of `parent`
    fn append_child(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Detach `node` from its parent
    fn remove(&self, node: NodeId) -> DomResult<()>;

    /// Subscribe to attribute and child-list changes under `target`
    fn observe(&self, target: NodeId) -> MutationStream;
}
