//! Error types for document operations

use crate::document::NodeId;

/// Errors raised by [`Document`](crate::Document) operations
///
/// All of these are recoverable from the agent's point of view: a failing
/// operation skips the directive that issued it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    /// Selector could not be parsed
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector {
        /// Offending selector text
        selector: String,
        /// What the parser rejected
        reason: String,
    },

    /// Node id does not refer to a live node
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// Operation requires an element but got another node kind
    #[error("node {0} is not an element")]
    NotAnElement(NodeId),

    /// Insertion would create a cycle or target an invalid parent
    #[error("hierarchy request error: {0}")]
    HierarchyRequest(String),

    /// Reference node is not a child of the given parent
    #[error("node {reference} is not a child of {parent}")]
    NotAChild {
        /// Parent passed to the insertion
        parent: NodeId,
        /// Reference node that was expected under `parent`
        reference: NodeId,
    },
}

impl DomError {
    /// Create invalid selector error
    pub fn invalid_selector(selector: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for document operations
pub type DomResult<T> = Result<T, DomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_selector_display() {
        let err = DomError::invalid_selector("div[", "unterminated attribute");
        assert_eq!(
            err.to_string(),
            "invalid selector 'div[': unterminated attribute"
        );
    }

    #[test]
    fn not_a_child_display() {
        let err = DomError::NotAChild {
            parent: NodeId(1),
            reference: NodeId(7),
        };
        assert_eq!(err.to_string(), "node #7 is not a child of #1");
    }
}
