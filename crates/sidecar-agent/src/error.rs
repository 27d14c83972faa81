//! Error types for the sidecar agent

use sidecar_core::DecodeError;
use sidecar_dom::DomError;

/// Failure applying a single directive
///
/// Never escapes the interpreter: failures are logged, counted in the
/// [`ApplyReport`](crate::ApplyReport) and the next directive runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectiveError {
    /// Entry could not be decoded into a directive
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The document rejected an operation
    #[error(transparent)]
    Dom(#[from] DomError),

    /// Injection needs a `<head>` and the document has none
    #[error("document has no <head> element")]
    MissingHead,

    /// Directive kind not accepted on this path
    #[error("directive '{0}' is not accepted here")]
    Rejected(&'static str),
}

/// Agent level errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SidecarError {
    /// Operation needs an initialized client
    #[error("client is not ready")]
    NotReady,

    /// Experiment does not match the current page
    #[error("experiment '{0}' does not match the current page")]
    ExperimentNotMatched(String),
}

/// Result alias for directive application
pub type DirectiveResult<T> = std::result::Result<T, DirectiveError>;

/// Result alias for agent operations
pub type Result<T> = std::result::Result<T, SidecarError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sidecar_dom::NodeId;

    #[test]
    fn dom_errors_are_transparent() {
        let err: DirectiveError = DomError::UnknownNode(NodeId(4)).into();
        assert_eq!(err.to_string(), DomError::UnknownNode(NodeId(4)).to_string());
    }

    #[test]
    fn sidecar_error_display() {
        assert_eq!(
            SidecarError::ExperimentNotMatched("hero".into()).to_string(),
            "experiment 'hero' does not match the current page"
        );
        assert_eq!(
            DirectiveError::Rejected("content-change").to_string(),
            "directive 'content-change' is not accepted here"
        );
    }
}
