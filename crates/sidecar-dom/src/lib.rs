//! Sidecar DOM
//!
//! The document capability the experiment agent drives, plus an in-memory
//! implementation.
//!
//! # Core Concepts
//!
//! - [`Document`]: readiness, selector queries, markup and attribute edits,
//!   tree insertion, and mutation subscriptions
//! - [`MemoryDocument`]: arena-backed document with an HTML fragment parser
//!   and a CSS selector subset
//! - [`MutationStream`]: per-subscription channel of [`MutationRecord`]s
//!
//! # Example
//!
//! ```rust,ignore
//! use sidecar_dom::{Document, MemoryDocument};
//!
//! let doc = MemoryDocument::parse(r#"<h1 id="title">Hello</h1>"#)?;
//! let title = doc.query_selector("#title")?.expect("present");
//! doc.set_inner_html(title, "Welcome")?;
//! assert_eq!(doc.inner_html(title)?, "Welcome");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod document;
pub mod error;
mod html;
pub mod memory;
mod selector;
mod tree;

pub use document::{
    Document, MutationKind, MutationRecord, MutationStream, NodeId, ReadyState,
};
pub use error::{DomError, DomResult};
pub use memory::MemoryDocument;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn text_content_roundtrips(text in "[a-zA-Z0-9 .,!?-]{0,40}") {
            let doc = MemoryDocument::parse(r#"<div id="t"></div>"#).unwrap();
            let node = doc.element_by_id("t").unwrap();
            doc.set_text_content(node, &text).unwrap();
            prop_assert_eq!(doc.inner_html(node).unwrap(), text);
        }

        #[test]
        fn id_selector_finds_element(id in "[a-z][a-z0-9_-]{0,12}") {
            let markup = format!(r#"<section><p id="{id}">x</p></section>"#);
            let doc = MemoryDocument::parse(&markup).unwrap();
            let by_selector = doc.query_selector(&format!("#{id}")).unwrap();
            prop_assert_eq!(by_selector, doc.element_by_id(&id));
            prop_assert!(by_selector.is_some());
        }
    }
}
