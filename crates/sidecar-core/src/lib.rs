//! Sidecar Core
//!
//! Data model and pure logic of the experiment sidecar.
//!
//! # Core Concepts
//!
//! - [`ExperimentDescriptor`]: an experiment and the URL filters selecting it
//! - [`Directive`]: one declarative page change
//! - [`matching_experiments`]: URL based experiment selection
//! - [`ConfigProvider`], [`EventSink`], [`HostPage`]: external capabilities
//! - [`BootstrapParams`] / [`AgentConfig`]: agent configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use sidecar_core::prelude::*;
//!
//! let list = vec![ExperimentDescriptor::new("hero_copy")
//!     .with_filters(FilterType::Path, ["/pricing"])];
//! let url = normalize_url("https://shop.example/pricing?overrideuser=qa");
//! assert_eq!(matching_experiments(&list, &url).len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod matcher;
pub mod provider;
pub mod types;
pub mod url;

pub use bootstrap::BootstrapParams;
pub use config::{AgentConfig, ClientOptions};
pub use error::{ConfigError, DecodeError, ProviderError, SinkError};
pub use matcher::{auto_run_experiments, matches, matching_experiments};
pub use provider::{ConfigProvider, DynamicConfig, EventSink, ExperimentConfig, HostPage};
pub use types::{
    Directive, EndUser, ExperimentDescriptor, FilterType, QueuedEvent, ReorderOperator,
};
pub use crate::url::{merge_query_params, normalize_url, url_path};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        auto_run_experiments, matching_experiments, normalize_url, AgentConfig, BootstrapParams,
        ClientOptions, ConfigProvider, Directive, EndUser, EventSink, ExperimentDescriptor,
        FilterType, HostPage, QueuedEvent, ReorderOperator,
    };
}
