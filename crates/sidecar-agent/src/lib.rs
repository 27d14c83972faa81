//! Sidecar Agent
//!
//! The in-page experiment agent: applies experiment directives to a live
//! document, keeps them applied while page scripts run, and forwards
//! analytics without losing events on navigation.
//!
//! # Core Concepts
//!
//! - [`Sidecar`]: context owning the provider, queue, interpreter and reveal gate
//! - [`Interpreter`]: ordered directive application with readiness deferral
//! - [`Persistence`]: mutation-driven re-application
//! - [`EventQueue`]: analytics buffer with dirty-tracked flush
//! - [`Redirector`]: flush-then-navigate sequence
//! - [`RevealGate`]: anti-flicker style element with a fallback timer
//!
//! # Example
//!
//! ```rust,ignore
//! use sidecar_agent::prelude::*;
//!
//! let params = BootstrapParams::from_script_url(script_src)?;
//! let agent = Sidecar::new(AgentConfig::from_bootstrap(params), parts);
//! match agent.setup().await {
//!     SetupOutcome::Completed { experiments, .. } => println!("ran {experiments:?}"),
//!     other => println!("{other:?}"),
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod channel;
pub mod error;
pub mod identity;
pub mod interpreter;
pub mod persistence;
pub mod providers;
pub mod queue;
pub mod readiness;
pub mod redirect;
pub mod reveal;
pub mod sidecar;

pub use channel::{host_channel, HostChannel, HostEvent, HostEventReceiver};
pub use error::{DirectiveError, DirectiveResult, Result, SidecarError};
pub use identity::{end_user, stable_id, JsonFileStore, MemoryStore, StableIdStore};
pub use interpreter::{Applied, ApplyReport, Interpreter};
pub use persistence::{Persistence, WatchHandle};
pub use providers::{
    ConfigSnapshot, MemoryHostPage, SnapshotExperiment, StaticConfigProvider, TracingSink,
};
pub use queue::EventQueue;
pub use readiness::{ClientReadiness, ReadinessState};
pub use redirect::{navigation_aborts_sends, RedirectOutcome, Redirector};
pub use reveal::RevealGate;
pub use sidecar::{SetupOutcome, Sidecar, SidecarParts};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        ApplyReport, MemoryHostPage, MemoryStore, SetupOutcome, Sidecar, SidecarParts,
        StaticConfigProvider, TracingSink,
    };
    pub use sidecar_core::prelude::*;
    pub use sidecar_dom::{Document, MemoryDocument, ReadyState};
}
