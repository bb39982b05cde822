//! Network assembly, concurrency backends and orchestration for Cortix.
//!
//! Provides the [`Network`] builder that validates the module graph, the
//! [`ConcurrencyBackend`] strategy with a thread-per-module
//! [`LocalBackend`] and a rank-job [`RankBackend`], and the [`Cortix`]
//! orchestrator that launches one task per module and joins them with
//! aggregated failure reporting.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod config;
pub mod cortix;
pub mod draw;
pub mod error;
pub mod local;
pub mod network;
pub mod rank;
pub mod report;

pub use backend::{
    ConcurrencyBackend, Job, Launch, LaunchFailure, ScheduledModule, TaskHandle, TaskOutcome,
    TaskSlot,
};
pub use config::{BackendKind, ConfigError, CortixConfig, NetworkConfig};
pub use cortix::{Cortix, RunState};
pub use draw::Dot;
pub use error::{CortixError, NetworkError};
pub use local::LocalBackend;
pub use network::{Edge, ExternalBinding, Network};
pub use rank::{CompletionNotice, Communicator, RankBackend, RankTransport, RootSummary};
pub use report::{ModuleFailure, ModuleReport, RunReport};
