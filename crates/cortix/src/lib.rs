//! Cortix: a runtime for coupling independently written simulation modules.
//!
//! This is the top-level facade crate that re-exports the public API from the
//! Cortix sub-crates. Modules exchange serialized values over named ports with
//! rendezvous semantics; a [`engine::Network`] wires them together and a
//! [`engine::Cortix`] orchestrator runs one concurrent task per module.
//!
//! # Quick start
//!
//! ```rust
//! use cortix::prelude::*;
//!
//! struct Source;
//! impl Module for Source {
//!     fn name(&self) -> &str { "source" }
//!     fn ports(&self) -> Vec<PortSpec> { vec![PortSpec::providing("out")] }
//!     fn run(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
//!         ctx.send(42_i64, "out")?;
//!         Ok(())
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Sink { got: Option<i64> }
//! impl Module for Sink {
//!     fn name(&self) -> &str { "sink" }
//!     fn ports(&self) -> Vec<PortSpec> { vec![PortSpec::using("in")] }
//!     fn run(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
//!         self.got = Some(ctx.recv("in")?);
//!         Ok(())
//!     }
//! }
//!
//! let mut net = Network::new();
//! net.module(Source).unwrap();
//! net.module(Sink::default()).unwrap();
//! net.connect(("source", "out"), ("sink", "in")).unwrap();
//!
//! let mut cortix = Cortix::new(CortixConfig::local()).unwrap();
//! cortix.set_network(net).unwrap();
//! cortix.run().unwrap();
//! cortix.close().unwrap();
//!
//! let net = cortix.take_network().unwrap();
//! assert_eq!(net.get_module::<Sink>("sink").unwrap().got, Some(42));
//! assert_eq!(net.module_state("sink"), Some(ModuleState::Completed));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`core`] | `cortix-core` | Ports, transports, the `Module` trait, payload codec, file adapter |
//! | [`engine`] | `cortix-engine` | Network builder, backends, orchestrator, run reports |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Ports, transports and the module contract (`cortix-core`).
///
/// Contains [`core::Port`], the [`core::Module`] trait with its
/// [`core::ModuleContext`], the [`core::Transport`] seam and the
/// file-slot adapter [`core::FileTransport`].
pub use cortix_core as core;

/// Network assembly and orchestration (`cortix-engine`).
///
/// [`engine::Network`] to register and wire modules, [`engine::Cortix`] to
/// run them on a [`engine::LocalBackend`] or a [`engine::RankBackend`].
pub use cortix_engine as engine;

/// Common imports for typical Cortix usage.
///
/// ```rust
/// use cortix::prelude::*;
/// ```
pub mod prelude {
    // Module contract
    pub use cortix_core::{Endpoint, Module, ModuleContext, ModuleState, PortMode, PortSpec};

    // Ports
    pub use cortix_core::{FilePortConfig, FileTransport, Port};

    // Errors
    pub use cortix_core::{ModuleError, PortError};
    pub use cortix_engine::{CortixError, NetworkError};

    // Engine
    pub use cortix_engine::{
        BackendKind, Cortix, CortixConfig, Network, NetworkConfig, RunReport, RunState,
    };
}
