//! Port, module and transport contracts for the Cortix coupling runtime.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! rendezvous [`Port`], the [`Module`] authoring contract and its
//! [`ModuleContext`], the [`Transport`] seam with its in-memory and
//! file-slot implementations, identifiers, and the error types of the
//! port and module layers.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod file_port;
pub mod id;
pub mod module;
pub mod port;
pub mod transport;

pub use codec::{decode_payload, encode_payload, CodecError};
pub use error::{ModuleError, PortError};
pub use file_port::{FilePortConfig, FilePortError, FileTransport};
pub use id::{Endpoint, ModuleId, ParsePortModeError, PortMode};
pub use module::{Module, ModuleContext, ModuleState, PortRegistry, PortSpec};
pub use port::Port;
pub use transport::{ChannelTransport, Transport, TransportError, Wait};
