//! Error types for the port and module layers.
//!
//! [`PortError`] covers both wiring failures (raised while a network is
//! assembled) and communication failures (raised inside a running
//! module). [`ModuleError`] is what a module's `run()` returns and what
//! the orchestrator reports for failed modules.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::id::Endpoint;

/// Errors from port wiring and rendezvous operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortError {
    /// `send`/`recv` on a port with no peer wired.
    NotConnected {
        /// The unconnected port.
        endpoint: Endpoint,
    },
    /// The peer's owning task has terminated.
    PeerGone {
        /// The local port.
        endpoint: Endpoint,
        /// The port that went away.
        peer: Endpoint,
    },
    /// No matching peer operation arrived within the configured timeout.
    RendezvousTimeout {
        /// The local port.
        endpoint: Endpoint,
        /// The peer that never matched.
        peer: Endpoint,
        /// How long the call waited.
        timeout: Duration,
    },
    /// One side of a `connect` already has a peer.
    AlreadyConnected {
        /// The port that is already wired.
        endpoint: Endpoint,
        /// Its existing peer.
        peer: Endpoint,
    },
    /// A port was asked to connect to itself.
    SelfConnect {
        /// The port in question.
        endpoint: Endpoint,
    },
    /// The named port was never declared on the module.
    UnknownPort {
        /// The requested (module, port) pair.
        endpoint: Endpoint,
    },
    /// A port with this name already exists on the module.
    DuplicatePort {
        /// The colliding (module, port) pair.
        endpoint: Endpoint,
    },
    /// The backend termination signal fired while the call was blocked.
    Cancelled {
        /// The local port.
        endpoint: Endpoint,
    },
    /// The payload could not be serialized.
    Encode {
        /// The sending port.
        endpoint: Endpoint,
        /// Codec diagnostic.
        reason: String,
    },
    /// The received bytes do not decode into the requested type.
    Decode {
        /// The receiving port.
        endpoint: Endpoint,
        /// Codec diagnostic.
        reason: String,
    },
    /// The transport medium failed (file adapter).
    Io {
        /// The local port.
        endpoint: Endpoint,
        /// Description of the failure.
        reason: String,
    },
}

impl PortError {
    /// The local endpoint the error was raised on.
    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Self::NotConnected { endpoint }
            | Self::PeerGone { endpoint, .. }
            | Self::RendezvousTimeout { endpoint, .. }
            | Self::AlreadyConnected { endpoint, .. }
            | Self::SelfConnect { endpoint }
            | Self::UnknownPort { endpoint }
            | Self::DuplicatePort { endpoint }
            | Self::Cancelled { endpoint }
            | Self::Encode { endpoint, .. }
            | Self::Decode { endpoint, .. }
            | Self::Io { endpoint, .. } => endpoint,
        }
    }
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected { endpoint } => write!(f, "port {endpoint} is not connected"),
            Self::PeerGone { endpoint, peer } => {
                write!(f, "peer {peer} of port {endpoint} has terminated")
            }
            Self::RendezvousTimeout {
                endpoint,
                peer,
                timeout,
            } => write!(
                f,
                "rendezvous between {endpoint} and {peer} timed out after {}ms",
                timeout.as_millis()
            ),
            Self::AlreadyConnected { endpoint, peer } => {
                write!(f, "port {endpoint} is already connected to {peer}")
            }
            Self::SelfConnect { endpoint } => {
                write!(f, "port {endpoint} cannot connect to itself")
            }
            Self::UnknownPort { endpoint } => write!(f, "unknown port {endpoint}"),
            Self::DuplicatePort { endpoint } => write!(f, "port {endpoint} already exists"),
            Self::Cancelled { endpoint } => {
                write!(f, "rendezvous on {endpoint} cancelled by shutdown")
            }
            Self::Encode { endpoint, reason } => {
                write!(f, "cannot encode payload for {endpoint}: {reason}")
            }
            Self::Decode { endpoint, reason } => {
                write!(f, "cannot decode payload on {endpoint}: {reason}")
            }
            Self::Io { endpoint, reason } => write!(f, "transport I/O on {endpoint}: {reason}"),
        }
    }
}

impl Error for PortError {}

/// Terminal error of a module task.
///
/// Returned by [`Module::run`](crate::Module::run) and collected by the
/// orchestrator for every module that ends in the `failed` state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleError {
    /// A port operation failed and was propagated out of `run()`.
    Port(PortError),
    /// Client-defined failure.
    Failed {
        /// Human-readable description.
        reason: String,
    },
    /// `run()` panicked; the panic was caught by the backend.
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },
    /// The task did not terminate before the close deadline and was detached.
    Unresponsive {
        /// Milliseconds waited after the termination signal.
        waited_ms: u64,
    },
}

impl ModuleError {
    /// Shorthand for [`ModuleError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port(e) => write!(f, "port: {e}"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::Panicked { message } => write!(f, "panicked: {message}"),
            Self::Unresponsive { waited_ms } => {
                write!(f, "did not terminate within {waited_ms}ms of shutdown")
            }
        }
    }
}

impl Error for ModuleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Port(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PortError> for ModuleError {
    fn from(e: PortError) -> Self {
        Self::Port(e)
    }
}
