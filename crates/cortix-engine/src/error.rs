//! Error types for network assembly and orchestration.

use std::error::Error;
use std::fmt;

use cortix_core::{Endpoint, PortError};

use crate::config::ConfigError;
use crate::report::ModuleFailure;

// ── NetworkError ───────────────────────────────────────────────────

/// Build-time errors raised while a [`Network`](crate::Network) is assembled.
///
/// These indicate a topology mistake; nothing retries them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkError {
    /// A module with this name is already registered.
    DuplicateModuleName {
        /// The colliding name.
        name: String,
    },
    /// No module with this name is registered.
    UnknownModule {
        /// The requested name.
        name: String,
    },
    /// The module exists but has no port with this name.
    UnknownPort {
        /// The requested (module, port) pair.
        endpoint: Endpoint,
    },
    /// A port the module expects is not connected.
    UnboundPort {
        /// The unconnected expected port.
        endpoint: Endpoint,
    },
    /// The module has already been scheduled; its ports are gone.
    Sealed {
        /// The module in question.
        name: String,
    },
    /// Every module ID is taken.
    TooManyModules,
    /// Wiring refused by the port layer.
    Port(PortError),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateModuleName { name } => {
                write!(f, "a module named '{name}' is already registered")
            }
            Self::UnknownModule { name } => write!(f, "no module named '{name}'"),
            Self::UnknownPort { endpoint } => write!(f, "unknown port {endpoint}"),
            Self::UnboundPort { endpoint } => {
                write!(f, "expected port {endpoint} is not connected")
            }
            Self::Sealed { name } => {
                write!(f, "module '{name}' has been scheduled and can no longer be rewired")
            }
            Self::TooManyModules => write!(f, "every module ID is in use"),
            Self::Port(e) => write!(f, "port: {e}"),
        }
    }
}

impl Error for NetworkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Port(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PortError> for NetworkError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::UnknownPort { endpoint } => Self::UnknownPort { endpoint },
            other => Self::Port(other),
        }
    }
}

// ── CortixError ────────────────────────────────────────────────────

/// Orchestration errors from [`Cortix`](crate::Cortix).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CortixError {
    /// The backend cannot provide one concurrent slot per module.
    BackendUnavailable {
        /// Backend name.
        backend: &'static str,
        /// Slots the network needs.
        required: usize,
        /// Slots the backend has.
        available: usize,
    },
    /// `run()` was called on an instance that is not idle, or the
    /// network was touched while the simulation is running.
    AlreadyRunning,
    /// `run()` was called before a network was set.
    NoNetwork,
    /// Network validation failed before launch.
    Network(NetworkError),
    /// Invalid configuration, or a task could not be brought up.
    Config(ConfigError),
    /// One or more modules ended in the `failed` state.
    SimulationFailed {
        /// Every failing module, in registration order.
        failures: Vec<ModuleFailure>,
    },
}

impl fmt::Display for CortixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackendUnavailable {
                backend,
                required,
                available,
            } => write!(
                f,
                "backend '{backend}' cannot host the network: {required} slots required, {available} available"
            ),
            Self::AlreadyRunning => write!(f, "simulation already started on this instance"),
            Self::NoNetwork => write!(f, "no network has been set"),
            Self::Network(e) => write!(f, "network: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::SimulationFailed { failures } => {
                write!(f, "{} module(s) failed", failures.len())?;
                for failure in failures {
                    write!(f, "; {failure}")?;
                }
                Ok(())
            }
        }
    }
}

impl Error for CortixError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Network(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NetworkError> for CortixError {
    fn from(e: NetworkError) -> Self {
        Self::Network(e)
    }
}

impl From<ConfigError> for CortixError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
