//! The [`Module`] authoring contract, its port registry and run context.
//!
//! A module is an independently scheduled unit of simulation logic. It
//! never holds a reference to another module: everything it exchanges
//! goes through the ports in its [`ModuleContext`].

use std::any::Any;
use std::fmt;
use std::time::Duration;

use crossbeam_channel::{never, Receiver, TryRecvError};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ModuleError, PortError};
use crate::id::{Endpoint, PortMode};
use crate::port::Port;

/// Declaration of a port a module owns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortSpec {
    /// Port name, unique within the module.
    pub name: String,
    /// Fixed role of the port.
    pub mode: PortMode,
}

impl PortSpec {
    /// Declare a port with an explicit mode.
    pub fn new(name: impl Into<String>, mode: PortMode) -> Self {
        Self {
            name: name.into(),
            mode,
        }
    }

    /// Declare a port consuming data from its peer.
    pub fn using(name: impl Into<String>) -> Self {
        Self::new(name, PortMode::Use)
    }

    /// Declare a port providing data to its peer.
    pub fn providing(name: impl Into<String>) -> Self {
        Self::new(name, PortMode::Provide)
    }

    /// Declare a bidirectional port.
    pub fn bidirectional(name: impl Into<String>) -> Self {
        Self::new(name, PortMode::Bidirectional)
    }
}

/// A unit of simulation logic scheduled as one concurrent task.
///
/// # Contract
///
/// - `run()` is invoked exactly once, on the task the backend created
///   for this module. It runs to completion using only the ports in
///   `ctx` for external I/O.
/// - Whether an unconnected optional port contributes zero (or is
///   skipped) is the module's own policy; check
///   [`ModuleContext::is_connected`].
/// - `Any` lets drivers downcast the module back to its concrete type
///   after the simulation closes, to read results out of its state.
///
/// # Examples
///
/// ```
/// use cortix_core::{Module, ModuleContext, ModuleError, PortSpec};
///
/// struct Doubler;
///
/// impl Module for Doubler {
///     fn name(&self) -> &str { "doubler" }
///
///     fn ports(&self) -> Vec<PortSpec> {
///         vec![PortSpec::bidirectional("io")]
///     }
///
///     fn port_names_expected(&self) -> Vec<String> {
///         vec!["io".into()]
///     }
///
///     fn run(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
///         let t: f64 = ctx.recv("io")?;
///         ctx.send((t, 2.0 * t), "io")?;
///         Ok(())
///     }
/// }
/// ```
pub trait Module: Any + Send {
    /// Name of the module, unique within a network.
    fn name(&self) -> &str;

    /// Ports created when the module is registered with a network.
    ///
    /// Default: none; ports can also be added by the driver.
    fn ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    /// Ports that must be connected before the module is scheduled.
    ///
    /// Checked by network validation when the policy is enabled.
    /// Default: none.
    fn port_names_expected(&self) -> Vec<String> {
        Vec::new()
    }

    /// Entry point, run to completion on the module's own task.
    fn run(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError>;
}

/// Lifecycle of a module.
///
/// `Constructed → Registered → Scheduled → Running → {Completed | Failed}`.
/// No transition skips a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModuleState {
    /// Built by client code, not yet in a network.
    Constructed = 0,
    /// Registered with a network.
    Registered = 1,
    /// Handed to a backend, task not started yet.
    Scheduled = 2,
    /// `run()` is executing.
    Running = 3,
    /// `run()` returned `Ok`.
    Completed = 4,
    /// `run()` returned an error, panicked, or was detached at close.
    Failed = 5,
}

impl ModuleState {
    /// Whether `self → next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: ModuleState) -> bool {
        use ModuleState::*;
        matches!(
            (self, next),
            (Constructed, Registered)
                | (Registered, Scheduled)
                | (Scheduled, Running)
                | (Running, Completed)
                | (Running, Failed)
        )
    }

    /// Whether the module has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Inverse of `self as u8`.
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Constructed,
            1 => Self::Registered,
            2 => Self::Scheduled,
            3 => Self::Running,
            4 => Self::Completed,
            5 => Self::Failed,
            _ => return None,
        })
    }

    /// Lowercase state name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Constructed => "constructed",
            Self::Registered => "registered",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed registry of the ports owned by one module, in declaration order.
#[derive(Debug)]
pub struct PortRegistry {
    module: String,
    ports: IndexMap<String, Port>,
}

impl PortRegistry {
    /// Empty registry for the named module.
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            ports: IndexMap::new(),
        }
    }

    /// Build a registry from port declarations.
    pub fn from_specs(module: impl Into<String>, specs: &[PortSpec]) -> Result<Self, PortError> {
        let mut reg = Self::new(module);
        for spec in specs {
            reg.add_port(&spec.name, spec.mode)?;
        }
        Ok(reg)
    }

    /// Name of the owning module.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Declare a new port. Fails if the name is taken.
    pub fn add_port(&mut self, name: &str, mode: PortMode) -> Result<&mut Port, PortError> {
        let endpoint = Endpoint::new(self.module.as_str(), name);
        if self.ports.contains_key(name) {
            return Err(PortError::DuplicatePort { endpoint });
        }
        let entry = self
            .ports
            .entry(name.to_string())
            .or_insert_with(|| Port::new(endpoint, mode));
        Ok(entry)
    }

    /// Look up a declared port.
    pub fn get_port(&self, name: &str) -> Result<&Port, PortError> {
        self.ports.get(name).ok_or_else(|| self.unknown(name))
    }

    /// Mutable lookup of a declared port.
    pub fn get_port_mut(&mut self, name: &str) -> Result<&mut Port, PortError> {
        let module = &self.module;
        self.ports
            .get_mut(name)
            .ok_or_else(|| PortError::UnknownPort {
                endpoint: Endpoint::new(module.as_str(), name),
            })
    }

    /// Whether a port with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.ports.contains_key(name)
    }

    /// Port names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ports.keys().map(String::as_str)
    }

    /// Ports in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    /// Mutable ports in declaration order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Port> {
        self.ports.values_mut()
    }

    /// Number of declared ports.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Whether no ports are declared.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    fn unknown(&self, name: &str) -> PortError {
        PortError::UnknownPort {
            endpoint: Endpoint::new(self.module.as_str(), name),
        }
    }
}

/// Everything a running module may touch: its own ports and the
/// backend's termination signal.
///
/// Owned by the task executing `run()`; ports are destroyed when the
/// context is dropped at the end of the task, which is what lets peers
/// observe [`PortError::PeerGone`].
pub struct ModuleContext {
    ports: PortRegistry,
    cancel: Receiver<()>,
    rank: Option<usize>,
}

impl ModuleContext {
    /// Wrap a port registry. No termination signal, no rank.
    pub fn new(ports: PortRegistry) -> Self {
        Self {
            ports,
            cancel: never(),
            rank: None,
        }
    }

    /// Install the backend termination signal on the context and all ports.
    pub fn with_cancel_signal(mut self, cancel: Receiver<()>) -> Self {
        for port in self.ports.iter_mut() {
            port.set_cancel_signal(cancel.clone());
        }
        self.cancel = cancel;
        self
    }

    /// Record the rank hosting this module under a distributed backend.
    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = Some(rank);
        self
    }

    /// Name of the module this context belongs to.
    pub fn module_name(&self) -> &str {
        self.ports.module()
    }

    /// Rank hosting the module, under the distributed backend.
    pub fn rank(&self) -> Option<usize> {
        self.rank
    }

    /// Whether the backend asked tasks to terminate.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cancel.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Look up a port by name.
    pub fn get_port(&self, name: &str) -> Result<&Port, PortError> {
        self.ports.get_port(name)
    }

    /// Mutable lookup of a port by name.
    pub fn get_port_mut(&mut self, name: &str) -> Result<&mut Port, PortError> {
        self.ports.get_port_mut(name)
    }

    /// Declare an additional (necessarily unconnected) port.
    pub fn add_port(&mut self, name: &str, mode: PortMode) -> Result<&mut Port, PortError> {
        let cancel = self.cancel.clone();
        let port = self.ports.add_port(name, mode)?;
        port.set_cancel_signal(cancel);
        Ok(port)
    }

    /// Whether the named port exists and has a peer.
    pub fn is_connected(&self, name: &str) -> bool {
        self.ports
            .get_port(name)
            .map(Port::is_connected)
            .unwrap_or(false)
    }

    /// Send `payload` on the named port.
    pub fn send<T: Serialize>(&self, payload: T, port_name: &str) -> Result<(), PortError> {
        self.ports.get_port(port_name)?.send(payload)
    }

    /// Receive from the named port.
    pub fn recv<T: DeserializeOwned>(&self, port_name: &str) -> Result<T, PortError> {
        self.ports.get_port(port_name)?.recv()
    }

    /// Send with a per-call timeout.
    pub fn send_timeout<T: Serialize>(
        &self,
        payload: T,
        port_name: &str,
        timeout: Duration,
    ) -> Result<(), PortError> {
        self.ports.get_port(port_name)?.send_timeout(payload, timeout)
    }

    /// Receive with a per-call timeout.
    pub fn recv_timeout<T: DeserializeOwned>(
        &self,
        port_name: &str,
        timeout: Duration,
    ) -> Result<T, PortError> {
        self.ports.get_port(port_name)?.recv_timeout(timeout)
    }

    /// The module's port registry.
    pub fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    /// Mutable access to the port registry (used by backends at launch).
    pub fn ports_mut(&mut self) -> &mut PortRegistry {
        &mut self.ports
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("module", &self.module_name())
            .field("ports", &self.ports.len())
            .field("rank", &self.rank)
            .finish()
    }
}
