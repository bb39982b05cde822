//! Network and orchestrator configuration, validation, and error types.
//!
//! [`NetworkConfig`] sets the wiring policy of a [`Network`](crate::Network).
//! [`CortixConfig`] selects the concurrency backend and the blocking and
//! shutdown budgets of a [`Cortix`](crate::Cortix) instance;
//! [`validate()`](CortixConfig::validate) checks it at construction.

use std::error::Error;
use std::fmt;
use std::time::Duration;

// ── NetworkConfig ──────────────────────────────────────────────────

/// Wiring policy for a [`Network`](crate::Network).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Create missing ports on demand when `connect` names them.
    /// Default: false (unknown ports are an error).
    pub auto_create_ports: bool,
    /// Refuse to schedule while a module's expected port is unconnected.
    /// Default: true.
    pub require_expected_ports: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            auto_create_ports: false,
            require_expected_ports: true,
        }
    }
}

// ── BackendKind ────────────────────────────────────────────────────

/// Which concurrency backend a [`Cortix`](crate::Cortix) runs modules on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// One dedicated thread per module on this machine.
    Local {
        /// Maximum number of concurrent module tasks. `None` = unbounded.
        max_tasks: Option<usize>,
    },
    /// A fixed-size rank job: rank 0 keeps the books, ranks `1..=N` host
    /// one module each.
    Ranks {
        /// Number of ranks in the job. Must be at least modules + 1.
        world_size: usize,
    },
}

impl BackendKind {
    /// Short backend name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Ranks { .. } => "ranks",
        }
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        Self::Local { max_tasks: None }
    }
}

// ── CortixConfig ───────────────────────────────────────────────────

/// Configuration of a [`Cortix`](crate::Cortix) orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CortixConfig {
    /// Backend selection. Default: local, unbounded.
    pub backend: BackendKind,
    /// Default timeout installed on every port at launch. `None` = block
    /// indefinitely. Default: `None`.
    pub rendezvous_timeout: Option<Duration>,
    /// Upper bound on how long `close()` waits for tasks to finish on
    /// their own. `None` = wait indefinitely. Default: `None`.
    pub join_timeout: Option<Duration>,
    /// Grace period (ms) after the termination signal before a task that
    /// is still running is detached and reported unresponsive. Default: 100.
    pub cancel_grace_ms: u64,
}

impl Default for CortixConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            rendezvous_timeout: None,
            join_timeout: None,
            cancel_grace_ms: 100,
        }
    }
}

impl CortixConfig {
    /// Local thread-per-module backend with default budgets.
    pub fn local() -> Self {
        Self::default()
    }

    /// Rank backend with `world_size` ranks and default budgets.
    pub fn distributed(world_size: usize) -> Self {
        Self {
            backend: BackendKind::Ranks { world_size },
            ..Self::default()
        }
    }

    /// Set the default rendezvous timeout.
    pub fn with_rendezvous_timeout(mut self, timeout: Duration) -> Self {
        self.rendezvous_timeout = Some(timeout);
        self
    }

    /// Bound how long `close()` waits before firing the termination signal.
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = Some(timeout);
        self
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            BackendKind::Local { max_tasks: Some(0) } => return Err(ConfigError::ZeroTaskLimit),
            BackendKind::Ranks { world_size: 0 } => return Err(ConfigError::EmptyWorld),
            _ => {}
        }
        if self.rendezvous_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout {
                which: "rendezvous_timeout",
            });
        }
        if self.join_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout {
                which: "join_timeout",
            });
        }
        Ok(())
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`CortixConfig::validate()`] or while the
/// backend brings tasks up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `BackendKind::Local { max_tasks: Some(0) }`.
    ZeroTaskLimit,
    /// `BackendKind::Ranks { world_size: 0 }`.
    EmptyWorld,
    /// A timeout was set to zero, which would fail every wait.
    ZeroTimeout {
        /// Name of the offending field.
        which: &'static str,
    },
    /// A task thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroTaskLimit => write!(f, "max_tasks must be at least 1"),
            Self::EmptyWorld => write!(f, "world_size must be at least 1"),
            Self::ZeroTimeout { which } => write!(f, "{which} must be non-zero"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
        }
    }
}

impl Error for ConfigError {}
