//! Per-module and per-run results collected by `close()`.

use std::fmt;
use std::time::Duration;

use cortix_core::{ModuleError, ModuleState};

use crate::rank::RootSummary;

/// A module that ended in the `failed` state, with its captured error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleFailure {
    /// Module name.
    pub module: String,
    /// What went wrong.
    pub error: ModuleError,
}

impl fmt::Display for ModuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.module, self.error)
    }
}

/// Terminal record of one module task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleReport {
    /// Module name.
    pub name: String,
    /// Launch position.
    pub slot: usize,
    /// Hosting rank, under the rank backend.
    pub rank: Option<usize>,
    /// Terminal state.
    pub state: ModuleState,
    /// The error, if the module failed.
    pub error: Option<ModuleError>,
    /// Time spent in `run()`, if the task reported back.
    pub elapsed: Option<Duration>,
}

/// Summary of one simulation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Backend the simulation ran on.
    pub backend: &'static str,
    /// Tasks launched by `run()`.
    pub tasks_launched: usize,
    /// One entry per module, in launch order.
    pub modules: Vec<ModuleReport>,
    /// Wall time from `run()` to the end of `close()`.
    pub elapsed: Duration,
    /// What rank 0 collected, under the rank backend.
    pub root: Option<RootSummary>,
}

impl RunReport {
    /// Every failed module with its error, in launch order.
    pub fn failures(&self) -> Vec<ModuleFailure> {
        self.modules
            .iter()
            .filter_map(|m| {
                m.error.as_ref().map(|error| ModuleFailure {
                    module: m.name.clone(),
                    error: error.clone(),
                })
            })
            .collect()
    }

    /// Number of modules that completed.
    pub fn completed(&self) -> usize {
        self.count(ModuleState::Completed)
    }

    /// Number of modules that failed.
    pub fn failed(&self) -> usize {
        self.count(ModuleState::Failed)
    }

    /// Whether every module completed.
    pub fn is_success(&self) -> bool {
        self.modules.iter().all(|m| m.state == ModuleState::Completed)
    }

    /// The record of a named module.
    pub fn module(&self, name: &str) -> Option<&ModuleReport> {
        self.modules.iter().find(|m| m.name == name)
    }

    fn count(&self, state: ModuleState) -> usize {
        self.modules.iter().filter(|m| m.state == state).count()
    }
}
