//! Local backend: one dedicated OS thread per module.
//!
//! Modules share nothing but their port channels. Process isolation is
//! not available for arbitrary in-memory module values, so threads are
//! the unit of parallelism here.

use crate::backend::{ConcurrencyBackend, Job, Launch, LaunchFailure, TaskHandle, TaskSlot};
use crate::config::ConfigError;
use crate::error::CortixError;

/// Thread-per-module backend.
#[derive(Debug, Default)]
pub struct LocalBackend {
    max_tasks: Option<usize>,
}

impl LocalBackend {
    /// Backend with an optional cap on concurrent tasks.
    pub fn new(max_tasks: Option<usize>) -> Self {
        Self { max_tasks }
    }
}

impl ConcurrencyBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn check_capacity(&self, modules: usize) -> Result<(), CortixError> {
        match self.max_tasks {
            Some(available) if modules > available => Err(CortixError::BackendUnavailable {
                backend: self.name(),
                required: modules,
                available,
            }),
            _ => Ok(()),
        }
    }

    fn launch(&mut self, job: Job) -> Result<Launch, LaunchFailure> {
        self.check_capacity(job.modules.len())?;
        let mut tasks = Vec::with_capacity(job.modules.len());
        for (index, scheduled) in job.modules.into_iter().enumerate() {
            let slot = TaskSlot {
                backend: self.name(),
                index,
                rank: None,
            };
            let thread_name = format!("cortix-{}", scheduled.name());
            match TaskHandle::spawn(scheduled, slot, job.cancel.clone(), thread_name, |_| {}) {
                Ok(handle) => tasks.push(handle),
                Err(e) => {
                    let error = ConfigError::ThreadSpawnFailed {
                        reason: format!("task {index}: {e}"),
                    };
                    return Err(LaunchFailure::partial(tasks, None, error));
                }
            }
        }
        tracing::debug!(tasks = tasks.len(), "local threads launched");
        Ok(Launch { tasks, root: None })
    }
}
