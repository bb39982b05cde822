//! The [`ConcurrencyBackend`] strategy and the task plumbing shared by
//! every backend.
//!
//! A backend receives the scheduled modules of a validated network and
//! starts one concurrent task per module. Whatever the substrate, each
//! task body is [`ScheduledModule::execute`]: it enters the module's
//! tracing span, drives the lifecycle state, catches panics, and drops
//! the module's ports before reporting, so peers blocked on those ports
//! observe `PeerGone`.
//!
//! Task outcomes travel back over a one-slot channel rather than through
//! `JoinHandle::join`, so the orchestrator can wait with a deadline.

use std::any::Any;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cortix_core::{Module, ModuleContext, ModuleError, ModuleId, ModuleState, PortRegistry};
use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::CortixError;
use crate::network::{Edge, StateCell};
use crate::rank::RootSummary;

// ── ScheduledModule ────────────────────────────────────────────────

/// A module and its wired ports, moved out of the network for launch.
pub struct ScheduledModule {
    id: ModuleId,
    name: String,
    module: Box<dyn Module>,
    ports: PortRegistry,
    state: Arc<StateCell>,
}

impl ScheduledModule {
    pub(crate) fn new(
        id: ModuleId,
        name: String,
        module: Box<dyn Module>,
        ports: PortRegistry,
        state: Arc<StateCell>,
    ) -> Self {
        Self {
            id,
            name,
            module,
            ports,
            state,
        }
    }

    /// Registration ID.
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module's ports.
    pub fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    /// Mutable ports, for backends that rebind transports before launch.
    pub fn ports_mut(&mut self) -> &mut PortRegistry {
        &mut self.ports
    }

    /// Run the module to completion on the calling thread.
    ///
    /// Consumes the module's ports: they are dropped before this returns.
    /// A panic inside `run()` is caught and reported as
    /// [`ModuleError::Panicked`]; the module value is then discarded.
    pub fn execute(self, slot: TaskSlot, cancel: Receiver<()>) -> TaskOutcome {
        let Self {
            name,
            mut module,
            ports,
            state,
            ..
        } = self;
        let span = tracing::info_span!(
            "module",
            name = %name,
            backend = slot.backend,
            slot = slot.index,
            rank = slot.rank,
        );
        let _enter = span.enter();

        state.advance(ModuleState::Running);
        let started = Instant::now();
        let mut ctx = ModuleContext::new(ports).with_cancel_signal(cancel);
        if let Some(rank) = slot.rank {
            ctx = ctx.with_rank(rank);
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| module.run(&mut ctx)));
        drop(ctx);
        let elapsed = started.elapsed();

        let (module, result) = match result {
            Ok(result) => (Some(module), result),
            Err(payload) => (
                None,
                Err(ModuleError::Panicked {
                    message: panic_message(payload.as_ref()),
                }),
            ),
        };
        match &result {
            Ok(()) => {
                state.advance(ModuleState::Completed);
                tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "module completed");
            }
            Err(error) => {
                state.advance(ModuleState::Failed);
                tracing::warn!(%error, elapsed_ms = elapsed.as_millis() as u64, "module failed");
            }
        }

        TaskOutcome {
            module,
            result,
            elapsed,
        }
    }
}

impl fmt::Debug for ScheduledModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledModule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("ports", &self.ports.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ── TaskSlot / TaskOutcome ─────────────────────────────────────────

/// Where a task runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskSlot {
    /// Backend name.
    pub backend: &'static str,
    /// Position of the task in launch order.
    pub index: usize,
    /// Hosting rank, under a rank backend.
    pub rank: Option<usize>,
}

/// What a finished task hands back.
pub struct TaskOutcome {
    /// The module value, unless `run()` panicked.
    pub module: Option<Box<dyn Module>>,
    /// What `run()` returned.
    pub result: Result<(), ModuleError>,
    /// Wall time spent in `run()`.
    pub elapsed: Duration,
}

impl fmt::Debug for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOutcome")
            .field("returned", &self.module.is_some())
            .field("result", &self.result)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

// ── TaskHandle ─────────────────────────────────────────────────────

/// Handle to one running module task.
pub struct TaskHandle {
    name: String,
    slot: TaskSlot,
    state: Arc<StateCell>,
    outcome: Receiver<TaskOutcome>,
    thread: Option<JoinHandle<()>>,
}

/// Result of waiting on a task with a deadline.
pub(crate) enum Joined {
    Finished(TaskOutcome),
    Pending,
}

impl TaskHandle {
    /// Spawn `scheduled` on a dedicated named thread.
    ///
    /// `finish` runs on that thread after the module's ports have been
    /// dropped and before the outcome is published.
    pub fn spawn<F>(
        scheduled: ScheduledModule,
        slot: TaskSlot,
        cancel: Receiver<()>,
        thread_name: String,
        finish: F,
    ) -> io::Result<Self>
    where
        F: FnOnce(&TaskOutcome) + Send + 'static,
    {
        let name = scheduled.name.clone();
        let state = Arc::clone(&scheduled.state);
        let (tx, rx) = crossbeam_channel::bounded(1);
        let thread = thread::Builder::new().name(thread_name).spawn(move || {
            let outcome = scheduled.execute(slot, cancel);
            finish(&outcome);
            let _ = tx.send(outcome);
        })?;
        Ok(Self {
            name,
            slot,
            state,
            outcome: rx,
            thread: Some(thread),
        })
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the task runs.
    pub fn slot(&self) -> TaskSlot {
        self.slot
    }

    /// Live lifecycle state of the module.
    pub fn state(&self) -> ModuleState {
        self.state.get()
    }

    /// Wait for the outcome until `deadline` (`None` = indefinitely).
    pub(crate) fn wait(&mut self, deadline: Option<Instant>) -> Joined {
        let received = match deadline {
            Some(deadline) => self.outcome.recv_deadline(deadline),
            None => self.outcome.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(outcome) => {
                if let Some(thread) = self.thread.take() {
                    let _ = thread.join();
                }
                Joined::Finished(outcome)
            }
            Err(RecvTimeoutError::Timeout) => Joined::Pending,
            Err(RecvTimeoutError::Disconnected) => {
                self.state.fail();
                Joined::Finished(TaskOutcome {
                    module: None,
                    result: Err(ModuleError::Panicked {
                        message: "task exited without reporting an outcome".to_string(),
                    }),
                    elapsed: Duration::ZERO,
                })
            }
        }
    }

    /// Give up on the task: mark it failed and let its thread run on.
    pub(crate) fn detach(mut self) {
        self.state.fail();
        drop(self.thread.take());
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("slot", &self.slot)
            .field("state", &self.state.get())
            .finish()
    }
}

// ── ConcurrencyBackend ─────────────────────────────────────────────

/// Everything a backend needs to launch a network.
pub struct Job {
    /// Scheduled modules in registration order.
    pub modules: Vec<ScheduledModule>,
    /// Connections between them, in the order they were made.
    pub edges: Vec<Edge>,
    /// Termination signal; fires when every sender is dropped.
    pub cancel: Receiver<()>,
}

/// What a backend started.
#[derive(Debug)]
pub struct Launch {
    /// One handle per module, in launch order.
    pub tasks: Vec<TaskHandle>,
    /// Bookkeeping participant, for backends that run one.
    pub root: Option<JoinHandle<RootSummary>>,
}

/// A launch that stopped part way.
///
/// `started` holds the tasks that were already running when `error`
/// occurred; the orchestrator still joins and reports them.
#[derive(Debug)]
pub struct LaunchFailure {
    /// Tasks started before the failure.
    pub started: Launch,
    /// Why the launch stopped.
    pub error: CortixError,
}

impl LaunchFailure {
    /// Failure after `tasks` (and possibly `root`) were started.
    pub fn partial(
        tasks: Vec<TaskHandle>,
        root: Option<JoinHandle<RootSummary>>,
        error: impl Into<CortixError>,
    ) -> Self {
        Self {
            started: Launch { tasks, root },
            error: error.into(),
        }
    }
}

impl From<CortixError> for LaunchFailure {
    fn from(error: CortixError) -> Self {
        Self::partial(Vec::new(), None, error)
    }
}

/// Strategy that turns scheduled modules into concurrent tasks.
///
/// Selected once, when the [`Cortix`](crate::Cortix) is constructed.
pub trait ConcurrencyBackend: Send {
    /// Short backend name for logs and errors.
    fn name(&self) -> &'static str;

    /// Fail with [`CortixError::BackendUnavailable`] if the backend cannot
    /// host `modules` concurrent tasks. Called before anything is moved
    /// out of the network.
    fn check_capacity(&self, modules: usize) -> Result<(), CortixError>;

    /// Start one task per module.
    ///
    /// On failure, tasks already started are handed back in the
    /// [`LaunchFailure`] so they can be joined.
    fn launch(&mut self, job: Job) -> Result<Launch, LaunchFailure>;
}
