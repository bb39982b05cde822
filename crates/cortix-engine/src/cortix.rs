//! The [`Cortix`] orchestrator and its `idle → running → closed` state
//! machine.
//!
//! # Close protocol
//!
//! 1. **Join:** wait for every task to report, bounded by
//!    `join_timeout` when one is configured.
//! 2. **Cancel:** fire the termination signal. Any rendezvous still
//!    blocked in `send`/`recv` wakes with `PortError::Cancelled`.
//! 3. **Grace:** wait up to `cancel_grace_ms` for the stragglers.
//! 4. **Detach:** tasks still running are left to finish on their own
//!    and reported [`ModuleError::Unresponsive`].
//!
//! Finished modules go back into the network, where drivers can read
//! their results with [`Network::get_module`].

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cortix_core::{ModuleError, ModuleState};
use crossbeam_channel::Sender;

use crate::backend::{ConcurrencyBackend, Job, Joined, LaunchFailure, TaskHandle, TaskOutcome};
use crate::config::{BackendKind, CortixConfig};
use crate::error::CortixError;
use crate::local::LocalBackend;
use crate::network::Network;
use crate::rank::{RankBackend, RootSummary};
use crate::report::{ModuleReport, RunReport};

/// Run state of a [`Cortix`] instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Constructed; `run()` not called yet.
    Idle,
    /// Tasks launched; `close()` not called yet.
    Running,
    /// Closed. Terminal.
    Closed,
}

/// Top-level driver of one simulation.
///
/// One instance drives exactly one simulation: `run()` is accepted once,
/// from `Idle`. `close()` is idempotent, and dropping a running instance
/// closes it.
pub struct Cortix {
    config: CortixConfig,
    backend: Box<dyn ConcurrencyBackend>,
    network: Option<Network>,
    state: RunState,
    tasks: Vec<TaskHandle>,
    root: Option<JoinHandle<RootSummary>>,
    cancel: Option<Sender<()>>,
    started: Option<Instant>,
    launched: usize,
    report: Option<RunReport>,
}

impl Cortix {
    /// Validate `config` and select the backend it names.
    pub fn new(config: CortixConfig) -> Result<Self, CortixError> {
        config.validate()?;
        let backend: Box<dyn ConcurrencyBackend> = match config.backend {
            BackendKind::Local { max_tasks } => Box::new(LocalBackend::new(max_tasks)),
            BackendKind::Ranks { world_size } => Box::new(RankBackend::new(world_size)),
        };
        Ok(Self::build(config, backend))
    }

    /// Use a custom backend. `config.backend` is ignored.
    pub fn with_backend(
        config: CortixConfig,
        backend: Box<dyn ConcurrencyBackend>,
    ) -> Result<Self, CortixError> {
        config.validate()?;
        Ok(Self::build(config, backend))
    }

    fn build(config: CortixConfig, backend: Box<dyn ConcurrencyBackend>) -> Self {
        Self {
            config,
            backend,
            network: None,
            state: RunState::Idle,
            tasks: Vec::new(),
            root: None,
            cancel: None,
            started: None,
            launched: 0,
            report: None,
        }
    }

    /// The configuration this instance was built with.
    pub fn config(&self) -> &CortixConfig {
        &self.config
    }

    /// Name of the selected backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Hand over the network to simulate. Only allowed while idle.
    pub fn set_network(&mut self, network: Network) -> Result<(), CortixError> {
        if self.state != RunState::Idle {
            return Err(CortixError::AlreadyRunning);
        }
        self.network = Some(network);
        Ok(())
    }

    /// Read-only view of the network.
    pub fn network(&self) -> Option<&Network> {
        self.network.as_ref()
    }

    /// Take the network back. Not allowed while running.
    pub fn take_network(&mut self) -> Result<Network, CortixError> {
        if self.state == RunState::Running {
            return Err(CortixError::AlreadyRunning);
        }
        self.network.take().ok_or(CortixError::NoNetwork)
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Live lifecycle state of a module.
    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        self.network.as_ref()?.module_state(name)
    }

    /// Number of tasks launched by `run()`.
    pub fn task_count(&self) -> usize {
        self.launched
    }

    /// The run report, once closed after a run.
    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    /// Launch one concurrent task per registered module.
    pub fn run(&mut self) -> Result<(), CortixError> {
        if self.state != RunState::Idle {
            return Err(CortixError::AlreadyRunning);
        }
        let network = self.network.as_mut().ok_or(CortixError::NoNetwork)?;
        network.validate()?;
        self.backend.check_capacity(network.len())?;

        let mut modules = network.take_scheduled();
        for scheduled in &mut modules {
            for port in scheduled.ports_mut().iter_mut() {
                port.set_timeout(self.config.rendezvous_timeout);
            }
        }
        let edges = network.edges().to_vec();
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);

        tracing::info!(
            backend = self.backend.name(),
            modules = modules.len(),
            edges = edges.len(),
            "simulation starting"
        );
        self.started = Some(Instant::now());
        let launched = self.backend.launch(Job {
            modules,
            edges,
            cancel: cancel_rx,
        });
        let (launch, failure) = match launched {
            Ok(launch) => (launch, None),
            Err(LaunchFailure { started, error }) => (started, Some(error)),
        };

        self.launched = launch.tasks.len();
        self.tasks = launch.tasks;
        self.root = launch.root;
        self.cancel = Some(cancel_tx);
        self.state = RunState::Running;

        match failure {
            None => Ok(()),
            Some(error) => {
                tracing::warn!(
                    %error,
                    started = self.launched,
                    "launch failed, stopping started tasks"
                );
                // Started tasks are cancelled, then joined and reported by close().
                self.cancel.take();
                let _ = self.close();
                Err(error)
            }
        }
    }

    /// Join every task and report failures together.
    ///
    /// Returns [`CortixError::SimulationFailed`] listing every module that
    /// ended in `failed`. Calling it again is a no-op returning `Ok`.
    pub fn close(&mut self) -> Result<(), CortixError> {
        match self.state {
            RunState::Closed => return Ok(()),
            RunState::Idle => {
                self.state = RunState::Closed;
                return Ok(());
            }
            RunState::Running => {}
        }
        let close_started = Instant::now();
        let mut tasks = std::mem::take(&mut self.tasks);
        let mut outcomes: Vec<Option<TaskOutcome>> = Vec::with_capacity(tasks.len());

        // Phase 1: join.
        let join_deadline = self.config.join_timeout.map(|d| close_started + d);
        for task in &mut tasks {
            outcomes.push(match task.wait(join_deadline) {
                Joined::Finished(outcome) => Some(outcome),
                Joined::Pending => None,
            });
        }

        // Phase 2: cancel.
        self.cancel.take();
        let cancelled_at = Instant::now();
        let pending = outcomes.iter().filter(|o| o.is_none()).count();
        if pending > 0 {
            tracing::warn!(pending, "termination signal sent to running tasks");
        }

        // Phase 3: grace.
        let grace_deadline = cancelled_at + Duration::from_millis(self.config.cancel_grace_ms);
        for (task, outcome) in tasks.iter_mut().zip(outcomes.iter_mut()) {
            if outcome.is_none() {
                if let Joined::Finished(o) = task.wait(Some(grace_deadline)) {
                    *outcome = Some(o);
                }
            }
        }

        // Phase 4: collect, detach what is left.
        let mut modules = Vec::with_capacity(tasks.len());
        for (task, outcome) in tasks.into_iter().zip(outcomes) {
            let slot = task.slot();
            let name = task.name().to_string();
            let (error, elapsed) = match outcome {
                Some(outcome) => {
                    if let (Some(module), Some(network)) = (outcome.module, self.network.as_mut()) {
                        network.restore(&name, module);
                    }
                    (outcome.result.err(), Some(outcome.elapsed))
                }
                None => {
                    let waited_ms = cancelled_at.elapsed().as_millis() as u64;
                    tracing::warn!(module = %name, waited_ms, "task detached");
                    task.detach();
                    (Some(ModuleError::Unresponsive { waited_ms }), None)
                }
            };
            let state = self
                .network
                .as_ref()
                .and_then(|n| n.module_state(&name))
                .unwrap_or(if error.is_some() {
                    ModuleState::Failed
                } else {
                    ModuleState::Completed
                });
            modules.push(ModuleReport {
                name,
                slot: slot.index,
                rank: slot.rank,
                state,
                error,
                elapsed,
            });
        }

        let root = self.root.take().and_then(|h| h.join().ok());
        let report = RunReport {
            backend: self.backend.name(),
            tasks_launched: self.launched,
            modules,
            elapsed: self.started.map(|s| s.elapsed()).unwrap_or_default(),
            root,
        };
        let failures = report.failures();
        tracing::info!(
            backend = report.backend,
            completed = report.completed(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "simulation closed"
        );
        self.report = Some(report);
        self.state = RunState::Closed;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CortixError::SimulationFailed { failures })
        }
    }
}

impl Drop for Cortix {
    fn drop(&mut self) {
        if self.state == RunState::Running {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for Cortix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cortix")
            .field("backend", &self.backend.name())
            .field("state", &self.state)
            .field("tasks", &self.launched)
            .field("network", &self.network)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Launch, TaskSlot};
    use crate::config::ConfigError;
    use cortix_core::{Module, ModuleContext, PortSpec};

    struct Quiet(&'static str);

    impl Module for Quiet {
        fn name(&self) -> &str {
            self.0
        }
        fn run(&mut self, _ctx: &mut ModuleContext) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    struct Needy;

    impl Module for Needy {
        fn name(&self) -> &str {
            "needy"
        }
        fn ports(&self) -> Vec<PortSpec> {
            vec![PortSpec::using("feed")]
        }
        fn port_names_expected(&self) -> Vec<String> {
            vec!["feed".into()]
        }
        fn run(&mut self, _ctx: &mut ModuleContext) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    #[test]
    fn run_without_network_is_rejected() {
        let mut cortix = Cortix::new(CortixConfig::local()).unwrap();
        assert_eq!(cortix.run().unwrap_err(), CortixError::NoNetwork);
        assert_eq!(cortix.state(), RunState::Idle);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        assert!(matches!(
            Cortix::new(CortixConfig::distributed(0)),
            Err(CortixError::Config(_))
        ));
    }

    #[test]
    fn unbound_expected_port_stops_launch() {
        let mut net = Network::new();
        net.module(Needy).unwrap();
        let mut cortix = Cortix::new(CortixConfig::local()).unwrap();
        cortix.set_network(net).unwrap();
        assert!(matches!(
            cortix.run(),
            Err(CortixError::Network(crate::NetworkError::UnboundPort { .. }))
        ));
        // Nothing was scheduled; the instance is still idle.
        assert_eq!(cortix.state(), RunState::Idle);
        assert_eq!(cortix.module_state("needy"), Some(ModuleState::Registered));
    }

    #[test]
    fn state_machine_runs_once() {
        let mut net = Network::new();
        net.module(Quiet("a")).unwrap();
        let mut cortix = Cortix::new(CortixConfig::local()).unwrap();
        cortix.set_network(net).unwrap();
        cortix.run().unwrap();
        assert_eq!(cortix.state(), RunState::Running);
        assert_eq!(cortix.set_network(Network::new()), Err(CortixError::AlreadyRunning));
        assert_eq!(cortix.run(), Err(CortixError::AlreadyRunning));
        assert!(cortix.take_network().is_err());
        cortix.close().unwrap();
        assert_eq!(cortix.state(), RunState::Closed);
        assert_eq!(cortix.run(), Err(CortixError::AlreadyRunning));
        assert!(cortix.take_network().unwrap().get_module::<Quiet>("a").is_some());
    }

    /// Starts the first module, then fails as if the next thread could not
    /// be spawned.
    struct HalfLaunch;

    impl ConcurrencyBackend for HalfLaunch {
        fn name(&self) -> &'static str {
            "half"
        }
        fn check_capacity(&self, _modules: usize) -> Result<(), CortixError> {
            Ok(())
        }
        fn launch(&mut self, job: Job) -> Result<Launch, LaunchFailure> {
            let mut tasks = Vec::new();
            if let Some(first) = job.modules.into_iter().next() {
                let slot = TaskSlot {
                    backend: self.name(),
                    index: 0,
                    rank: None,
                };
                let handle =
                    TaskHandle::spawn(first, slot, job.cancel, "cortix-half".into(), |_| {})
                        .map_err(|e| {
                            CortixError::from(ConfigError::ThreadSpawnFailed {
                                reason: e.to_string(),
                            })
                        })?;
                tasks.push(handle);
            }
            let error = ConfigError::ThreadSpawnFailed {
                reason: "task 1: out of threads".into(),
            };
            Err(LaunchFailure::partial(tasks, None, error))
        }
    }

    #[test]
    fn partial_launch_joins_started_tasks() {
        let mut net = Network::new();
        net.module(Quiet("a")).unwrap();
        net.module(Quiet("b")).unwrap();
        let mut cortix =
            Cortix::with_backend(CortixConfig::local(), Box::new(HalfLaunch)).unwrap();
        cortix.set_network(net).unwrap();

        assert!(matches!(
            cortix.run(),
            Err(CortixError::Config(ConfigError::ThreadSpawnFailed { .. }))
        ));
        assert_eq!(cortix.state(), RunState::Closed);
        assert_eq!(cortix.task_count(), 1);

        let report = cortix.report().unwrap();
        assert_eq!(report.modules.len(), 1);
        assert_eq!(report.modules[0].name, "a");
        assert_eq!(report.modules[0].state, ModuleState::Completed);
        assert!(cortix.take_network().unwrap().get_module::<Quiet>("a").is_some());
    }

    #[test]
    fn close_before_run_just_closes() {
        let mut cortix = Cortix::new(CortixConfig::local()).unwrap();
        cortix.close().unwrap();
        assert_eq!(cortix.state(), RunState::Closed);
        assert!(cortix.report().is_none());
    }
}
