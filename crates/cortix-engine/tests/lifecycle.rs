//! Integration test: orchestrator lifecycle, scheduling and shutdown.
//!
//! Covers the `idle → running → closed` state machine, one task per
//! module on each backend, capacity checks, rendezvous timeouts, and the
//! close protocol's cancel and detach phases.

use std::thread;
use std::time::{Duration, Instant};

use cortix_core::{Endpoint, Module, ModuleContext, ModuleError, ModuleState, PortError, PortSpec};
use cortix_engine::{BackendKind, Cortix, CortixConfig, CortixError, Network, RunState};
use cortix_test_utils::{Emitter, Idle, Stubborn, Waiter};

// ── Helpers ──────────────────────────────────────────────────────────

fn idle_network(n: usize) -> Network {
    let mut net = Network::new();
    for i in 0..n {
        net.module(Idle::new(format!("m{i}"))).unwrap();
    }
    net
}

fn failures(err: CortixError) -> Vec<(String, ModuleError)> {
    match err {
        CortixError::SimulationFailed { failures } => {
            failures.into_iter().map(|f| (f.module, f.error)).collect()
        }
        other => panic!("expected SimulationFailed, got {other:?}"),
    }
}

/// Holds a port open without ever using it, then returns.
struct Holder {
    name: &'static str,
    hold: Duration,
}

impl Module for Holder {
    fn name(&self) -> &str {
        self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::using("link")]
    }

    fn run(&mut self, _ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        thread::sleep(self.hold);
        Ok(())
    }
}

// ── Scheduling ───────────────────────────────────────────────────────

#[test]
fn one_task_per_module_locally() {
    let mut cortix = Cortix::new(CortixConfig::local()).unwrap();
    cortix.set_network(idle_network(5)).unwrap();
    cortix.run().unwrap();
    assert_eq!(cortix.task_count(), 5);
    cortix.close().unwrap();
    assert_eq!(cortix.report().unwrap().modules.len(), 5);
}

#[test]
fn one_rank_per_module_plus_root() {
    let mut cortix = Cortix::new(CortixConfig::distributed(6)).unwrap();
    cortix.set_network(idle_network(4)).unwrap();
    cortix.run().unwrap();
    assert_eq!(cortix.task_count(), 4);
    cortix.close().unwrap();
    let root = cortix.report().unwrap().root.clone().unwrap();
    assert_eq!(root.world_size, 6);
    assert_eq!(root.idle_ranks, 1);
    assert_eq!(root.completed(), 4);
}

#[test]
fn too_few_ranks_is_rejected_before_launch() {
    let mut cortix = Cortix::new(CortixConfig::distributed(4)).unwrap();
    cortix.set_network(idle_network(4)).unwrap();
    assert_eq!(
        cortix.run().unwrap_err(),
        CortixError::BackendUnavailable {
            backend: "ranks",
            required: 5,
            available: 4,
        }
    );
    assert_eq!(cortix.state(), RunState::Idle);
    assert_eq!(cortix.task_count(), 0);
    assert_eq!(cortix.module_state("m0"), Some(ModuleState::Registered));
}

#[test]
fn local_task_cap_is_enforced() {
    let config = CortixConfig {
        backend: BackendKind::Local { max_tasks: Some(2) },
        ..CortixConfig::default()
    };
    let mut cortix = Cortix::new(config).unwrap();
    cortix.set_network(idle_network(3)).unwrap();
    assert!(matches!(
        cortix.run(),
        Err(CortixError::BackendUnavailable {
            backend: "local",
            required: 3,
            available: 2,
        })
    ));
}

// ── State machine ────────────────────────────────────────────────────

#[test]
fn close_is_idempotent() {
    let mut cortix = Cortix::new(CortixConfig::local()).unwrap();
    cortix.set_network(idle_network(2)).unwrap();
    cortix.run().unwrap();
    cortix.close().unwrap();
    let first = cortix.report().unwrap().clone();
    cortix.close().unwrap();
    cortix.close().unwrap();
    assert_eq!(cortix.report().unwrap(), &first);
    assert_eq!(cortix.run(), Err(CortixError::AlreadyRunning));
}

#[test]
fn empty_network_runs_and_closes() {
    let mut cortix = Cortix::new(CortixConfig::local()).unwrap();
    cortix.set_network(Network::new()).unwrap();
    cortix.run().unwrap();
    assert_eq!(cortix.task_count(), 0);
    cortix.close().unwrap();
    assert!(cortix.report().unwrap().is_success());
}

#[test]
fn dropping_a_running_instance_joins_it() {
    let mut cortix = Cortix::new(CortixConfig::local()).unwrap();
    cortix
        .set_network({
            let mut net = Network::new();
            net.module(Stubborn::new("slow", Duration::from_millis(50)))
                .unwrap();
            net
        })
        .unwrap();
    let started = Instant::now();
    cortix.run().unwrap();
    drop(cortix);
    assert!(started.elapsed() >= Duration::from_millis(50));
}

// ── Timeouts and cancellation ────────────────────────────────────────

#[test]
fn rendezvous_timeout_names_both_endpoints() {
    let config = CortixConfig::local().with_rendezvous_timeout(Duration::from_millis(30));
    let mut net = Network::new();
    net.module(Emitter::new("a", "link", vec![1])).unwrap();
    net.module(Holder {
        name: "b",
        hold: Duration::from_millis(300),
    })
    .unwrap();
    net.connect(("a", "link"), ("b", "link")).unwrap();

    let mut cortix = Cortix::new(config).unwrap();
    cortix.set_network(net).unwrap();
    cortix.run().unwrap();
    let failed = failures(cortix.close().unwrap_err());

    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "a");
    match &failed[0].1 {
        ModuleError::Port(PortError::RendezvousTimeout {
            endpoint,
            peer,
            timeout,
        }) => {
            assert_eq!(endpoint, &Endpoint::new("a", "link"));
            assert_eq!(peer, &Endpoint::new("b", "link"));
            assert_eq!(*timeout, Duration::from_millis(30));
        }
        other => panic!("expected RendezvousTimeout, got {other:?}"),
    }
}

#[test]
fn peer_exit_releases_blocked_sender() {
    let mut net = Network::new();
    net.module(Emitter::new("a", "link", vec![1])).unwrap();
    net.module(Holder {
        name: "b",
        hold: Duration::ZERO,
    })
    .unwrap();
    net.connect(("a", "link"), ("b", "link")).unwrap();

    let mut cortix = Cortix::new(CortixConfig::local()).unwrap();
    cortix.set_network(net).unwrap();
    cortix.run().unwrap();
    let failed = failures(cortix.close().unwrap_err());
    assert_eq!(
        failed,
        [(
            "a".to_string(),
            ModuleError::Port(PortError::PeerGone {
                endpoint: Endpoint::new("a", "link"),
                peer: Endpoint::new("b", "link"),
            })
        )]
    );
}

fn deadlocked_pair() -> Network {
    let mut net = Network::new();
    net.module(Waiter::new("left", "link")).unwrap();
    net.module(Waiter::new("right", "link")).unwrap();
    net.connect(("left", "link"), ("right", "link")).unwrap();
    net
}

fn assert_cancelled(err: CortixError) {
    let failed = failures(err);
    assert_eq!(failed.len(), 2);
    for (name, error) in failed {
        assert_eq!(
            error,
            ModuleError::Port(PortError::Cancelled {
                endpoint: Endpoint::new(name.as_str(), "link"),
            })
        );
    }
}

#[test]
fn join_timeout_cancels_blocked_rendezvous() {
    let config = CortixConfig::local().with_join_timeout(Duration::from_millis(50));
    let mut cortix = Cortix::new(config).unwrap();
    cortix.set_network(deadlocked_pair()).unwrap();
    cortix.run().unwrap();
    assert_cancelled(cortix.close().unwrap_err());
    let net = cortix.take_network().unwrap();
    assert_eq!(net.module_state("left"), Some(ModuleState::Failed));
    assert_eq!(net.module_state("right"), Some(ModuleState::Failed));
}

#[test]
fn join_timeout_cancels_blocked_ranks() {
    let config = CortixConfig::distributed(3).with_join_timeout(Duration::from_millis(50));
    let mut cortix = Cortix::new(config).unwrap();
    cortix.set_network(deadlocked_pair()).unwrap();
    cortix.run().unwrap();
    assert_cancelled(cortix.close().unwrap_err());
}

#[test]
fn unresponsive_task_is_detached() {
    let config = CortixConfig {
        cancel_grace_ms: 20,
        ..CortixConfig::local().with_join_timeout(Duration::from_millis(20))
    };
    let mut net = Network::new();
    net.module(Stubborn::new("sleepy", Duration::from_millis(500)))
        .unwrap();
    net.module(Idle::new("quick")).unwrap();

    let mut cortix = Cortix::new(config).unwrap();
    cortix.set_network(net).unwrap();
    cortix.run().unwrap();
    let started = Instant::now();
    let failed = failures(cortix.close().unwrap_err());
    assert!(started.elapsed() < Duration::from_millis(400));

    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "sleepy");
    assert!(matches!(failed[0].1, ModuleError::Unresponsive { .. }));
    let report = cortix.report().unwrap();
    assert_eq!(report.module("sleepy").unwrap().state, ModuleState::Failed);
    assert_eq!(report.module("quick").unwrap().state, ModuleState::Completed);
}
