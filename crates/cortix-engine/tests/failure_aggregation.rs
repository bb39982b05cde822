//! Integration test: failures from several modules surface together.
//!
//! Every module that ends in `failed` appears in the one
//! `SimulationFailed` error that `close()` returns, in registration order.
//! Modules that completed are left out, and panics are captured rather
//! than propagated.

use cortix_core::{ModuleError, ModuleState};
use cortix_engine::{Cortix, CortixConfig, CortixError, Network, RunState};
use cortix_test_utils::{Failing, Idle, Panicking};

fn three_modules() -> Network {
    let mut net = Network::new();
    net.module(Failing::new("one", "diverged")).unwrap();
    net.module(Idle::new("two")).unwrap();
    net.module(Failing::new("three", "negative mass")).unwrap();
    net
}

fn close_error(config: CortixConfig, net: Network) -> (Cortix, CortixError) {
    let mut cortix = Cortix::new(config).unwrap();
    cortix.set_network(net).unwrap();
    cortix.run().unwrap();
    let err = cortix.close().unwrap_err();
    (cortix, err)
}

fn assert_first_and_third(err: &CortixError) {
    let CortixError::SimulationFailed { failures } = err else {
        panic!("expected SimulationFailed, got {err:?}");
    };
    let names: Vec<_> = failures.iter().map(|f| f.module.as_str()).collect();
    assert_eq!(names, ["one", "three"]);
    assert_eq!(failures[0].error, ModuleError::failed("diverged"));
    assert_eq!(failures[1].error, ModuleError::failed("negative mass"));
}

#[test]
fn local_failures_are_aggregated() {
    let (mut cortix, err) = close_error(CortixConfig::local(), three_modules());
    assert_first_and_third(&err);
    let text = err.to_string();
    assert!(text.starts_with("2 module(s) failed"), "{text}");
    assert!(text.contains("one: "), "{text}");
    assert!(text.contains("three: "), "{text}");

    let report = cortix.report().unwrap();
    assert_eq!(report.completed(), 1);
    assert_eq!(report.failed(), 2);
    assert_eq!(report.module("two").unwrap().state, ModuleState::Completed);

    // Closing again changes nothing.
    assert_eq!(cortix.close(), Ok(()));
    assert_eq!(cortix.state(), RunState::Closed);
}

#[test]
fn rank_failures_are_aggregated() {
    let (cortix, err) = close_error(CortixConfig::distributed(4), three_modules());
    assert_first_and_third(&err);
    let root = cortix.report().unwrap().root.as_ref().unwrap();
    assert_eq!(root.notices.len(), 3);
    assert_eq!(root.completed(), 1);
}

#[test]
fn failed_modules_stay_readable() {
    let (mut cortix, _err) = close_error(CortixConfig::local(), three_modules());
    let net = cortix.take_network().unwrap();
    assert_eq!(net.module_state("one"), Some(ModuleState::Failed));
    assert_eq!(net.module_state("two"), Some(ModuleState::Completed));
    let one = net.get_module::<Failing>("one").unwrap();
    assert_eq!(one.reason, "diverged");
}

#[test]
fn panic_is_captured_as_failure() {
    let mut net = Network::new();
    net.module(Panicking::new("unstable")).unwrap();
    net.module(Idle::new("steady")).unwrap();
    let (mut cortix, err) = close_error(CortixConfig::local(), net);

    let CortixError::SimulationFailed { failures } = err else {
        panic!("expected SimulationFailed");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].module, "unstable");
    assert!(matches!(
        &failures[0].error,
        ModuleError::Panicked { message } if message.contains("lost its invariants")
    ));

    let net = cortix.take_network().unwrap();
    assert_eq!(net.module_state("unstable"), Some(ModuleState::Failed));
    // A panicked module is not handed back.
    assert!(net.get_module::<Panicking>("unstable").is_none());
    assert!(net.get_module::<Idle>("steady").is_some());
}
