//! Test utilities and fixture modules for Cortix development.
//!
//! Fixture modules live in [`fixtures`]; [`linked_registries`] gives two
//! already-connected port registries for port-level tests.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{
    Collector, Emitter, Failing, Idle, Panicking, Sample, Stubborn, TimedDriver, TimedResponder,
    Waiter,
};

use cortix_core::{PortRegistry, PortSpec};

/// Port registries of two modules `a` and `b`, each with one port named
/// `port`, already connected to each other.
pub fn linked_registries(port: &str) -> (PortRegistry, PortRegistry) {
    let mut a = PortRegistry::from_specs("a", &[PortSpec::bidirectional(port)])
        .expect("fresh registry");
    let mut b = PortRegistry::from_specs("b", &[PortSpec::bidirectional(port)])
        .expect("fresh registry");
    a.get_port_mut(port)
        .expect("declared")
        .connect(b.get_port_mut(port).expect("declared"))
        .expect("both unconnected");
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortix_core::{Module, ModuleContext, ModuleError, PortError};
    use std::thread;

    #[test]
    fn fixtures_talk_over_linked_registries() {
        let (a, b) = linked_registries("link");
        let mut ctx_b = ModuleContext::new(b);
        let h = thread::spawn(move || {
            let mut collector = Collector::new("b", "link", 3);
            collector.run(&mut ctx_b).map(|()| collector.received)
        });
        let mut ctx_a = ModuleContext::new(a);
        Emitter::new("a", "link", vec![5, 6, 7])
            .run(&mut ctx_a)
            .unwrap();
        assert_eq!(h.join().unwrap().unwrap(), [5, 6, 7]);
    }

    #[test]
    fn responder_stops_when_driver_leaves() {
        let (a, b) = linked_registries("coupling");
        let mut ctx_b = ModuleContext::new(b);
        let h = thread::spawn(move || {
            let mut plant = TimedResponder::new("b", "coupling", 3.0);
            plant.run(&mut ctx_b).map(|()| plant.answered)
        });
        let mut driver = TimedDriver::new("a", "coupling", vec![1.0, 2.0]);
        let mut ctx_a = ModuleContext::new(a);
        driver.run(&mut ctx_a).unwrap();
        drop(ctx_a);
        assert_eq!(h.join().unwrap().unwrap(), 2);
        assert_eq!(driver.samples[1], Sample { time: 2.0, value: 6.0 });
    }

    #[test]
    fn waiter_sees_peer_gone() {
        let (a, b) = linked_registries("link");
        drop(a);
        let mut ctx = ModuleContext::new(b);
        let err = Waiter::new("b", "link").run(&mut ctx).unwrap_err();
        assert!(matches!(err, ModuleError::Port(PortError::PeerGone { .. })));
    }
}
