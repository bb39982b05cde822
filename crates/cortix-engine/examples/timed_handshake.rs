//! Cortix timed handshake: two coupled physics modules.
//!
//! Demonstrates:
//!   1. Writing modules that exchange time-stamped state over ports
//!   2. Building a network and drawing it as Graphviz DOT
//!   3. Running the same network on the local and the rank backend
//!   4. Reading module results back after `close()`
//!
//! A heated vessel sends its temperature at each time step; a coolant
//! loop answers with its own temperature at the same time. Both sides
//! integrate their heat balance with explicit Euler steps.
//!
//! Run with:
//!   cargo run --example timed_handshake
//!
//! Set `RUST_LOG=cortix_engine=debug` to see lifecycle events.

use cortix_core::{Module, ModuleContext, ModuleError, PortError, PortSpec};
use cortix_engine::{Cortix, CortixConfig, Network};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// ─── Parameters ─────────────────────────────────────────────────

const DT: f64 = 0.5;
const STEPS: usize = 40;
const AMBIENT: f64 = 20.0;

/// Temperature of one side at one time.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct Reading {
    time: f64,
    temperature: f64,
}

// ─── Vessel: drives the clock ───────────────────────────────────

struct Vessel {
    power: f64,
    capacity: f64,
    transfer: f64,
    temperature: f64,
    history: Vec<Reading>,
}

impl Module for Vessel {
    fn name(&self) -> &str {
        "vessel"
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::bidirectional("coolant")]
    }

    fn port_names_expected(&self) -> Vec<String> {
        vec!["coolant".into()]
    }

    fn run(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        for step in 0..STEPS {
            let time = step as f64 * DT;
            let here = Reading {
                time,
                temperature: self.temperature,
            };
            self.history.push(here);
            ctx.send(here, "coolant")?;
            let there: Reading = ctx.recv("coolant")?;
            if there.time != time {
                return Err(ModuleError::failed(format!(
                    "coolant answered for t={} at t={time}",
                    there.time
                )));
            }
            let removed = self.transfer * (self.temperature - there.temperature);
            self.temperature += DT * (self.power - removed) / self.capacity;
        }
        Ok(())
    }
}

// ─── Coolant loop: follows the vessel ───────────────────────────

struct CoolantLoop {
    capacity: f64,
    transfer: f64,
    loss: f64,
    temperature: f64,
}

impl Module for CoolantLoop {
    fn name(&self) -> &str {
        "coolant-loop"
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::bidirectional("vessel")]
    }

    fn run(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        loop {
            let vessel: Reading = match ctx.recv("vessel") {
                Ok(r) => r,
                Err(PortError::PeerGone { .. }) => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            ctx.send(
                Reading {
                    time: vessel.time,
                    temperature: self.temperature,
                },
                "vessel",
            )?;
            let gained = self.transfer * (vessel.temperature - self.temperature);
            let lost = self.loss * (self.temperature - AMBIENT);
            self.temperature += DT * (gained - lost) / self.capacity;
        }
    }
}

// ─── Assembly ───────────────────────────────────────────────────

fn build() -> Result<Network, Box<dyn std::error::Error>> {
    let mut net = Network::new();
    net.module(Vessel {
        power: 50.0,
        capacity: 10.0,
        transfer: 2.0,
        temperature: AMBIENT,
        history: Vec::new(),
    })?;
    net.module(CoolantLoop {
        capacity: 40.0,
        transfer: 2.0,
        loss: 1.5,
        temperature: AMBIENT,
    })?;
    net.connect(("vessel", "coolant"), ("coolant-loop", "vessel"))?;
    Ok(net)
}

fn simulate(config: CortixConfig) -> Result<Network, Box<dyn std::error::Error>> {
    let mut cortix = Cortix::new(config)?;
    cortix.set_network(build()?)?;
    cortix.run()?;
    cortix.close()?;
    if let Some(report) = cortix.report() {
        println!(
            "  backend={} tasks={} completed={} elapsed={:?}",
            report.backend,
            report.tasks_launched,
            report.completed(),
            report.elapsed
        );
    }
    Ok(cortix.take_network()?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Network:\n{}", build()?.draw());

    for (label, config) in [
        ("local", CortixConfig::local()),
        ("ranks", CortixConfig::distributed(3)),
    ] {
        println!("Running on the {label} backend");
        let net = simulate(config)?;
        let vessel = net
            .get_module::<Vessel>("vessel")
            .ok_or("vessel missing after close")?;
        let coolant = net
            .get_module::<CoolantLoop>("coolant-loop")
            .ok_or("coolant loop missing after close")?;
        for r in vessel.history.iter().step_by(10) {
            println!("  t={:>5.1}  T_vessel={:>7.2}", r.time, r.temperature);
        }
        println!(
            "  final: T_vessel={:.2} T_coolant={:.2}\n",
            vessel.temperature, coolant.temperature
        );
    }
    Ok(())
}
