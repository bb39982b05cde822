//! Reusable module fixtures.
//!
//! - [`Emitter`] / [`Collector`]: one-way stream of integers over one port.
//! - [`TimedDriver`] / [`TimedResponder`]: the `send(time) → recv((time, value))`
//!   handshake used by coupled physics modules.
//! - [`Failing`], [`Panicking`], [`Stubborn`], [`Waiter`]: failure and
//!   shutdown behaviour.

use std::thread;
use std::time::Duration;

use cortix_core::{Module, ModuleContext, ModuleError, PortError, PortSpec};
use serde::{Deserialize, Serialize};

/// A time-stamped value, the payload of the timed handshake.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub value: f64,
}

/// Sends each of its values on one port, in order.
pub struct Emitter {
    pub name: String,
    pub port: String,
    pub values: Vec<i64>,
}

impl Emitter {
    pub fn new(name: impl Into<String>, port: impl Into<String>, values: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            port: port.into(),
            values,
        }
    }
}

impl Module for Emitter {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::providing(self.port.as_str())]
    }

    fn port_names_expected(&self) -> Vec<String> {
        vec![self.port.clone()]
    }

    fn run(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        for v in &self.values {
            ctx.send(*v, &self.port)?;
        }
        Ok(())
    }
}

/// Receives `expect` integers on one port and keeps them.
pub struct Collector {
    pub name: String,
    pub port: String,
    pub expect: usize,
    pub received: Vec<i64>,
}

impl Collector {
    pub fn new(name: impl Into<String>, port: impl Into<String>, expect: usize) -> Self {
        Self {
            name: name.into(),
            port: port.into(),
            expect,
            received: Vec::new(),
        }
    }
}

impl Module for Collector {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::using(self.port.as_str())]
    }

    fn port_names_expected(&self) -> Vec<String> {
        vec![self.port.clone()]
    }

    fn run(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        for _ in 0..self.expect {
            let v: i64 = ctx.recv(&self.port)?;
            self.received.push(v);
        }
        Ok(())
    }
}

/// Drives the timed handshake: sends each time stamp, then waits for the
/// peer's [`Sample`] at that time.
pub struct TimedDriver {
    pub name: String,
    pub port: String,
    pub times: Vec<f64>,
    pub samples: Vec<Sample>,
}

impl TimedDriver {
    pub fn new(name: impl Into<String>, port: impl Into<String>, times: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            port: port.into(),
            times,
            samples: Vec::new(),
        }
    }
}

impl Module for TimedDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::bidirectional(self.port.as_str())]
    }

    fn run(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        for &t in &self.times {
            ctx.send(t, &self.port)?;
            let sample: Sample = ctx.recv(&self.port)?;
            if sample.time != t {
                return Err(ModuleError::failed(format!(
                    "expected sample at t={t}, got t={}",
                    sample.time
                )));
            }
            self.samples.push(sample);
        }
        Ok(())
    }
}

/// Answers the timed handshake with `value = gain * time` until the
/// driver goes away.
pub struct TimedResponder {
    pub name: String,
    pub port: String,
    pub gain: f64,
    pub answered: usize,
}

impl TimedResponder {
    pub fn new(name: impl Into<String>, port: impl Into<String>, gain: f64) -> Self {
        Self {
            name: name.into(),
            port: port.into(),
            gain,
            answered: 0,
        }
    }
}

impl Module for TimedResponder {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::bidirectional(self.port.as_str())]
    }

    fn run(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        loop {
            let time: f64 = match ctx.recv(&self.port) {
                Ok(t) => t,
                // The driver finished its schedule.
                Err(PortError::PeerGone { .. }) => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            ctx.send(
                Sample {
                    time,
                    value: self.gain * time,
                },
                &self.port,
            )?;
            self.answered += 1;
        }
    }
}

/// Fails immediately with a fixed reason.
pub struct Failing {
    pub name: String,
    pub reason: String,
}

impl Failing {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl Module for Failing {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, _ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        Err(ModuleError::failed(self.reason.clone()))
    }
}

/// Panics inside `run()`.
pub struct Panicking {
    pub name: String,
}

impl Panicking {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Module for Panicking {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, _ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        panic!("{} lost its invariants", self.name)
    }
}

/// Blocks in `recv` on one port; only the peer or the termination signal
/// can release it.
pub struct Waiter {
    pub name: String,
    pub port: String,
}

impl Waiter {
    pub fn new(name: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port: port.into(),
        }
    }
}

impl Module for Waiter {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::using(self.port.as_str())]
    }

    fn run(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        let _: i64 = ctx.recv(&self.port)?;
        Ok(())
    }
}

/// Sleeps for `duration` without looking at ports or the termination
/// signal.
pub struct Stubborn {
    pub name: String,
    pub duration: Duration,
}

impl Stubborn {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }
}

impl Module for Stubborn {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, _ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        thread::sleep(self.duration);
        Ok(())
    }
}

/// Does nothing; optionally declares ports.
pub struct Idle {
    pub name: String,
    pub ports: Vec<PortSpec>,
}

impl Idle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Vec::new(),
        }
    }

    pub fn with_port(mut self, spec: PortSpec) -> Self {
        self.ports.push(spec);
        self
    }
}

impl Module for Idle {
    fn name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortSpec> {
        self.ports.clone()
    }

    fn run(&mut self, _ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        Ok(())
    }
}
