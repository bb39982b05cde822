//! The [`Network`]: registered modules plus the port-to-port edges
//! between them.
//!
//! All wiring is resolved and checked here, single-threaded, before any
//! task exists. Once a [`Cortix`](crate::Cortix) launches the network,
//! each module's value and ports move onto its task; the network keeps
//! only metadata (port modes, edges, live lifecycle state), which is why
//! drawing and introspection keep working while the simulation runs and
//! after it closes.

use std::any::Any;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use cortix_core::{
    ChannelTransport, Endpoint, Module, ModuleId, ModuleState, PortError, PortMode, PortRegistry,
    Transport,
};
use indexmap::IndexMap;

use crate::backend::ScheduledModule;
use crate::config::NetworkConfig;
use crate::draw::Dot;
use crate::error::NetworkError;

// ── StateCell ──────────────────────────────────────────────────────

/// Lifecycle state shared between the network and the task running
/// the module.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: ModuleState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> ModuleState {
        ModuleState::from_u8(self.0.load(Ordering::Acquire)).unwrap_or(ModuleState::Failed)
    }

    /// Move to `next` if that is a legal step from the current state.
    pub(crate) fn advance(&self, next: ModuleState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                let current = ModuleState::from_u8(v)?;
                current.can_transition_to(next).then_some(next as u8)
            })
            .is_ok()
    }

    /// Mark a task that was detached before reaching a terminal state.
    pub(crate) fn fail(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                match ModuleState::from_u8(v) {
                    Some(s) if s.is_terminal() => None,
                    _ => Some(ModuleState::Failed as u8),
                }
            })
            .is_ok()
    }
}

// ── Edge ───────────────────────────────────────────────────────────

/// One connection `(module_a, port_a) ↔ (module_b, port_b)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    /// First endpoint, as passed to `connect`.
    pub a: Endpoint,
    /// Mode of the first endpoint's port.
    pub a_mode: PortMode,
    /// Second endpoint.
    pub b: Endpoint,
    /// Mode of the second endpoint's port.
    pub b_mode: PortMode,
}

impl Edge {
    /// The other endpoint, if `endpoint` is one end of this edge.
    pub fn peer_of(&self, endpoint: &Endpoint) -> Option<&Endpoint> {
        if &self.a == endpoint {
            Some(&self.b)
        } else if &self.b == endpoint {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// A port wired to a peer outside the network (for example a legacy
/// module reached through the file adapter).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalBinding {
    /// The port inside the network.
    pub endpoint: Endpoint,
    /// The outside peer.
    pub peer: Endpoint,
    /// Transport medium name.
    pub transport: &'static str,
}

// ── Node ───────────────────────────────────────────────────────────

struct Node {
    id: ModuleId,
    module: Option<Box<dyn Module>>,
    ports: Option<PortRegistry>,
    port_modes: IndexMap<String, PortMode>,
    expected: Vec<String>,
    state: Arc<StateCell>,
}

// ── Network ────────────────────────────────────────────────────────

/// Builder and container for a module graph.
///
/// # Examples
///
/// ```
/// use cortix_core::{Module, ModuleContext, ModuleError, PortSpec};
/// use cortix_engine::Network;
///
/// struct Node(&'static str);
///
/// impl Module for Node {
///     fn name(&self) -> &str { self.0 }
///     fn ports(&self) -> Vec<PortSpec> { vec![PortSpec::bidirectional("link")] }
///     fn run(&mut self, _ctx: &mut ModuleContext) -> Result<(), ModuleError> { Ok(()) }
/// }
///
/// let mut net = Network::new();
/// net.module(Node("a")).unwrap();
/// net.module(Node("b")).unwrap();
/// net.connect(("a", "link"), ("b", "link")).unwrap();
/// assert_eq!(net.edges().len(), 1);
/// assert!(net.draw().contains("\"a\" -> \"b\""));
/// ```
#[derive(Default)]
pub struct Network {
    config: NetworkConfig,
    nodes: IndexMap<String, Node>,
    edges: Vec<Edge>,
    externals: Vec<ExternalBinding>,
}

impl Network {
    /// Empty network with the default wiring policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty network with an explicit wiring policy.
    pub fn with_config(config: NetworkConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// The wiring policy.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    // ── Registration ───────────────────────────────────────────────

    /// Register a module and create the ports it declares.
    ///
    /// Fails with [`NetworkError::DuplicateModuleName`] if the name is
    /// taken; the earlier registration is left intact.
    pub fn module<M: Module>(&mut self, module: M) -> Result<ModuleId, NetworkError> {
        self.module_boxed(Box::new(module))
    }

    /// [`module`](Self::module) for an already boxed module.
    pub fn module_boxed(&mut self, module: Box<dyn Module>) -> Result<ModuleId, NetworkError> {
        let name = module.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(NetworkError::DuplicateModuleName { name });
        }
        let ports = PortRegistry::from_specs(name.as_str(), &module.ports())?;
        let port_modes = ports
            .iter()
            .map(|p| (p.name().to_string(), p.mode()))
            .collect();
        let state = StateCell::new(ModuleState::Constructed);
        state.advance(ModuleState::Registered);
        let id = u32::try_from(self.nodes.len())
            .map(ModuleId)
            .map_err(|_| NetworkError::TooManyModules)?;
        tracing::debug!(module = %name, id = id.0, ports = ports.len(), "module registered");
        self.nodes.insert(
            name,
            Node {
                id,
                expected: module.port_names_expected(),
                module: Some(module),
                ports: Some(ports),
                port_modes,
                state: Arc::new(state),
            },
        );
        Ok(id)
    }

    /// Declare an additional port on a registered module.
    pub fn add_port(&mut self, module: &str, port: &str, mode: PortMode) -> Result<(), NetworkError> {
        let node = self.node_mut(module)?;
        let ports = node.ports.as_mut().ok_or_else(|| NetworkError::Sealed {
            name: module.to_string(),
        })?;
        ports.add_port(port, mode)?;
        node.port_modes.insert(port.to_string(), mode);
        Ok(())
    }

    // ── Wiring ─────────────────────────────────────────────────────

    /// Connect two `(module, port)` endpoints.
    ///
    /// Missing ports are created as bidirectional when
    /// [`NetworkConfig::auto_create_ports`] is set.
    pub fn connect(
        &mut self,
        a: impl Into<Endpoint>,
        b: impl Into<Endpoint>,
    ) -> Result<(), NetworkError> {
        self.connect_with_mode(a, b, PortMode::Bidirectional)
    }

    /// [`connect`](Self::connect), creating missing ports with `mode`.
    pub fn connect_with_mode(
        &mut self,
        a: impl Into<Endpoint>,
        b: impl Into<Endpoint>,
        mode: PortMode,
    ) -> Result<(), NetworkError> {
        let create = self.config.auto_create_ports;
        self.wire(a.into(), b.into(), mode, create)
    }

    /// Connect two modules directly.
    ///
    /// Module `a` gets (or reuses) a port named after `b`, and `b` one
    /// named after `a`. Missing ports are always created, bidirectional.
    pub fn connect_modules(&mut self, a: &str, b: &str) -> Result<(), NetworkError> {
        self.wire(
            Endpoint::new(a, b),
            Endpoint::new(b, a),
            PortMode::Bidirectional,
            true,
        )
    }

    /// Wire a port to a peer outside the network over `transport`.
    pub fn bind_external(
        &mut self,
        endpoint: impl Into<Endpoint>,
        peer: Endpoint,
        transport: Box<dyn Transport>,
    ) -> Result<(), NetworkError> {
        let endpoint = endpoint.into();
        self.prepare(&endpoint, false)?;
        let kind = transport.kind();
        self.port_mut(&endpoint)?
            .bind_external(peer.clone(), transport)?;
        tracing::debug!(port = %endpoint, peer = %peer, transport = kind, "external peer bound");
        self.externals.push(ExternalBinding {
            endpoint,
            peer,
            transport: kind,
        });
        Ok(())
    }

    fn wire(
        &mut self,
        a: Endpoint,
        b: Endpoint,
        mode: PortMode,
        create_missing: bool,
    ) -> Result<(), NetworkError> {
        if a == b {
            return Err(PortError::SelfConnect { endpoint: a }.into());
        }
        // Check both sides before touching either.
        let create_a = self.prepare(&a, create_missing)?;
        let create_b = self.prepare(&b, create_missing)?;
        if create_a {
            self.add_port(&a.module, &a.port, mode)?;
        }
        if create_b {
            self.add_port(&b.module, &b.port, mode)?;
        }

        let (here, there) = ChannelTransport::pair();
        self.port_mut(&a)?.bind_external(b.clone(), Box::new(here))?;
        self.port_mut(&b)?.bind_external(a.clone(), Box::new(there))?;

        let a_mode = self.port_mode(&a).unwrap_or(mode);
        let b_mode = self.port_mode(&b).unwrap_or(mode);
        tracing::debug!(a = %a, b = %b, %a_mode, %b_mode, "ports connected");
        self.edges.push(Edge {
            a,
            a_mode,
            b,
            b_mode,
        });
        Ok(())
    }

    /// Check that `endpoint` can be wired. Returns whether the port has
    /// to be created first.
    fn prepare(&self, endpoint: &Endpoint, create_missing: bool) -> Result<bool, NetworkError> {
        let node = self.node(&endpoint.module)?;
        let ports = node.ports.as_ref().ok_or_else(|| NetworkError::Sealed {
            name: endpoint.module.clone(),
        })?;
        match ports.get_port(&endpoint.port) {
            Ok(port) => match port.peer() {
                Some(peer) => Err(PortError::AlreadyConnected {
                    endpoint: endpoint.clone(),
                    peer: peer.clone(),
                }
                .into()),
                None => Ok(false),
            },
            Err(_) if create_missing => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    // ── Validation ─────────────────────────────────────────────────

    /// Check that every expected port is bound, when the policy asks for it.
    pub fn validate(&self) -> Result<(), NetworkError> {
        if !self.config.require_expected_ports {
            return Ok(());
        }
        for (name, node) in &self.nodes {
            for port in &node.expected {
                let endpoint = Endpoint::new(name.as_str(), port.as_str());
                if !self.is_bound(&endpoint) {
                    return Err(NetworkError::UnboundPort { endpoint });
                }
            }
        }
        Ok(())
    }

    fn is_bound(&self, endpoint: &Endpoint) -> bool {
        self.peer_of(endpoint).is_some()
    }

    // ── Introspection ──────────────────────────────────────────────

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no module is registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a module with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Module names in registration order.
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// ID assigned to the module at registration.
    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.nodes.get(name).map(|n| n.id)
    }

    /// Live lifecycle state of a module.
    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        self.nodes.get(name).map(|n| n.state.get())
    }

    /// Declared ports of a module, in declaration order.
    pub fn ports_of(&self, name: &str) -> Option<Vec<(&str, PortMode)>> {
        self.nodes
            .get(name)
            .map(|n| n.port_modes.iter().map(|(p, m)| (p.as_str(), *m)).collect())
    }

    /// Connections in the order they were made.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Ports bound to peers outside the network.
    pub fn externals(&self) -> &[ExternalBinding] {
        &self.externals
    }

    /// The peer wired to `endpoint`, inside or outside the network.
    pub fn peer_of(&self, endpoint: &Endpoint) -> Option<&Endpoint> {
        self.edges
            .iter()
            .find_map(|e| e.peer_of(endpoint))
            .or_else(|| {
                self.externals
                    .iter()
                    .find(|x| &x.endpoint == endpoint)
                    .map(|x| &x.peer)
            })
    }

    /// Borrow a registered module as its concrete type.
    ///
    /// Returns `None` if the name is unknown, the type does not match,
    /// or the module is currently out on its task (or panicked there).
    pub fn get_module<M: Module>(&self, name: &str) -> Option<&M> {
        let module: &dyn Module = self.nodes.get(name)?.module.as_deref()?;
        (module as &dyn Any).downcast_ref::<M>()
    }

    /// Mutable variant of [`get_module`](Self::get_module).
    pub fn get_module_mut<M: Module>(&mut self, name: &str) -> Option<&mut M> {
        let module: &mut dyn Module = self.nodes.get_mut(name)?.module.as_deref_mut()?;
        (module as &mut dyn Any).downcast_mut::<M>()
    }

    // ── Drawing ────────────────────────────────────────────────────

    /// Render the graph as a Graphviz DOT document.
    ///
    /// Purely observational; safe at any point of the lifecycle.
    pub fn draw(&self) -> String {
        Dot::new(self).to_string()
    }

    /// Write [`draw`](Self::draw) output to `path`.
    pub fn write_dot(&self, path: impl AsRef<Path>) -> io::Result<()> {
        std::fs::write(path, self.draw())
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = (&str, ModuleState)> {
        self.nodes.iter().map(|(n, node)| (n.as_str(), node.state.get()))
    }

    // ── Launch support ─────────────────────────────────────────────

    /// Move every module and its ports out for scheduling.
    pub(crate) fn take_scheduled(&mut self) -> Vec<ScheduledModule> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for (name, node) in &mut self.nodes {
            let (Some(module), Some(ports)) = (node.module.take(), node.ports.take()) else {
                continue;
            };
            node.state.advance(ModuleState::Scheduled);
            out.push(ScheduledModule::new(
                node.id,
                name.clone(),
                module,
                ports,
                Arc::clone(&node.state),
            ));
        }
        out
    }

    /// Hand a module value back after its task finished.
    pub(crate) fn restore(&mut self, name: &str, module: Box<dyn Module>) {
        if let Some(node) = self.nodes.get_mut(name) {
            node.module = Some(module);
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn node(&self, name: &str) -> Result<&Node, NetworkError> {
        self.nodes.get(name).ok_or_else(|| NetworkError::UnknownModule {
            name: name.to_string(),
        })
    }

    fn node_mut(&mut self, name: &str) -> Result<&mut Node, NetworkError> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| NetworkError::UnknownModule {
                name: name.to_string(),
            })
    }

    fn port_mut(&mut self, endpoint: &Endpoint) -> Result<&mut cortix_core::Port, NetworkError> {
        let node = self.node_mut(&endpoint.module)?;
        let ports = node.ports.as_mut().ok_or_else(|| NetworkError::Sealed {
            name: endpoint.module.clone(),
        })?;
        Ok(ports.get_port_mut(&endpoint.port)?)
    }

    fn port_mode(&self, endpoint: &Endpoint) -> Option<PortMode> {
        self.nodes
            .get(&endpoint.module)?
            .port_modes
            .get(&endpoint.port)
            .copied()
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("modules", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges.len())
            .field("externals", &self.externals.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortix_core::{ModuleContext, ModuleError, PortSpec};

    struct Stub {
        name: String,
        ports: Vec<PortSpec>,
        expected: Vec<String>,
        marker: u32,
    }

    impl Stub {
        fn new(name: &str, ports: &[&str]) -> Self {
            Self {
                name: name.into(),
                ports: ports.iter().map(|p| PortSpec::bidirectional(*p)).collect(),
                expected: Vec::new(),
                marker: 0,
            }
        }

        fn expecting(mut self, port: &str) -> Self {
            self.expected.push(port.into());
            self
        }
    }

    impl Module for Stub {
        fn name(&self) -> &str {
            &self.name
        }

        fn ports(&self) -> Vec<PortSpec> {
            self.ports.clone()
        }

        fn port_names_expected(&self) -> Vec<String> {
            self.expected.clone()
        }

        fn run(&mut self, _ctx: &mut ModuleContext) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    fn pair() -> Network {
        let mut net = Network::new();
        net.module(Stub::new("a", &["link"])).unwrap();
        net.module(Stub::new("b", &["link"])).unwrap();
        net
    }

    #[test]
    fn duplicate_name_keeps_first_registration() {
        let mut net = Network::new();
        let mut first = Stub::new("reactor", &["out"]);
        first.marker = 1;
        net.module(first).unwrap();
        let err = net.module(Stub::new("reactor", &[])).unwrap_err();
        assert_eq!(
            err,
            NetworkError::DuplicateModuleName {
                name: "reactor".into()
            }
        );
        assert_eq!(net.len(), 1);
        assert_eq!(net.get_module::<Stub>("reactor").unwrap().marker, 1);
        assert_eq!(net.ports_of("reactor").unwrap(), vec![("out", PortMode::Bidirectional)]);
    }

    #[test]
    fn registration_moves_to_registered() {
        let net = pair();
        assert_eq!(net.module_state("a"), Some(ModuleState::Registered));
        assert_eq!(net.module_id("b"), Some(ModuleId(1)));
        assert_eq!(net.module_names().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn connect_records_edge_and_peers() {
        let mut net = pair();
        net.connect(("a", "link"), ("b", "link")).unwrap();
        let a = Endpoint::new("a", "link");
        let b = Endpoint::new("b", "link");
        assert_eq!(net.peer_of(&a), Some(&b));
        assert_eq!(net.peer_of(&b), Some(&a));
        assert_eq!(net.edges()[0].a, a);
    }

    #[test]
    fn unknown_module_and_port_are_reported() {
        let mut net = pair();
        assert_eq!(
            net.connect(("a", "link"), ("ghost", "link")).unwrap_err(),
            NetworkError::UnknownModule {
                name: "ghost".into()
            }
        );
        assert_eq!(
            net.connect(("a", "link"), ("b", "nope")).unwrap_err(),
            NetworkError::UnknownPort {
                endpoint: Endpoint::new("b", "nope")
            }
        );
        // A failed connect leaves both sides unwired.
        assert!(net.edges().is_empty());
        net.connect(("a", "link"), ("b", "link")).unwrap();
    }

    #[test]
    fn port_joins_at_most_one_edge() {
        let mut net = pair();
        net.module(Stub::new("c", &["link"])).unwrap();
        net.connect(("a", "link"), ("b", "link")).unwrap();
        let err = net.connect(("a", "link"), ("c", "link")).unwrap_err();
        assert_eq!(
            err,
            NetworkError::Port(PortError::AlreadyConnected {
                endpoint: Endpoint::new("a", "link"),
                peer: Endpoint::new("b", "link"),
            })
        );
        assert_eq!(net.edges().len(), 1);
        assert!(net.peer_of(&Endpoint::new("c", "link")).is_none());
    }

    #[test]
    fn self_connect_is_rejected() {
        let mut net = pair();
        assert!(matches!(
            net.connect(("a", "link"), ("a", "link")),
            Err(NetworkError::Port(PortError::SelfConnect { .. }))
        ));
    }

    #[test]
    fn auto_create_ports_uses_requested_mode() {
        let mut net = Network::with_config(NetworkConfig {
            auto_create_ports: true,
            ..NetworkConfig::default()
        });
        net.module(Stub::new("plant", &[])).unwrap();
        net.module(Stub::new("control", &[])).unwrap();
        net.connect_with_mode(("plant", "signal"), ("control", "signal"), PortMode::Provide)
            .unwrap();
        assert_eq!(
            net.ports_of("plant").unwrap(),
            vec![("signal", PortMode::Provide)]
        );
    }

    #[test]
    fn connect_modules_names_ports_after_peer() {
        let mut net = Network::new();
        net.module(Stub::new("turbine", &[])).unwrap();
        net.module(Stub::new("condenser", &["turbine"])).unwrap();
        net.connect_modules("turbine", "condenser").unwrap();
        assert_eq!(
            net.peer_of(&Endpoint::new("turbine", "condenser")),
            Some(&Endpoint::new("condenser", "turbine"))
        );
        // The existing port on the condenser was reused, not duplicated.
        assert_eq!(net.ports_of("condenser").unwrap().len(), 1);
    }

    #[test]
    fn validate_flags_unbound_expected_port() {
        let mut net = Network::new();
        net.module(Stub::new("a", &["link"]).expecting("link")).unwrap();
        net.module(Stub::new("b", &["link"])).unwrap();
        assert_eq!(
            net.validate().unwrap_err(),
            NetworkError::UnboundPort {
                endpoint: Endpoint::new("a", "link")
            }
        );
        net.connect(("a", "link"), ("b", "link")).unwrap();
        assert!(net.validate().is_ok());
    }

    #[test]
    fn validate_policy_can_be_disabled() {
        let mut net = Network::with_config(NetworkConfig {
            require_expected_ports: false,
            ..NetworkConfig::default()
        });
        net.module(Stub::new("a", &[]).expecting("inflow")).unwrap();
        assert!(net.validate().is_ok());
    }

    #[test]
    fn scheduled_modules_are_sealed() {
        let mut net = pair();
        net.connect(("a", "link"), ("b", "link")).unwrap();
        let scheduled = net.take_scheduled();
        assert_eq!(scheduled.len(), 2);
        assert_eq!(net.module_state("a"), Some(ModuleState::Scheduled));
        assert!(net.get_module::<Stub>("a").is_none());
        assert_eq!(
            net.add_port("a", "late", PortMode::Use).unwrap_err(),
            NetworkError::Sealed { name: "a".into() }
        );
        // Metadata survives for drawing.
        assert!(net.draw().contains("scheduled"));
    }

    #[test]
    fn downcast_rejects_wrong_type() {
        struct Other;
        impl Module for Other {
            fn name(&self) -> &str {
                "other"
            }
            fn run(&mut self, _ctx: &mut ModuleContext) -> Result<(), ModuleError> {
                Ok(())
            }
        }
        let mut net = Network::new();
        net.module(Other).unwrap();
        assert!(net.get_module::<Stub>("other").is_none());
        assert!(net.get_module_mut::<Other>("other").is_some());
    }

    #[test]
    fn state_cell_never_skips_or_leaves_terminal() {
        let cell = StateCell::new(ModuleState::Registered);
        assert!(!cell.advance(ModuleState::Running));
        assert!(cell.advance(ModuleState::Scheduled));
        assert!(cell.advance(ModuleState::Running));
        assert!(cell.advance(ModuleState::Completed));
        assert!(!cell.fail());
        assert_eq!(cell.get(), ModuleState::Completed);
    }

    proptest::proptest! {
        #[test]
        fn duplicate_names_never_replace_a_module(
            names in proptest::collection::btree_set("[a-z]{1,8}", 1..12),
            pick in proptest::prelude::any::<proptest::sample::Index>(),
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let mut net = Network::new();
            for (i, name) in names.iter().enumerate() {
                let mut stub = Stub::new(name, &[]);
                stub.marker = i as u32;
                net.module(stub).unwrap();
            }
            let dup = pick.get(&names);
            let err = net.module(Stub::new(dup, &[])).unwrap_err();
            proptest::prop_assert_eq!(err, NetworkError::DuplicateModuleName { name: dup.clone() });
            proptest::prop_assert_eq!(net.len(), names.len());
            let kept = net.get_module::<Stub>(dup).unwrap();
            proptest::prop_assert_eq!(kept.marker as usize, pick.index(names.len()));
            let order: Vec<&str> = net.module_names().collect();
            proptest::prop_assert_eq!(order, names.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }
}
