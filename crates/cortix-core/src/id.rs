//! Identifiers for modules, ports and their endpoints.

use std::fmt;
use std::str::FromStr;

/// Identifies a module within a network.
///
/// Modules are assigned sequential IDs at registration. `ModuleId(n)`
/// corresponds to the n-th module registered with the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ModuleId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Fully qualified identity of a port: owning module name plus port name.
///
/// Displayed as `module.port`. Port names are unique within their module
/// and module names are unique within a network, so an `Endpoint` names
/// exactly one port in a network.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    /// Name of the owning module.
    pub module: String,
    /// Name of the port within that module.
    pub port: String,
}

impl Endpoint {
    /// Create an endpoint from a module name and a port name.
    pub fn new(module: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.port)
    }
}

impl<M: Into<String>, P: Into<String>> From<(M, P)> for Endpoint {
    fn from((module, port): (M, P)) -> Self {
        Self::new(module, port)
    }
}

/// Role a port plays in the exchange with its peer.
///
/// The mode is fixed when the port is created. Transport is always
/// bidirectional; the mode documents the intended data direction and
/// orients edges when the network is drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PortMode {
    /// The port consumes data provided by its peer.
    Use,
    /// The port provides data to its peer.
    Provide,
    /// Data flows both ways.
    #[default]
    Bidirectional,
}

impl PortMode {
    /// Lowercase name as used in legacy configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Use => "use",
            Self::Provide => "provide",
            Self::Bidirectional => "bidirectional",
        }
    }
}

impl fmt::Display for PortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognised [`PortMode`] name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsePortModeError {
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ParsePortModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown port mode '{}' (expected use, provide or bidirectional)",
            self.input
        )
    }
}

impl std::error::Error for ParsePortModeError {}

impl FromStr for PortMode {
    type Err = ParsePortModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "use" | "input" => Ok(Self::Use),
            "provide" | "output" => Ok(Self::Provide),
            "bidirectional" => Ok(Self::Bidirectional),
            _ => Err(ParsePortModeError {
                input: s.to_string(),
            }),
        }
    }
}
