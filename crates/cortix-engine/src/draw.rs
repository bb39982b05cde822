//! Graphviz DOT rendering of a [`Network`].
//!
//! Modules become box nodes labelled with their lifecycle state. Each
//! connection becomes one edge labelled with both port names, oriented
//! from the `provide` side to the `use` side; anything involving a
//! bidirectional port (or two ports of the same role) is drawn both ways.
//! Peers outside the network are drawn as dashed ellipses.

use std::fmt;

use cortix_core::PortMode;

use crate::network::{Edge, Network};

/// Display adapter writing a network as DOT.
pub struct Dot<'a> {
    network: &'a Network,
}

impl<'a> Dot<'a> {
    /// Wrap a network for rendering.
    pub fn new(network: &'a Network) -> Self {
        Self { network }
    }
}

/// Orientation of an edge as drawn.
#[derive(Debug, PartialEq, Eq)]
enum Orientation {
    /// `a -> b`.
    Forward,
    /// `b -> a`.
    Reverse,
    /// `a -> b [dir=both]`.
    Both,
}

fn orientation(edge: &Edge) -> Orientation {
    match (edge.a_mode, edge.b_mode) {
        (PortMode::Provide, PortMode::Use) => Orientation::Forward,
        (PortMode::Use, PortMode::Provide) => Orientation::Reverse,
        _ => Orientation::Both,
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn quote(s: &str) -> String {
    format!("\"{}\"", escape(s))
}

impl fmt::Display for Dot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "digraph network {{")?;
        writeln!(f, "    rankdir=LR;")?;
        writeln!(f, "    node [shape=box];")?;

        for (name, state) in self.network.nodes() {
            writeln!(
                f,
                "    {} [label=\"{}\\n({state})\"];",
                quote(name),
                escape(name)
            )?;
        }

        for edge in self.network.edges() {
            let (tail, head, both) = match orientation(edge) {
                Orientation::Forward => (&edge.a, &edge.b, false),
                Orientation::Reverse => (&edge.b, &edge.a, false),
                Orientation::Both => (&edge.a, &edge.b, true),
            };
            write!(
                f,
                "    {} -> {} [taillabel={}, headlabel={}",
                quote(&tail.module),
                quote(&head.module),
                quote(&tail.port),
                quote(&head.port)
            )?;
            if both {
                write!(f, ", dir=both")?;
            }
            writeln!(f, "];")?;
        }

        for ext in self.network.externals() {
            writeln!(
                f,
                "    {} [shape=ellipse, style=dashed];",
                quote(&ext.peer.module)
            )?;
            writeln!(
                f,
                "    {} -> {} [taillabel={}, headlabel={}, label={}, dir=both, style=dashed];",
                quote(&ext.endpoint.module),
                quote(&ext.peer.module),
                quote(&ext.endpoint.port),
                quote(&ext.peer.port),
                quote(ext.transport)
            )?;
        }

        writeln!(f, "}}")
    }
}
