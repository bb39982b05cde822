//! [`Port`]: a named, single-slot rendezvous endpoint.
//!
//! A port is wired to at most one peer. `send` blocks until the peer
//! performs the matching `recv` and hands the payload over by value;
//! `recv` blocks until the peer sends. There is no queueing beyond one
//! in-flight payload, so two modules exchanging time-stamped state can
//! never drift apart on a single connection.
//!
//! # Examples
//!
//! ```
//! use std::thread;
//! use cortix_core::{Endpoint, Port, PortMode};
//!
//! let mut a = Port::new(Endpoint::new("a", "link"), PortMode::Provide);
//! let mut b = Port::new(Endpoint::new("b", "link"), PortMode::Use);
//! a.connect(&mut b).unwrap();
//!
//! let h = thread::spawn(move || b.recv::<u32>().unwrap());
//! a.send(42_u32).unwrap();
//! assert_eq!(h.join().unwrap(), 42);
//! ```

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{never, Receiver, TryRecvError};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{decode_payload, encode_payload};
use crate::error::PortError;
use crate::id::{Endpoint, PortMode};
use crate::transport::{ChannelTransport, Transport, TransportError, Wait};

/// The wired half of a port: peer identity plus transport medium.
struct Link {
    peer: Endpoint,
    transport: Box<dyn Transport>,
}

/// A named, bidirectional rendezvous endpoint owned by one module.
pub struct Port {
    endpoint: Endpoint,
    mode: PortMode,
    link: Option<Link>,
    timeout: Option<Duration>,
    cancel: Receiver<()>,
}

impl Port {
    /// Create an unconnected port. The mode is fixed for the port's lifetime.
    pub fn new(endpoint: Endpoint, mode: PortMode) -> Self {
        Self {
            endpoint,
            mode,
            link: None,
            timeout: None,
            cancel: never(),
        }
    }

    /// Port name, unique within the owning module.
    pub fn name(&self) -> &str {
        &self.endpoint.port
    }

    /// Fully qualified identity of this port.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The port's role.
    pub fn mode(&self) -> PortMode {
        self.mode
    }

    /// Identity of the wired peer, if any.
    pub fn peer(&self) -> Option<&Endpoint> {
        self.link.as_ref().map(|l| &l.peer)
    }

    /// Whether a peer is wired. Says nothing about data availability.
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Name of the transport medium, if connected.
    pub fn transport_kind(&self) -> Option<&'static str> {
        self.link.as_ref().map(|l| l.transport.kind())
    }

    /// Default timeout applied to every `send`/`recv` on this port.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Set the default rendezvous timeout. `None` blocks indefinitely.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Install the backend termination signal.
    ///
    /// A blocked `send`/`recv` returns [`PortError::Cancelled`] once every
    /// sender of `cancel` has been dropped.
    pub fn set_cancel_signal(&mut self, cancel: Receiver<()>) {
        self.cancel = cancel;
    }

    /// Whether the termination signal has fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cancel.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Pair this port with `other` over an in-memory rendezvous channel.
    ///
    /// Symmetric: afterwards each side reports the other as its peer.
    /// Fails if either side already has a peer, or if both ports carry
    /// the same identity.
    pub fn connect(&mut self, other: &mut Port) -> Result<(), PortError> {
        if self.endpoint == other.endpoint {
            return Err(PortError::SelfConnect {
                endpoint: self.endpoint.clone(),
            });
        }
        self.ensure_unconnected()?;
        other.ensure_unconnected()?;
        let (here, there) = ChannelTransport::pair();
        self.attach(other.endpoint.clone(), Box::new(here))?;
        other.attach(self.endpoint.clone(), Box::new(there))
    }

    /// Wire this port to `peer` over an arbitrary transport.
    ///
    /// Used for peers that live outside the network, such as legacy
    /// modules reached through the file adapter. Fails with
    /// [`PortError::AlreadyConnected`] if a peer is already wired.
    pub fn bind_external(
        &mut self,
        peer: Endpoint,
        transport: Box<dyn Transport>,
    ) -> Result<(), PortError> {
        if peer == self.endpoint {
            return Err(PortError::SelfConnect {
                endpoint: self.endpoint.clone(),
            });
        }
        self.attach(peer, transport)
    }

    /// Swap the transport of an already wired port, keeping its peer.
    ///
    /// Backends call this at launch to move a connection onto their own
    /// medium (for example rank messaging).
    pub fn replace_transport(&mut self, transport: Box<dyn Transport>) -> Result<(), PortError> {
        match self.link.as_mut() {
            Some(link) => {
                tracing::debug!(
                    port = %self.endpoint,
                    from = link.transport.kind(),
                    to = transport.kind(),
                    "transport rebound"
                );
                link.transport = transport;
                Ok(())
            }
            None => Err(PortError::NotConnected {
                endpoint: self.endpoint.clone(),
            }),
        }
    }

    /// Unwire the port, returning the previous peer.
    pub fn disconnect(&mut self) -> Option<Endpoint> {
        self.link.take().map(|l| l.peer)
    }

    fn ensure_unconnected(&self) -> Result<(), PortError> {
        match &self.link {
            Some(link) => Err(PortError::AlreadyConnected {
                endpoint: self.endpoint.clone(),
                peer: link.peer.clone(),
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn attach(
        &mut self,
        peer: Endpoint,
        transport: Box<dyn Transport>,
    ) -> Result<(), PortError> {
        self.ensure_unconnected()?;
        self.link = Some(Link { peer, transport });
        Ok(())
    }

    /// Send `payload` to the peer, blocking until it is received.
    pub fn send<T: Serialize>(&self, payload: T) -> Result<(), PortError> {
        self.send_with(payload, self.timeout)
    }

    /// [`send`](Self::send) with a per-call timeout overriding the port default.
    pub fn send_timeout<T: Serialize>(&self, payload: T, timeout: Duration) -> Result<(), PortError> {
        self.send_with(payload, Some(timeout))
    }

    /// Block until the peer sends, then decode the payload as `T`.
    pub fn recv<T: DeserializeOwned>(&self) -> Result<T, PortError> {
        self.recv_with(self.timeout)
    }

    /// [`recv`](Self::recv) with a per-call timeout overriding the port default.
    pub fn recv_timeout<T: DeserializeOwned>(&self, timeout: Duration) -> Result<T, PortError> {
        self.recv_with(Some(timeout))
    }

    /// Send pre-encoded payload bytes.
    pub fn send_bytes(&self, bytes: Vec<u8>, timeout: Option<Duration>) -> Result<(), PortError> {
        let link = self.link()?;
        let wait = Wait {
            timeout,
            cancel: &self.cancel,
        };
        link.transport
            .send(bytes, wait)
            .map_err(|e| self.attribute(e, &link.peer, timeout))
    }

    /// Receive raw payload bytes.
    pub fn recv_bytes(&self, timeout: Option<Duration>) -> Result<Vec<u8>, PortError> {
        let link = self.link()?;
        let wait = Wait {
            timeout,
            cancel: &self.cancel,
        };
        link.transport
            .recv(wait)
            .map_err(|e| self.attribute(e, &link.peer, timeout))
    }

    fn send_with<T: Serialize>(&self, payload: T, timeout: Option<Duration>) -> Result<(), PortError> {
        // Fail on an unwired port before paying for encoding.
        self.link()?;
        let bytes = encode_payload(&payload).map_err(|e| PortError::Encode {
            endpoint: self.endpoint.clone(),
            reason: e.reason,
        })?;
        self.send_bytes(bytes, timeout)
    }

    fn recv_with<T: DeserializeOwned>(&self, timeout: Option<Duration>) -> Result<T, PortError> {
        let bytes = self.recv_bytes(timeout)?;
        decode_payload(&bytes).map_err(|e| PortError::Decode {
            endpoint: self.endpoint.clone(),
            reason: e.reason,
        })
    }

    fn link(&self) -> Result<&Link, PortError> {
        self.link.as_ref().ok_or_else(|| PortError::NotConnected {
            endpoint: self.endpoint.clone(),
        })
    }

    fn attribute(&self, e: TransportError, peer: &Endpoint, timeout: Option<Duration>) -> PortError {
        let endpoint = self.endpoint.clone();
        match e {
            // After termination a peer's exit is a consequence of the signal.
            TransportError::Disconnected if self.is_cancelled() => PortError::Cancelled { endpoint },
            TransportError::Disconnected => PortError::PeerGone {
                endpoint,
                peer: peer.clone(),
            },
            TransportError::TimedOut => PortError::RendezvousTimeout {
                endpoint,
                peer: peer.clone(),
                timeout: timeout.unwrap_or_default(),
            },
            TransportError::Cancelled => PortError::Cancelled { endpoint },
            TransportError::Io(reason) => PortError::Io { endpoint, reason },
        }
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("endpoint", &self.endpoint)
            .field("mode", &self.mode)
            .field("peer", &self.peer())
            .field("transport", &self.transport_kind())
            .field("timeout", &self.timeout)
            .finish()
    }
}
