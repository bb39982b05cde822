//! The [`Transport`] seam between a [`Port`](crate::Port) and its medium,
//! and the in-memory rendezvous implementation.
//!
//! A transport moves opaque payload bytes between exactly two endpoints
//! with rendezvous semantics: `send` returns only once the peer has taken
//! the payload. Ports translate [`TransportError`] into
//! [`PortError`](crate::PortError) values carrying endpoint identities.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{after, never, select, Receiver, Sender};

/// Blocking parameters for a single transport operation.
#[derive(Clone, Copy)]
pub struct Wait<'a> {
    /// Give up after this long. `None` blocks indefinitely.
    pub timeout: Option<Duration>,
    /// Termination signal. Fires (disconnects) when the backend shuts down.
    pub cancel: &'a Receiver<()>,
}

impl Wait<'_> {
    /// Timer channel for this wait: fires after `timeout`, or never.
    pub fn timer(&self) -> Receiver<std::time::Instant> {
        match self.timeout {
            Some(d) => after(d),
            None => never(),
        }
    }
}

/// Failure of a transport operation, before endpoint attribution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The other side is gone.
    Disconnected,
    /// The wait's timeout elapsed.
    TimedOut,
    /// The wait's termination signal fired.
    Cancelled,
    /// The medium failed.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "peer disconnected"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Io(reason) => write!(f, "I/O: {reason}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// A rendezvous medium between two port endpoints.
///
/// Implementations must block `send` until the peer's `recv` has taken
/// the payload (buffer depth at most one), and must honour both the
/// timeout and the termination signal carried by [`Wait`].
pub trait Transport: Send {
    /// Short name of the medium, for logs and diagnostics.
    fn kind(&self) -> &'static str;

    /// Hand `bytes` to the peer, blocking until it is taken.
    fn send(&self, bytes: Vec<u8>, wait: Wait<'_>) -> Result<(), TransportError>;

    /// Block until the peer sends, then return its bytes.
    fn recv(&self, wait: Wait<'_>) -> Result<Vec<u8>, TransportError>;
}

/// In-memory transport: one capacity-zero crossbeam channel per direction.
///
/// Dropping either side disconnects both channels, so the surviving side
/// observes [`TransportError::Disconnected`] on its next (or current)
/// blocking call.
pub struct ChannelTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl ChannelTransport {
    /// Create the two connected halves.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = crossbeam_channel::bounded(0);
        let (b_tx, a_rx) = crossbeam_channel::bounded(0);
        (Self { tx: a_tx, rx: a_rx }, Self { tx: b_tx, rx: b_rx })
    }
}

impl Transport for ChannelTransport {
    fn kind(&self) -> &'static str {
        "channel"
    }

    fn send(&self, bytes: Vec<u8>, wait: Wait<'_>) -> Result<(), TransportError> {
        let timer = wait.timer();
        select! {
            send(self.tx, bytes) -> res => res.map_err(|_| TransportError::Disconnected),
            recv(wait.cancel) -> _ => Err(TransportError::Cancelled),
            recv(timer) -> _ => Err(TransportError::TimedOut),
        }
    }

    fn recv(&self, wait: Wait<'_>) -> Result<Vec<u8>, TransportError> {
        let timer = wait.timer();
        select! {
            recv(self.rx) -> msg => msg.map_err(|_| TransportError::Disconnected),
            recv(wait.cancel) -> _ => Err(TransportError::Cancelled),
            recv(timer) -> _ => Err(TransportError::TimedOut),
        }
    }
}
