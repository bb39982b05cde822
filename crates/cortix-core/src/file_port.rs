//! File-slot transport for modules that still exchange data through a
//! shared directory.
//!
//! Each direction is a single slot file. The writer publishes a payload
//! by writing `<slot>.tmp` and renaming it onto `<slot>` (atomic on the
//! same filesystem), then polls until the reader has consumed it. The
//! reader polls for `<slot>`, takes `<slot>.lock` with `create_new`,
//! reads and deletes the slot, then releases the lock. Polls back off
//! exponentially up to a cap and wake early on the termination signal.
//!
//! A writer that gives up retracts its slot under the reader's lock. If
//! the reader consumed the slot first, the send counts as delivered.
//!
//! A file peer cannot signal that it terminated, so only timeouts and
//! cancellation end an unmatched wait. Bind a port to this transport
//! with [`Port::bind_external`](crate::Port::bind_external).

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam_channel::select;

use crate::transport::{Transport, TransportError, Wait};

/// How long a retracting writer waits for a reader to release the lock.
const RETRACT_PATIENCE: Duration = Duration::from_secs(2);

/// Location and polling behaviour of a file-slot connection.
#[derive(Clone, Debug)]
pub struct FilePortConfig {
    /// Directory shared with the peer.
    pub directory: PathBuf,
    /// Slot file this side writes into.
    pub outgoing: String,
    /// Slot file this side reads from.
    pub incoming: String,
    /// First poll delay in milliseconds. Default: 1.
    pub poll_interval_ms: u64,
    /// Multiplier applied to the delay after each empty poll. Default: 2.0.
    pub backoff_factor: f64,
    /// Upper bound on the poll delay in milliseconds. Default: 50.
    pub max_poll_interval_ms: u64,
}

impl FilePortConfig {
    /// Config with default polling for the given directory and slot names.
    pub fn new(
        directory: impl Into<PathBuf>,
        outgoing: impl Into<String>,
        incoming: impl Into<String>,
    ) -> Self {
        Self {
            directory: directory.into(),
            outgoing: outgoing.into(),
            incoming: incoming.into(),
            poll_interval_ms: 1,
            backoff_factor: 2.0,
            max_poll_interval_ms: 50,
        }
    }

    /// The mirror-image config for the peer on the other side.
    pub fn mirrored(&self) -> Self {
        Self {
            outgoing: self.incoming.clone(),
            incoming: self.outgoing.clone(),
            ..self.clone()
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), String> {
        for (which, name) in [("outgoing", &self.outgoing), ("incoming", &self.incoming)] {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(format!("{which} slot name '{name}' must be a plain file name"));
            }
        }
        if self.outgoing == self.incoming {
            return Err(format!(
                "outgoing and incoming slots must differ, both are '{}'",
                self.outgoing
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be at least 1".to_string());
        }
        if self.max_poll_interval_ms < self.poll_interval_ms {
            return Err(format!(
                "max_poll_interval_ms ({}) is below poll_interval_ms ({})",
                self.max_poll_interval_ms, self.poll_interval_ms
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(format!(
                "backoff_factor must be finite and >= 1.0, got {}",
                self.backoff_factor
            ));
        }
        Ok(())
    }
}

/// Errors opening a file-slot transport.
#[derive(Debug)]
pub enum FilePortError {
    /// The configuration failed validation.
    InvalidConfig {
        /// Description of the violated invariant.
        reason: String,
    },
    /// The shared directory could not be created.
    Io(io::Error),
}

impl fmt::Display for FilePortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } => write!(f, "invalid file port config: {reason}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for FilePortError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidConfig { .. } => None,
        }
    }
}

impl From<io::Error> for FilePortError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Rendezvous transport over slot files in a shared directory.
#[derive(Debug)]
pub struct FileTransport {
    config: FilePortConfig,
    out_slot: PathBuf,
    out_tmp: PathBuf,
    out_lock: PathBuf,
    in_slot: PathBuf,
    in_lock: PathBuf,
}

impl FileTransport {
    /// Validate the config and create the shared directory if needed.
    pub fn open(config: FilePortConfig) -> Result<Self, FilePortError> {
        config
            .validate()
            .map_err(|reason| FilePortError::InvalidConfig { reason })?;
        fs::create_dir_all(&config.directory)?;
        let dir = &config.directory;
        Ok(Self {
            out_slot: dir.join(&config.outgoing),
            out_tmp: dir.join(format!("{}.tmp", config.outgoing)),
            out_lock: dir.join(format!("{}.lock", config.outgoing)),
            in_slot: dir.join(&config.incoming),
            in_lock: dir.join(format!("{}.lock", config.incoming)),
            config,
        })
    }

    /// The config this transport was opened with.
    pub fn config(&self) -> &FilePortConfig {
        &self.config
    }

    /// Call `attempt` until it yields a value, backing off between polls.
    fn poll<T>(
        &self,
        wait: Wait<'_>,
        mut attempt: impl FnMut() -> Result<Option<T>, TransportError>,
    ) -> Result<T, TransportError> {
        let deadline = wait.timeout.map(|d| Instant::now() + d);
        let cap = Duration::from_millis(self.config.max_poll_interval_ms);
        let mut delay = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            if let Some(value) = attempt()? {
                return Ok(value);
            }
            let mut nap = delay;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(TransportError::TimedOut);
                }
                nap = nap.min(deadline - now);
            }
            select! {
                recv(wait.cancel) -> _ => return Err(TransportError::Cancelled),
                default(nap) => {}
            }
            delay = delay.mul_f64(self.config.backoff_factor).min(cap);
        }
    }

    /// Withdraw our published slot after `failure`.
    ///
    /// Waits for a reader holding the lock to finish. Returns `Ok` when the
    /// reader consumed the slot after all, `failure` once it is withdrawn.
    fn retract(&self, failure: TransportError) -> Result<(), TransportError> {
        let deadline = Instant::now() + RETRACT_PATIENCE;
        let cap = Duration::from_millis(self.config.max_poll_interval_ms);
        let mut delay = Duration::from_millis(self.config.poll_interval_ms);
        let lock = loop {
            match Lock::acquire(&self.out_lock) {
                Ok(lock) => break lock,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        tracing::warn!(
                            slot = %self.out_slot.display(),
                            "reader kept the slot lock, payload may still be read"
                        );
                        return Err(failure);
                    }
                    std::thread::sleep(delay);
                    delay = delay.mul_f64(self.config.backoff_factor).min(cap);
                }
                Err(e) => return Err(io_err(e)),
            }
        };
        let outcome = match fs::remove_file(&self.out_slot) {
            Ok(()) => Err(failure),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(e)),
        };
        drop(lock);
        outcome
    }
}

impl Transport for FileTransport {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn send(&self, bytes: Vec<u8>, wait: Wait<'_>) -> Result<(), TransportError> {
        // Depth one: a previous payload must have been consumed first.
        self.poll(wait, || Ok((!self.out_slot.exists()).then_some(())))?;

        let mut tmp = fs::File::create(&self.out_tmp).map_err(io_err)?;
        tmp.write_all(&bytes).map_err(io_err)?;
        tmp.sync_all().map_err(io_err)?;
        drop(tmp);
        fs::rename(&self.out_tmp, &self.out_slot).map_err(io_err)?;

        match self.poll(wait, || Ok((!self.out_slot.exists()).then_some(()))) {
            Ok(()) => Ok(()),
            Err(failure) => self.retract(failure),
        }
    }

    fn recv(&self, wait: Wait<'_>) -> Result<Vec<u8>, TransportError> {
        self.poll(wait, || {
            if !self.in_slot.exists() {
                return Ok(None);
            }
            let lock = match Lock::acquire(&self.in_lock) {
                Ok(lock) => lock,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
                Err(e) => return Err(io_err(e)),
            };
            let bytes = match fs::read(&self.in_slot) {
                Ok(bytes) => bytes,
                // Retracted between the existence check and the lock.
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(io_err(e)),
            };
            fs::remove_file(&self.in_slot).map_err(io_err)?;
            drop(lock);
            Ok(Some(bytes))
        })
    }
}

/// Exclusive lock file, removed on drop.
struct Lock {
    path: PathBuf,
}

impl Lock {
    fn acquire(path: &Path) -> io::Result<Self> {
        OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn io_err(e: io::Error) -> TransportError {
    TransportError::Io(e.to_string())
}
