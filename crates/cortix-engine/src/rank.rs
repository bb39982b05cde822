//! Distributed-rank backend: a fixed-size job of ranks exchanging
//! point-to-point messages.
//!
//! Every rank owns a [`Communicator`] with its own inbox. Port traffic
//! travels as tagged messages (`tag` = connection index) with
//! synchronous-send semantics: the sender blocks until the receiving
//! rank matches the message by `(source, tag)` and takes its zero-capacity
//! acknowledgement. The receiver only keeps a message whose sender is
//! still waiting for that acknowledgement, so a send that timed out or
//! was cancelled is never delivered later.
//!
//! Rank layout for a network of N modules:
//!
//! ```text
//! rank 0        bookkeeping: collects one completion notice per module
//! ranks 1..=N   one module each, in registration order
//! ranks > N     idle
//! ```
//!
//! A rank that finishes broadcasts a finalize notice, so peers blocked in
//! `recv` on it observe `PeerGone`. Synchronous sends still queued for it
//! are released with `PeerGone` when its inbox is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cortix_core::{Endpoint, ModuleState, Transport, TransportError, Wait};
use crossbeam_channel::{select, unbounded, Receiver, Sender};

use crate::backend::{ConcurrencyBackend, Job, Launch, LaunchFailure, TaskHandle, TaskSlot};
use crate::config::ConfigError;
use crate::error::CortixError;

// ── Messages ───────────────────────────────────────────────────────

enum Envelope {
    Data {
        source: usize,
        tag: usize,
        bytes: Vec<u8>,
        ack: Sender<()>,
    },
    Finalized {
        source: usize,
    },
    Notice(CompletionNotice),
}

struct Parked {
    source: usize,
    tag: usize,
    bytes: Vec<u8>,
    ack: Sender<()>,
}

#[derive(Default)]
struct Mailbox {
    parked: Vec<Parked>,
    finalized: HashSet<usize>,
    notices: Vec<CompletionNotice>,
}

/// Completion notice a module rank sends to rank 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionNotice {
    /// Sending rank.
    pub rank: usize,
    /// Module hosted on that rank.
    pub module: String,
    /// Terminal state of the module.
    pub state: ModuleState,
    /// Time spent in `run()`.
    pub elapsed: Duration,
}

/// What rank 0 collected over the job.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RootSummary {
    /// Ranks in the job.
    pub world_size: usize,
    /// Ranks that hosted no module (besides rank 0).
    pub idle_ranks: usize,
    /// Completion notices in arrival order.
    pub notices: Vec<CompletionNotice>,
}

impl RootSummary {
    /// Number of modules that reported completion.
    pub fn completed(&self) -> usize {
        self.notices
            .iter()
            .filter(|n| n.state == ModuleState::Completed)
            .count()
    }
}

// ── Communicator ───────────────────────────────────────────────────

/// One rank's endpoint in the job.
pub struct Communicator {
    rank: usize,
    peers: Arc<Vec<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    mailbox: Mutex<Mailbox>,
}

impl Communicator {
    /// Build the communicators of a `size`-rank job, indexed by rank.
    pub fn world(size: usize) -> Vec<Communicator> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        let peers = Arc::new(senders);
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Communicator {
                rank,
                peers: Arc::clone(&peers),
                inbox,
                mailbox: Mutex::new(Mailbox::default()),
            })
            .collect()
    }

    /// This rank.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Ranks in the job.
    pub fn size(&self) -> usize {
        self.peers.len()
    }

    /// Send `bytes` to `dest` under `tag`, blocking until it is matched.
    ///
    /// On timeout or cancellation the message stays queued at `dest`, but
    /// its acknowledgement can no longer be taken, so `dest` discards it.
    pub fn send(
        &self,
        dest: usize,
        tag: usize,
        bytes: Vec<u8>,
        wait: Wait<'_>,
    ) -> Result<(), TransportError> {
        let inbox = self.peers.get(dest).ok_or(TransportError::Disconnected)?;
        let (ack, acked) = crossbeam_channel::bounded(0);
        inbox
            .send(Envelope::Data {
                source: self.rank,
                tag,
                bytes,
                ack,
            })
            .map_err(|_| TransportError::Disconnected)?;
        let timer = wait.timer();
        select! {
            recv(acked) -> r => r.map_err(|_| TransportError::Disconnected),
            recv(wait.cancel) -> _ => Err(TransportError::Cancelled),
            recv(timer) -> _ => Err(TransportError::TimedOut),
        }
    }

    /// Block until a message from `source` under `tag` arrives.
    pub fn recv(
        &self,
        source: usize,
        tag: usize,
        wait: Wait<'_>,
    ) -> Result<Vec<u8>, TransportError> {
        let timer = wait.timer();
        loop {
            let matched = {
                let mut mailbox = self.mailbox.lock().unwrap_or_else(PoisonError::into_inner);
                match mailbox
                    .parked
                    .iter()
                    .position(|p| p.source == source && p.tag == tag)
                {
                    Some(i) => Some(mailbox.parked.remove(i)),
                    None if mailbox.finalized.contains(&source) => {
                        return Err(TransportError::Disconnected);
                    }
                    None => None,
                }
            };
            if let Some(parked) = matched {
                // Fails once the sender has given up waiting.
                if parked.ack.send(()).is_ok() {
                    return Ok(parked.bytes);
                }
                tracing::trace!(source, tag, "dropped message from an abandoned send");
                continue;
            }
            select! {
                recv(self.inbox) -> envelope => match envelope {
                    Ok(envelope) => self.file(envelope),
                    Err(_) => return Err(TransportError::Disconnected),
                },
                recv(wait.cancel) -> _ => return Err(TransportError::Cancelled),
                recv(timer) -> _ => return Err(TransportError::TimedOut),
            }
        }
    }

    /// Tell every other rank this one is done.
    pub fn finalize(&self) {
        for (rank, peer) in self.peers.iter().enumerate() {
            if rank != self.rank {
                let _ = peer.send(Envelope::Finalized { source: self.rank });
            }
        }
    }

    /// Send a completion notice to rank 0.
    pub fn notify_root(&self, notice: CompletionNotice) {
        if let Some(root) = self.peers.first() {
            let _ = root.send(Envelope::Notice(notice));
        }
    }

    /// Collect completion notices until `expected` arrived or `cancel` fires.
    ///
    /// Notices already queued when `cancel` fires are still collected.
    pub fn collect_notices(&self, expected: usize, cancel: &Receiver<()>) -> Vec<CompletionNotice> {
        loop {
            {
                let mut mailbox = self.mailbox.lock().unwrap_or_else(PoisonError::into_inner);
                if mailbox.notices.len() >= expected {
                    return std::mem::take(&mut mailbox.notices);
                }
            }
            select! {
                recv(self.inbox) -> envelope => match envelope {
                    Ok(envelope) => self.file(envelope),
                    Err(_) => break,
                },
                recv(cancel) -> _ => break,
            }
        }
        for envelope in self.inbox.try_iter() {
            self.file(envelope);
        }
        let mut mailbox = self.mailbox.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut mailbox.notices)
    }

    fn file(&self, envelope: Envelope) {
        let mut mailbox = self.mailbox.lock().unwrap_or_else(PoisonError::into_inner);
        match envelope {
            Envelope::Data {
                source,
                tag,
                bytes,
                ack,
            } => mailbox.parked.push(Parked {
                source,
                tag,
                bytes,
                ack,
            }),
            Envelope::Finalized { source } => {
                mailbox.finalized.insert(source);
            }
            Envelope::Notice(notice) => mailbox.notices.push(notice),
        }
    }
}

// ── RankTransport ──────────────────────────────────────────────────

/// Port transport over a rank communicator.
pub struct RankTransport {
    comm: Arc<Communicator>,
    peer: usize,
    tag: usize,
}

impl RankTransport {
    /// Transport to `peer` rank for connection `tag`.
    pub fn new(comm: Arc<Communicator>, peer: usize, tag: usize) -> Self {
        Self { comm, peer, tag }
    }
}

impl Transport for RankTransport {
    fn kind(&self) -> &'static str {
        "rank"
    }

    fn send(&self, bytes: Vec<u8>, wait: Wait<'_>) -> Result<(), TransportError> {
        self.comm.send(self.peer, self.tag, bytes, wait)
    }

    fn recv(&self, wait: Wait<'_>) -> Result<Vec<u8>, TransportError> {
        self.comm.recv(self.peer, self.tag, wait)
    }
}

// ── RankBackend ────────────────────────────────────────────────────

/// Backend running each module on its own rank of a fixed-size job.
#[derive(Debug)]
pub struct RankBackend {
    world_size: usize,
}

impl RankBackend {
    /// Backend for a job of `world_size` ranks.
    pub fn new(world_size: usize) -> Self {
        Self { world_size }
    }

    /// Ranks in the job.
    pub fn world_size(&self) -> usize {
        self.world_size
    }
}

impl ConcurrencyBackend for RankBackend {
    fn name(&self) -> &'static str {
        "ranks"
    }

    /// A job needs one rank per module plus rank 0.
    ///
    /// Larger jobs are accepted: the surplus ranks stay idle and are
    /// counted in [`RootSummary::idle_ranks`].
    fn check_capacity(&self, modules: usize) -> Result<(), CortixError> {
        let required = modules + 1;
        if self.world_size < required {
            return Err(CortixError::BackendUnavailable {
                backend: self.name(),
                required,
                available: self.world_size,
            });
        }
        Ok(())
    }

    fn launch(&mut self, job: Job) -> Result<Launch, LaunchFailure> {
        let Job {
            modules,
            edges,
            cancel,
        } = job;
        self.check_capacity(modules.len())?;

        let rank_of: HashMap<&str, usize> = modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name(), i + 1))
            .collect();
        let mut routes: HashMap<Endpoint, (usize, usize)> = HashMap::new();
        for (tag, edge) in edges.iter().enumerate() {
            if let (Some(&ra), Some(&rb)) = (
                rank_of.get(edge.a.module.as_str()),
                rank_of.get(edge.b.module.as_str()),
            ) {
                routes.insert(edge.a.clone(), (rb, tag));
                routes.insert(edge.b.clone(), (ra, tag));
            }
        }

        let mut comms = Communicator::world(self.world_size).into_iter();
        let root = comms.next();
        let module_count = modules.len();
        let idle_ranks = self.world_size - module_count - 1;

        let mut tasks = Vec::with_capacity(module_count);
        for (index, mut scheduled) in modules.into_iter().enumerate() {
            let rank = index + 1;
            let comm = match comms.next() {
                Some(comm) => Arc::new(comm),
                None => break,
            };
            for port in scheduled.ports_mut().iter_mut() {
                let Some(&(peer, tag)) = port.peer().and_then(|p| routes.get(p)) else {
                    continue;
                };
                let transport = Box::new(RankTransport::new(Arc::clone(&comm), peer, tag));
                if let Err(e) = port.replace_transport(transport) {
                    let error = CortixError::Network(e.into());
                    return Err(LaunchFailure::partial(tasks, None, error));
                }
            }
            let slot = TaskSlot {
                backend: self.name(),
                index,
                rank: Some(rank),
            };
            let module = scheduled.name().to_string();
            let spawned = TaskHandle::spawn(
                scheduled,
                slot,
                cancel.clone(),
                format!("cortix-rank-{rank}"),
                move |outcome| {
                    comm.notify_root(CompletionNotice {
                        rank,
                        module,
                        state: if outcome.result.is_ok() {
                            ModuleState::Completed
                        } else {
                            ModuleState::Failed
                        },
                        elapsed: outcome.elapsed,
                    });
                    comm.finalize();
                },
            );
            match spawned {
                Ok(handle) => tasks.push(handle),
                Err(e) => {
                    let error = ConfigError::ThreadSpawnFailed {
                        reason: format!("rank {rank}: {e}"),
                    };
                    return Err(LaunchFailure::partial(tasks, None, error));
                }
            }
        }
        // Remaining communicators belong to idle ranks.
        drop(comms);

        let world_size = self.world_size;
        let root = match root {
            Some(comm) => {
                let spawned = std::thread::Builder::new()
                    .name("cortix-rank-0".into())
                    .spawn(move || RootSummary {
                        world_size,
                        idle_ranks,
                        notices: comm.collect_notices(module_count, &cancel),
                    });
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        let error = ConfigError::ThreadSpawnFailed {
                            reason: format!("rank 0: {e}"),
                        };
                        return Err(LaunchFailure::partial(tasks, None, error));
                    }
                }
            }
            None => None,
        };

        tracing::debug!(
            world_size,
            module_ranks = module_count,
            idle_ranks,
            "rank job launched"
        );
        Ok(Launch { tasks, root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn idle() -> Receiver<()> {
        crossbeam_channel::never()
    }

    fn wait(cancel: &Receiver<()>) -> Wait<'_> {
        Wait {
            timeout: Some(Duration::from_secs(5)),
            cancel,
        }
    }

    #[test]
    fn messages_match_on_source_and_tag() {
        let world: Vec<Arc<Communicator>> =
            Communicator::world(4).into_iter().map(Arc::new).collect();

        let senders: Vec<_> = [1_usize, 2]
            .into_iter()
            .map(|rank| {
                let comm = Arc::clone(&world[rank]);
                thread::spawn(move || {
                    let cancel = idle();
                    comm.send(3, 0, vec![rank as u8], wait(&cancel)).unwrap();
                })
            })
            .collect();

        // Whichever message lands first, each recv gets its own source.
        let cancel = idle();
        assert_eq!(world[3].recv(2, 0, wait(&cancel)).unwrap(), vec![2]);
        assert_eq!(world[3].recv(1, 0, wait(&cancel)).unwrap(), vec![1]);
        for h in senders {
            h.join().unwrap();
        }
    }

    #[test]
    fn finalized_peer_is_disconnected() {
        let mut world = Communicator::world(2).into_iter();
        let zero = world.next().unwrap();
        let one = world.next().unwrap();
        one.finalize();
        drop(one);
        let cancel = idle();
        assert_eq!(
            zero.recv(1, 0, wait(&cancel)).unwrap_err(),
            TransportError::Disconnected
        );
        assert_eq!(
            zero.send(1, 0, vec![1], wait(&cancel)).unwrap_err(),
            TransportError::Disconnected
        );
    }

    #[test]
    fn unmatched_send_times_out() {
        let world = Communicator::world(2);
        let cancel = idle();
        let err = world[0]
            .send(
                1,
                0,
                vec![],
                Wait {
                    timeout: Some(Duration::from_millis(20)),
                    cancel: &cancel,
                },
            )
            .unwrap_err();
        assert_eq!(err, TransportError::TimedOut);
    }

    fn briefly(cancel: &Receiver<()>) -> Wait<'_> {
        Wait {
            timeout: Some(Duration::from_millis(30)),
            cancel,
        }
    }

    #[test]
    fn timed_out_send_is_never_delivered() {
        let world: Vec<Arc<Communicator>> =
            Communicator::world(2).into_iter().map(Arc::new).collect();
        let cancel = idle();
        for stale in [1, 2] {
            assert_eq!(
                world[0].send(1, 0, vec![stale], briefly(&cancel)).unwrap_err(),
                TransportError::TimedOut
            );
        }
        assert_eq!(
            world[1].recv(0, 0, briefly(&cancel)).unwrap_err(),
            TransportError::TimedOut
        );

        // A retry is delivered on its own, not behind the stale payloads.
        let sender = Arc::clone(&world[0]);
        let h = thread::spawn(move || {
            let cancel = idle();
            sender.send(1, 0, vec![3], wait(&cancel))
        });
        assert_eq!(world[1].recv(0, 0, wait(&cancel)).unwrap(), vec![3]);
        h.join().unwrap().unwrap();
        assert_eq!(
            world[1].recv(0, 0, briefly(&cancel)).unwrap_err(),
            TransportError::TimedOut
        );
    }

    #[test]
    fn cancelled_send_is_never_delivered() {
        let world = Communicator::world(2);
        let (stop, cancel) = crossbeam_channel::bounded::<()>(0);
        drop(stop);
        assert_eq!(
            world[0].send(1, 0, vec![1], wait(&cancel)).unwrap_err(),
            TransportError::Cancelled
        );
        let running = idle();
        assert_eq!(
            world[1].recv(0, 0, briefly(&running)).unwrap_err(),
            TransportError::TimedOut
        );
    }

    #[test]
    fn root_collects_notices() {
        let world = Communicator::world(2);
        world[1].notify_root(CompletionNotice {
            rank: 1,
            module: "m".into(),
            state: ModuleState::Completed,
            elapsed: Duration::from_millis(3),
        });
        let notices = world[0].collect_notices(1, &idle());
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].module, "m");
    }

    #[test]
    fn notices_queued_before_cancel_are_kept() {
        let world = Communicator::world(3);
        for rank in [1, 2] {
            world[rank].notify_root(CompletionNotice {
                rank,
                module: format!("m{rank}"),
                state: ModuleState::Completed,
                elapsed: Duration::ZERO,
            });
        }
        let (stop, cancel) = crossbeam_channel::bounded::<()>(0);
        drop(stop);
        // Expecting more than arrived: only cancellation ends the wait.
        let notices = world[0].collect_notices(5, &cancel);
        let ranks: Vec<usize> = notices.iter().map(|n| n.rank).collect();
        assert_eq!(ranks, [1, 2]);
    }

    #[test]
    fn capacity_needs_one_rank_beyond_modules() {
        let backend = RankBackend::new(3);
        assert!(backend.check_capacity(2).is_ok());
        assert_eq!(
            backend.check_capacity(3).unwrap_err(),
            CortixError::BackendUnavailable {
                backend: "ranks",
                required: 4,
                available: 3,
            }
        );
        // Surplus ranks are allowed and stay idle.
        assert!(RankBackend::new(10).check_capacity(2).is_ok());
    }
}
