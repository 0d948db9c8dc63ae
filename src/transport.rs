//! §1/§6 — the transport collaborator: unit identity, a collective
//! barrier, point-to-point send, and non-blocking progress. `Transport`
//! is the trait a real DART-backed implementation would satisfy;
//! `LoopbackTransport` is an in-process stand-in used by tests and
//! single-unit programs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crossbeam::{Receiver, Sender};
use hashbrown::HashMap;

use crate::deprecord::DepType;
use crate::ids::{GlobalPtr, Phase, RemoteTaskRef, UnitId};

/// What an outgoing remote-dep request carries over the wire (§3
/// "Dependency record" fields relevant to the requester).
#[derive(Debug, Clone, Copy)]
pub struct OutgoingDep {
    pub ty: DepType,
    pub addr: GlobalPtr,
    pub phase: Phase,
}

/// A message that arrived for this unit. `Transport::progress` drains
/// whatever arrived and hands them back as a batch; `Runtime::progress`
/// is what actually invokes `handle_remote_task` / `handle_remote_direct`
/// / `release_remote_dep` for each one — see SPEC_FULL.md §6.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A unit wants to read/write through us: an incoming `§4.6`
    /// request to file on `unhandled_remote_deps`.
    DepRequest {
        requester: RemoteTaskRef,
        dep: OutgoingDep,
    },
    /// Our remote dep was satisfied with nothing further to track.
    Release { remote_task: RemoteTaskRef },
    /// `local_task` (named the way *we* know it — it's ours) must now
    /// wait for `remote_task` (named the way *we* know it — it's
    /// someone else's) to finish before it may run.
    DirectTaskDep {
        local_task: RemoteTaskRef,
        remote_task: RemoteTaskRef,
    },
}

/// A transport-layer failure, boxed so `LoopbackTransport` and a real
/// DART-backed implementation can each report their own error type through
/// the same trait. Surfaces to callers as `Error::Other` (§7 `OTHER`).
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

pub trait Transport: Send + Sync {
    fn myid(&self) -> UnitId;
    fn size(&self) -> usize;
    /// Blocks until every unit in the team has called `barrier`.
    fn barrier(&self);
    fn send_remote_dep_request(
        &self,
        target: UnitId,
        requester: RemoteTaskRef,
        dep: OutgoingDep,
    ) -> Result<(), TransportError>;
    fn send_remote_release(&self, target: UnitId, remote_task: RemoteTaskRef) -> Result<(), TransportError>;
    fn send_direct_taskdep(
        &self,
        target: UnitId,
        local_task: RemoteTaskRef,
        remote_task: RemoteTaskRef,
    ) -> Result<(), TransportError>;
    /// Drains whatever arrived since the last call. Never blocks.
    fn progress(&self) -> Vec<IncomingMessage>;
}

/// Shared routing table + barrier state for a group of `LoopbackUnit`s
/// living in the same process.
struct LoopbackShared {
    mailboxes: Mutex<HashMap<UnitId, Sender<IncomingMessage>>>,
    barrier_count: Mutex<usize>,
    barrier_generation: AtomicUsize,
    barrier_condvar: Condvar,
    size: usize,
}

/// A handle shared by every `LoopbackTransport` in one simulated team.
/// Build one with `LoopbackTeam::new(size)`, then call `unit(id)` once
/// per unit to get its `Transport`.
#[derive(Clone)]
pub struct LoopbackTeam(Arc<LoopbackShared>);

impl LoopbackTeam {
    pub fn new(size: usize) -> Self {
        Self(Arc::new(LoopbackShared {
            mailboxes: Mutex::new(HashMap::new()),
            barrier_count: Mutex::new(0),
            barrier_generation: AtomicUsize::new(0),
            barrier_condvar: Condvar::new(),
            size,
        }))
    }

    pub fn unit(&self, id: UnitId) -> LoopbackTransport {
        let (sender, receiver) = crossbeam::unbounded();
        self.0.mailboxes.lock().unwrap().insert(id, sender);
        LoopbackTransport {
            shared: self.0.clone(),
            id,
            receiver,
        }
    }
}

pub struct LoopbackTransport {
    shared: Arc<LoopbackShared>,
    id: UnitId,
    receiver: Receiver<IncomingMessage>,
}

impl LoopbackTransport {
    fn send(&self, target: UnitId, msg: IncomingMessage) -> Result<(), TransportError> {
        let mailboxes = self.shared.mailboxes.lock().unwrap();
        match mailboxes.get(&target) {
            Some(sender) => {
                // A disconnected peer (already torn down) drops the message
                // silently, matching "no timeouts" — liveness is a user
                // contract, not something the transport enforces. Only an
                // unknown target unit is a transport-level error.
                let _ = sender.send(msg);
                Ok(())
            }
            None => Err(format!("no such unit {:?} in this team", target).into()),
        }
    }
}

impl Transport for LoopbackTransport {
    fn myid(&self) -> UnitId {
        self.id
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) {
        let generation = self.shared.barrier_generation.load(Ordering::Acquire);
        let mut count = self.shared.barrier_count.lock().unwrap();
        *count += 1;
        if *count == self.shared.size {
            *count = 0;
            self.shared.barrier_generation.fetch_add(1, Ordering::AcqRel);
            self.shared.barrier_condvar.notify_all();
        } else {
            while self.shared.barrier_generation.load(Ordering::Acquire) == generation {
                count = self.shared.barrier_condvar.wait(count).unwrap();
                let _ = &count;
            }
        }
    }

    fn send_remote_dep_request(
        &self,
        target: UnitId,
        requester: RemoteTaskRef,
        dep: OutgoingDep,
    ) -> Result<(), TransportError> {
        self.send(target, IncomingMessage::DepRequest { requester, dep })
    }

    fn send_remote_release(&self, target: UnitId, remote_task: RemoteTaskRef) -> Result<(), TransportError> {
        self.send(target, IncomingMessage::Release { remote_task })
    }

    fn send_direct_taskdep(
        &self,
        target: UnitId,
        local_task: RemoteTaskRef,
        remote_task: RemoteTaskRef,
    ) -> Result<(), TransportError> {
        self.send(
            target,
            IncomingMessage::DirectTaskDep {
                local_task,
                remote_task,
            },
        )
    }

    fn progress(&self) -> Vec<IncomingMessage> {
        self.receiver.try_iter().collect()
    }
}
