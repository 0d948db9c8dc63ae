//! §4.6 — the remote-dependency handler: the only part of the core that
//! talks to another unit. Outgoing registration is synchronous (fires a
//! message, bumps a counter); incoming requests are deliberately *not*
//! matched immediately — they queue on `unhandled_remote_deps` until
//! `handle_deferred_remote` resolves the whole batch against a now-stable
//! view of the prior phase's local tasks.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use hashbrown::HashMap;
use log::warn;
use parking_lot::Mutex;

use crate::dephash::ensure_table;
use crate::deprecord::{DepRecord, DepType};
use crate::error::{Error, Result};
use crate::ids::{GlobalPtr, Phase, RemoteTaskRef, TaskId, UnitId};
use crate::pool::DepRecordPool;
use crate::task::{Task, TaskRef};
use crate::transport::{OutgoingDep, Transport};

#[derive(Default)]
pub struct RemoteDepHandler {
    /// The single global incoming queue (§4.6 "Incoming").
    unhandled: Mutex<Vec<DepRecord>>,
    /// Tasks currently waiting on at least one remote predecessor,
    /// keyed by id for O(1) removal on release (§4.7's "splice the task
    /// out of `remote_blocked_tasks`").
    remote_blocked: Mutex<HashMap<TaskId, TaskRef>>,
}

impl RemoteDepHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// §4.6 "Outgoing": called when `task` submits a dep whose address
    /// resolves to a unit other than us.
    pub fn register_outgoing(
        &self,
        task: &TaskRef,
        addr: GlobalPtr,
        phase: Phase,
        ty: DepType,
        self_unit: UnitId,
        transport: &dyn Transport,
    ) -> Result<()> {
        if ty != DepType::In {
            return Err(Error::Inval("remote dependency must be of type IN"));
        }

        let parent_is_root = match &task.parent {
            Some(p) => p.is_root(),
            None => true,
        };
        if !parent_is_root {
            warn!(
                "remote dependency on {:?} dropped: task's parent is not the root task",
                addr
            );
            return Ok(());
        }

        transport.send_remote_dep_request(
            addr.unit,
            RemoteTaskRef {
                owner: self_unit,
                id: task.id,
            },
            OutgoingDep { ty, addr, phase },
        )?;

        let prev = task.unresolved_remote.fetch_add(1, Ordering::AcqRel);
        if prev == 0 {
            self.remote_blocked.lock().insert(task.id, Arc::clone(task));
        }
        Ok(())
    }

    /// §4.10 "Remotely": a user-submitted `DIRECT` dep naming a task on
    /// another unit rather than an address. Sends a `DirectTaskDep`
    /// straight to the target's owner (no hash-table lookup — the target
    /// is already a concrete task reference) and blocks `task` on it the
    /// same way an address-derived direct dep would.
    pub fn register_outgoing_direct(
        &self,
        task: &TaskRef,
        target: RemoteTaskRef,
        self_unit: UnitId,
        transport: &dyn Transport,
    ) -> Result<()> {
        transport.send_direct_taskdep(
            target.owner,
            target,
            RemoteTaskRef {
                owner: self_unit,
                id: task.id,
            },
        )?;
        let prev = task.unresolved_remote.fetch_add(1, Ordering::AcqRel);
        if prev == 0 {
            self.remote_blocked.lock().insert(task.id, Arc::clone(task));
        }
        Ok(())
    }

    /// §4.6 "Incoming": files a freshly-arrived request for resolution at
    /// the next phase boundary. Never matched here.
    pub fn receive_incoming(
        &self,
        requester: RemoteTaskRef,
        dep: OutgoingDep,
        pool: &DepRecordPool,
    ) {
        let mut record = pool.allocate();
        record.ty = dep.ty;
        record.addr = dep.addr;
        record.phase = dep.phase;
        record.task = Weak::new();
        record.origin_unit = Some(requester.owner);
        record.remote_task = Some(requester);
        self.unhandled.lock().push(record);
    }

    /// A `DirectTaskDep` arrived for one of our own tasks (§4.10): attach
    /// the remote task named by it onto our task's `remote_successors` so
    /// our release engine notifies it when we finish. If our task has
    /// already finished by the time this arrives, there is no future
    /// completion event to hang the notification off of, so the release
    /// is sent immediately instead — the "every remote request is
    /// answered exactly once" contract (§5) must hold regardless of
    /// arrival order.
    pub fn receive_direct(&self, local_task: &TaskRef, remote_task: RemoteTaskRef, transport: &dyn Transport) {
        let mut inner = local_task.inner.lock();
        if local_task.is_active() {
            inner.remote_successors.push(DepRecord {
                ty: DepType::Direct,
                addr: GlobalPtr::new(
                    crate::ids::TeamId(0),
                    UnitId(0),
                    crate::ids::SegmentId(0),
                    0,
                ),
                phase: local_task.phase,
                task: Weak::new(),
                origin_unit: Some(remote_task.owner),
                remote_task: Some(remote_task),
            });
        } else {
            drop(inner);
            if let Err(e) = transport.send_remote_release(remote_task.owner, remote_task) {
                warn!("failed to release finished task's direct dep to {:?}: {}", remote_task.owner, e);
            }
        }
    }

    /// §4.7's symmetric remote-release path: a release arrived naming one
    /// of our tasks.
    pub fn release_remote_dep_counter(&self, task: &TaskRef) -> bool {
        let prev = task.unresolved_remote.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "unresolved_remote underflow on task {:?}", task.id);
        if prev == 1 {
            self.remote_blocked.lock().remove(&task.id);
            true
        } else {
            false
        }
    }

    /// Test-only hook: inserts `task` into `remote_blocked_tasks` without
    /// going through `register_outgoing` (which would also fire a
    /// transport message neither tested scenario needs).
    #[cfg(test)]
    pub fn track_for_cancellation_test(&self, task: &TaskRef) {
        self.remote_blocked.lock().insert(task.id, Arc::clone(task));
    }

    /// §4.9: drains every remote-blocked task, zeroing its remote
    /// counter. Returns the tasks that became runnable as a result (both
    /// counters now zero) so the caller can enqueue them.
    pub fn drain_remote_blocked(&self) -> Vec<TaskRef> {
        let drained: Vec<TaskRef> = self.remote_blocked.lock().drain().map(|(_, t)| t).collect();
        drained
            .into_iter()
            .filter(|t| {
                t.unresolved_remote.store(0, Ordering::Release);
                t.unresolved_local.load(Ordering::Acquire) == 0
            })
            .collect()
    }

    /// §4.6 "handle_deferred_remote": resolves the whole pending batch
    /// against `parent`'s (i.e. the root task's) hash table for the prior
    /// phase. Returns the set of remote-blocked tasks whose direct dep
    /// was newly registered — irrelevant to the caller beyond bookkeeping
    /// consistency, so callers typically ignore the result.
    pub fn handle_deferred_remote(
        &self,
        parent: &Task,
        bucket_count: usize,
        self_unit: UnitId,
        transport: &dyn Transport,
        pool: &DepRecordPool,
    ) {
        let pending: Vec<DepRecord> = std::mem::take(&mut *self.unhandled.lock());

        for record in pending {
            let origin = record
                .origin_unit
                .expect("incoming record always carries its origin");
            let remote_task = record
                .remote_task
                .expect("incoming record always names the requesting task");

            let (direct_candidate, satisfier) = {
                let mut guard = ensure_table(parent, bucket_count);
                let table = guard.as_mut().expect("ensure_table always populates");
                let slot = table.slot_for(record.addr);

                let mut direct_candidate: Option<TaskRef> = None;
                let mut satisfier: Option<TaskRef> = None;

                for existing in table.bucket(slot) {
                    if existing.addr.resolved() != record.addr.resolved() || !existing.ty.is_out() {
                        continue;
                    }
                    let candidate = match existing.task.upgrade() {
                        Some(t) => t,
                        None => continue,
                    };
                    if !candidate.is_active() {
                        continue;
                    }

                    if existing.phase < record.phase {
                        satisfier = Some(candidate);
                        break;
                    } else {
                        // Descending-phase order means later iterations
                        // in this branch are strictly closer to (lower
                        // than) `record.phase`, so always overwrite to
                        // end up with the lowest one (§4.6 step 1).
                        direct_candidate = Some(candidate);
                    }
                }

                (direct_candidate, satisfier)
            };
            // Parent's lock is released before touching any task's own
            // lock, per §5 "Parent mutex is never held while a child's
            // mutex is held."

            // Steps 2 and 3/4 are independent: a direct-dep candidate (if
            // any) is notified regardless of whether a satisfier was also
            // found, since it answers a different question (when may the
            // *local writer* proceed) than the satisfier/release choice
            // (when may *this* incoming read proceed).
            if let Some(candidate) = direct_candidate {
                let prev = candidate.unresolved_remote.fetch_add(1, Ordering::AcqRel);
                if prev == 0 {
                    self.remote_blocked
                        .lock()
                        .insert(candidate.id, Arc::clone(&candidate));
                }
                if let Err(e) = transport.send_direct_taskdep(
                    origin,
                    remote_task,
                    RemoteTaskRef {
                        owner: self_unit,
                        id: candidate.id,
                    },
                ) {
                    warn!("failed to notify direct-dep candidate at {:?}: {}", origin, e);
                }
            }

            match satisfier {
                Some(owner_task) => {
                    let mut inner = owner_task.inner.lock();
                    inner.remote_successors.push(DepRecord {
                        remote_task: Some(remote_task),
                        origin_unit: Some(origin),
                        ..record
                    });
                }
                None => {
                    if let Err(e) = transport.send_remote_release(origin, remote_task) {
                        warn!("failed to release incoming remote dep to {:?}: {}", origin, e);
                    }
                    pool.recycle(record);
                }
            }
        }
    }
}
