//! §4.7 — the release engine: what runs after a task finishes (or after a
//! remote release arrives) to decrement successor counters and hand off
//! whatever became runnable.
//!
//! Neither function here talks to `WorkerPool` directly: the precise
//! thing that happens to a newly-runnable task (spawn it on a rayon
//! worker and wire up the next `on_complete`) is a `Runtime`-level
//! concern, so both take a `ready` callback instead and leave the wiring
//! to `runtime.rs`.

use std::sync::atomic::Ordering;

use log::{trace, warn};

use crate::remote::RemoteDepHandler;
use crate::pool::DepRecordPool;
use crate::task::{TaskRef, TaskState};
use crate::transport::Transport;

/// Called once `task` has finished running (or been cancelled). Sends a
/// release to every remote successor unless `task` was cancelled (§5
/// "Cancellation": stale data must not wake a remote waiter), recycles
/// each of those records, then walks local successors decrementing
/// `unresolved_local` and handing whichever one reaches zero on both
/// counters to `ready`.
pub fn release_local_task(
    task: &TaskRef,
    pool: &DepRecordPool,
    transport: &dyn Transport,
    ready: &dyn Fn(TaskRef),
) {
    let cancelled = task.state() == TaskState::Cancelled;

    let (remote_successors, successors) = {
        let mut inner = task.inner.lock();
        (
            std::mem::take(&mut inner.remote_successors),
            std::mem::take(&mut inner.successors),
        )
    };

    for record in remote_successors {
        let origin = record.origin_unit.expect("remote successor always carries its origin");
        let remote_task = record.remote_task.expect("remote successor always names the requester");
        if !cancelled {
            if let Err(e) = transport.send_remote_release(origin, remote_task) {
                warn!("failed to release remote successor at {:?}: {}", origin, e);
            }
        }
        pool.recycle(record);
    }

    for successor in successors {
        let n = successor.unresolved_local.fetch_sub(1, Ordering::AcqRel);
        assert!(n > 0, "unresolved_local underflow on task {:?}", successor.id);
        let local_done = n == 1;
        trace!(
            "released local predecessor edge onto {:?}, local_done={}",
            successor.id, local_done
        );
        if !local_done {
            continue;
        }
        if successor.unresolved_remote.load(Ordering::Acquire) != 0 {
            continue;
        }
        maybe_ready(&successor, ready);
    }
}

/// The symmetric remote-release path (§4.7): a release arrived naming one
/// of our tasks. Decrements `unresolved_remote` through the handler (which
/// also splices the task out of `remote_blocked_tasks` on the 1->0
/// transition) and hands it to `ready` if `unresolved_local` is already
/// zero.
pub fn release_remote_dep(task: &TaskRef, handler: &RemoteDepHandler, ready: &dyn Fn(TaskRef)) {
    let became_zero = handler.release_remote_dep_counter(task);
    if !became_zero {
        return;
    }
    if task.unresolved_local.load(Ordering::Acquire) != 0 {
        return;
    }
    maybe_ready(task, ready);
}

/// Hands `task` to `ready` iff it is still `Created` — matching §3
/// invariant 3, "the transition ... to enqueue is performed by exactly one
/// releaser": the state swap to `Queued` happens under the task's own
/// lock, so only the caller that wins the swap actually calls `ready`.
pub(crate) fn maybe_ready(task: &TaskRef, ready: &dyn Fn(TaskRef)) {
    {
        let mut inner = task.inner.lock();
        match inner.state_slot {
            Some(TaskState::Created) => inner.state_slot = Some(TaskState::Queued),
            _ => return,
        }
    }
    ready(task.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deprecord::DepType;
    use crate::ids::{Phase, TaskId, UnitId};
    use crate::matcher::match_local_datadep;
    use crate::pool::DepRecordPool;
    use crate::task::Task;
    use crate::transport::LoopbackTeam;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    fn addr(offset: u64) -> crate::ids::GlobalPtr {
        crate::ids::GlobalPtr::new(crate::ids::TEAM_ALL, UnitId(0), crate::ids::SegmentId(1), offset)
    }

    #[test]
    fn releasing_a_writer_enqueues_its_only_reader() {
        let team = LoopbackTeam::new(1);
        let t0 = team.unit(UnitId(0));
        let pool = DepRecordPool::new();
        let root = Task::new_root(TaskId(0), UnitId(0));
        let enqueued: StdMutex<Vec<TaskId>> = StdMutex::new(Vec::new());
        let ready = |t: TaskRef| enqueued.lock().unwrap().push(t.id);

        let w = Task::new_child(TaskId(1), Arc::clone(&root), Phase::ZERO, UnitId(0), Box::new(|| {}));
        let r = Task::new_child(TaskId(2), Arc::clone(&root), Phase::ZERO, UnitId(0), Box::new(|| {}));
        match_local_datadep(&root, &w, DepType::Out, addr(8), Phase::ZERO, &pool, 16);
        match_local_datadep(&root, &r, DepType::In, addr(8), Phase::ZERO, &pool, 16);

        w.set_state(TaskState::Finished);
        release_local_task(&w, &pool, &t0, &ready);

        assert_eq!(r.unresolved_local.load(Ordering::Acquire), 0);
        assert_eq!(enqueued.lock().unwrap().as_slice(), &[TaskId(2)]);
        assert_eq!(r.state(), TaskState::Queued);
    }

    #[test]
    fn cancelled_task_skips_remote_release_but_still_releases_locally() {
        let team = LoopbackTeam::new(2);
        let t0 = team.unit(UnitId(0));
        let t1 = team.unit(UnitId(1));
        let pool = DepRecordPool::new();
        let root = Task::new_root(TaskId(0), UnitId(0));
        let ready = |_: TaskRef| {};

        let t = Task::new_child(TaskId(1), Arc::clone(&root), Phase::ZERO, UnitId(0), Box::new(|| {}));
        {
            let mut inner = t.inner.lock();
            inner.remote_successors.push(crate::deprecord::DepRecord {
                ty: DepType::In,
                addr: addr(8),
                phase: Phase::ZERO,
                task: Default::default(),
                origin_unit: Some(UnitId(1)),
                remote_task: Some(crate::ids::RemoteTaskRef {
                    owner: UnitId(1),
                    id: TaskId(99),
                }),
            });
        }
        t.set_state(TaskState::Cancelled);
        release_local_task(&t, &pool, &t0, &ready);

        assert!(t1.progress().is_empty());
    }

    #[test]
    fn remote_release_only_fires_ready_once_both_counters_are_zero() {
        let handler = RemoteDepHandler::new();
        let root = Task::new_root(TaskId(0), UnitId(0));
        let t = Task::new_child(TaskId(1), Arc::clone(&root), Phase::ZERO, UnitId(0), Box::new(|| {}));
        let enqueued: StdMutex<Vec<TaskId>> = StdMutex::new(Vec::new());
        let ready = |t: TaskRef| enqueued.lock().unwrap().push(t.id);

        t.unresolved_local.fetch_add(1, Ordering::AcqRel);
        t.unresolved_remote.fetch_add(2, Ordering::AcqRel);

        release_remote_dep(&t, &handler, &ready);
        assert!(enqueued.lock().unwrap().is_empty());

        t.unresolved_local.fetch_sub(1, Ordering::AcqRel);
        release_remote_dep(&t, &handler, &ready);
        assert_eq!(enqueued.lock().unwrap().as_slice(), &[TaskId(1)]);
    }
}
