//! §4.5 — the copy-in planner. Ensures at most one prefetch task exists
//! per `(destination, phase)`; every consumer in that phase attaches to
//! it instead of issuing its own remote fetch.

use std::sync::Arc;

use crate::dephash::ensure_table;
use crate::deprecord::DepType;
use crate::ids::{GlobalPtr, Phase, SegmentId, TeamId, UnitId, LOCAL_COPYIN};
use crate::pool::DepRecordPool;
use crate::task::{Task, TaskRef};

/// The "external task-creation collaborator" of §4.5: something that can
/// spin up a fresh task in the given phase that fetches `src` into
/// `dest` and registers its own `OUT` dep on the synthetic
/// `{LOCAL_COPYIN, dest_addr}` address before returning.
pub trait PrefetchTaskFactory {
    fn create_prefetch_task(&self, phase: Phase, src: GlobalPtr, dest_addr: u64) -> TaskRef;
}

/// Plans (and, if necessary, creates) the prefetch for `new_task`'s
/// copy-in of `src` into `dest_addr`. `self_unit` is the local unit,
/// used to build the synthetic destination address.
pub fn plan_copyin(
    parent: &Task,
    new_task: &TaskRef,
    self_unit: UnitId,
    src: GlobalPtr,
    dest_addr: u64,
    phase: Phase,
    pool: &DepRecordPool,
    bucket_count: usize,
    factory: &dyn PrefetchTaskFactory,
) {
    let dest_gptr = GlobalPtr::new(TeamId(0), self_unit, LOCAL_COPYIN, dest_addr);

    if try_attach(parent, new_task, dest_gptr, phase, pool, bucket_count) {
        return;
    }

    let _prefetch = factory.create_prefetch_task(phase, src, dest_addr);

    if try_attach(parent, new_task, dest_gptr, phase, pool, bucket_count) {
        return;
    }

    // The prefetch task's submission must have installed an OUT record
    // on `dest_gptr` at this exact phase (it is the only thing allowed
    // to write a copy-in destination). Not finding it now is a
    // programmer error in the factory, not a recoverable condition.
    panic!(
        "prefetch task for {:?}@phase {:?} did not install its OUT record",
        dest_gptr, phase
    );
}

/// §4.5 step 2: look for an existing `OUT` record on `dest` at exactly
/// `phase`, and if found, attach as a successor of its owner and file our
/// own `IN` record — without walking/matching against anything else,
/// since copy-in destinations are private per `(dest, phase)` by
/// contract.
fn try_attach(
    parent: &Task,
    new_task: &TaskRef,
    dest: GlobalPtr,
    phase: Phase,
    pool: &DepRecordPool,
    bucket_count: usize,
) -> bool {
    let mut guard = ensure_table(parent, bucket_count);
    let table = guard.as_mut().expect("ensure_table always populates");
    let slot = table.slot_for(dest);

    let owner = table.bucket(slot).iter().find_map(|r| {
        if r.addr.resolved() == dest.resolved() && r.ty.is_out() && r.phase == phase {
            r.task.upgrade()
        } else {
            None
        }
    });

    let owner = match owner {
        Some(o) => o,
        None => return false,
    };

    {
        let mut inner = owner.inner.lock();
        if owner.is_active() {
            new_task.add_local_successor_locked(&mut inner);
        }
    }

    let mut record = pool.allocate();
    record.ty = DepType::In;
    record.addr = dest;
    record.phase = phase;
    record.task = Arc::downgrade(new_task);
    table.push_front(record);
    true
}
