//! §4.3/§4.4/§4.10 — wiring a new task's dependency into the predecessor
//! edges implied by the existing records in its parent's hash table.

use std::sync::Arc;

use log::{trace, warn};

use crate::dephash::ensure_table;
use crate::deprecord::DepType;
use crate::ids::{GlobalPtr, Phase};
use crate::pool::DepRecordPool;
use crate::task::{Task, TaskRef};

/// §4.3 `match_local_datadep`. `dep_ty` must be `In`, `Out` or `InOut` —
/// `Copyin`/`DelayedIn`/`Direct` are handled by `copyin.rs` and the other
/// functions in this module instead.
pub fn match_local_datadep(
    parent: &Task,
    new_task: &TaskRef,
    dep_ty: DepType,
    addr: GlobalPtr,
    phase: Phase,
    pool: &DepRecordPool,
    bucket_count: usize,
) {
    debug_assert!(matches!(dep_ty, DepType::In | DepType::Out | DepType::InOut));

    let mut guard = ensure_table(parent, bucket_count);
    let table = guard.as_mut().expect("ensure_table always populates");
    let slot = table.slot_for(addr);

    for existing in table.bucket_mut(slot).iter_mut() {
        if existing.addr.resolved() != addr.resolved() {
            continue;
        }

        let existing_task = match existing.task.upgrade() {
            Some(t) => t,
            None => continue,
        };

        if Arc::ptr_eq(&existing_task, new_task) {
            // Self-dep upgrade: a second dep on an address this same
            // task already registered an IN for becomes INOUT.
            if existing.ty == DepType::In && dep_ty.is_out() {
                existing.ty = DepType::InOut;
            }
            break;
        }

        trace!(
            "matching new {:?}@{:?} against existing {:?}@phase {:?}",
            dep_ty, addr, existing.ty, existing.phase
        );

        if dep_ty.is_out() || (dep_ty.is_in() && existing.ty.is_out()) {
            let mut inner = existing_task.inner.lock();
            if existing_task.is_active() {
                new_task.add_local_successor_locked(&mut inner);
            }
        }

        if existing.ty.is_out() {
            // Earliest writer dominates: stop walking past it.
            break;
        }
    }

    let mut record = pool.allocate();
    record.ty = dep_ty;
    record.addr = addr;
    record.phase = phase;
    record.task = Arc::downgrade(new_task);
    table.push_front(record);
}

/// §4.4 `match_delayed_local_datadep`. `phase` may be earlier than
/// records already present — the task is being inserted "into the past".
pub fn match_delayed_local_datadep(
    parent: &Task,
    new_task: &TaskRef,
    addr: GlobalPtr,
    phase: Phase,
    pool: &DepRecordPool,
    bucket_count: usize,
) {
    let mut guard = ensure_table(parent, bucket_count);
    let table = guard.as_mut().expect("ensure_table always populates");
    let slot = table.slot_for(addr);

    // Nearest writer strictly after `phase` (the "next-writer" `N` of
    // §4.4 step 1), and the first writer at-or-before `phase` (the
    // satisfier), found in one walk.
    let mut next_writer: Option<TaskRef> = None;
    let mut satisfier: Option<(usize, TaskRef)> = None;

    for (idx, existing) in table.bucket(slot).iter().enumerate() {
        if existing.addr.resolved() != addr.resolved() || !existing.ty.is_out() {
            continue;
        }
        let existing_task = match existing.task.upgrade() {
            Some(t) => t,
            None => continue,
        };

        if existing.phase > phase {
            if next_writer.is_none() {
                next_writer = Some(existing_task);
            }
        } else {
            satisfier = Some((idx, existing_task));
            break;
        }
    }

    let (satisfier_index, writer) = match satisfier {
        Some(pair) => pair,
        None => {
            warn!(
                "delayed dep on {:?} at phase {:?} matched no writer; dep is unsatisfied",
                addr, phase
            );
            return;
        }
    };

    {
        let mut inner = writer.inner.lock();
        if writer.is_active() {
            new_task.add_local_successor_locked(&mut inner);
        }
    }

    match next_writer {
        Some(writer_after) => {
            // `new_task` (the delayed reader) must complete before the
            // later writer starts, or it would overwrite what `new_task`
            // is about to read: make the later writer a successor of
            // `new_task` instead of filing a table entry for the read.
            let mut inner = new_task.inner.lock();
            writer_after.add_local_successor_locked(&mut inner);
        }
        None => {
            // No later writer dominates this read: file it normally,
            // preserving descending-phase order around it.
            let mut record = pool.allocate();
            record.ty = DepType::DelayedIn;
            record.addr = addr;
            record.phase = phase;
            record.task = Arc::downgrade(new_task);
            table.insert_after(slot, satisfier_index, record);
        }
    }
}

/// §4.10 local `DIRECT` dep: wires `new_task` directly onto `target`
/// without consulting any hash table.
pub fn match_direct_dep(new_task: &TaskRef, target: &TaskRef) {
    let mut inner = target.inner.lock();
    if target.is_active() {
        new_task.add_local_successor_locked(&mut inner);
    }
}
