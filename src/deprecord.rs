//! The dependency-hash element (§3 "Dependency record"): the unit of
//! bookkeeping the dependency hash table, the copy-in planner and the
//! remote-dep handler all pass around.

use std::sync::Weak;

use crate::ids::{GlobalPtr, Phase, RemoteTaskRef, UnitId};
use crate::task::Task;

/// Closed tagged-variant for a dependency's kind. No inheritance, no
/// dynamic dispatch: `handle_task` and the matchers switch on this
/// directly (§9 "Dynamic dispatch on dep type").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepType {
    In,
    Out,
    InOut,
    Direct,
    Copyin,
    DelayedIn,
    /// Tags a record that was classified but deliberately never filed
    /// anywhere (e.g. a remote dep on a non-root parent, §4.6/§9). Never
    /// appears in a bucket, free list or successor list — it exists only
    /// for the instant between classification and being dropped.
    Ignore,
}

impl DepType {
    /// Does this dep write the location? (`OUT`/`INOUT`)
    pub fn is_out(self) -> bool {
        matches!(self, DepType::Out | DepType::InOut)
    }

    /// Does this dep read the location? (`IN`/`INOUT`/`DELAYED_IN`) —
    /// used by the matcher to decide whether a predecessor must be an
    /// output to conflict (§4.3 step 2's "or (D is input AND E is
    /// output)").
    pub fn is_in(self) -> bool {
        matches!(self, DepType::In | DepType::InOut | DepType::DelayedIn)
    }
}

/// A dependency record: `{type, global_address, phase, task_ref,
/// origin_unit}` from §3, plus the housekeeping `next` pointer collapsed
/// into whichever container currently owns the record (see DESIGN.md).
///
/// The record holds a *non-owning* (`Weak`) reference to its task (§9):
/// the task itself owns the `successors`/`remote_successors` lists that
/// keep it alive while other tasks still need to be released by it. A
/// record whose task has already been dropped silently no-ops wherever
/// it's walked — that only happens after the runtime that owned the task
/// has been torn down, since a live task is always kept alive by being
/// someone's successor, a hash-table entry, or the queue that released
/// it.
#[derive(Debug, Clone)]
pub struct DepRecord {
    pub ty: DepType,
    pub addr: GlobalPtr,
    pub phase: Phase,
    pub task: Weak<Task>,
    /// Set only for a record describing an *incoming* remote request:
    /// the unit that must be notified when this dep is satisfied.
    pub origin_unit: Option<UnitId>,
    /// Set only for a record describing a remote task rather than a
    /// local one — an entry filed on `remote_successors`, or still
    /// sitting on `unhandled_remote_deps`.
    pub remote_task: Option<RemoteTaskRef>,
}

impl Default for DepRecord {
    fn default() -> Self {
        Self {
            ty: DepType::Ignore,
            addr: GlobalPtr::new(crate::ids::TEAM_ALL, UnitId(0), crate::ids::SegmentId(0), 0),
            phase: Phase::ZERO,
            task: Weak::new(),
            origin_unit: None,
            remote_task: None,
        }
    }
}

impl DepRecord {
    /// Zeroes a record in place before it's returned to the free list.
    /// The pool's `recycle` contract (§4.1) requires `task` specifically
    /// be cleared so a stale `Weak` can never be observed after reuse.
    pub fn zero(&mut self) {
        *self = DepRecord::default();
    }
}
