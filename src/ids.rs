//! Identifiers that make up a global address: units, teams, segments and
//! phases.

use std::sync::atomic::{AtomicU64, Ordering};

/// A process-global identifier. Every unit also has a team-local id within
/// whatever team it was spawned into; `Team::to_global` converts between
/// the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub u32);

/// A named subgroup of units with its own collective operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TeamId(pub u32);

/// The default team containing every unit in the program.
pub const TEAM_ALL: TeamId = TeamId(0);

/// A unit-local memory region, identified by a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(pub u32);

/// Segment id reserved for copy-in destination buffers allocated by the
/// runtime itself (§4.5). Never used for a user-submitted global address.
pub const LOCAL_COPYIN: SegmentId = SegmentId(u32::MAX);

/// A `{team, unit, segment, offset}` tuple naming a byte anywhere in the
/// system. Two `GlobalPtr`s are equal for dependency-matching purposes iff
/// their resolved `(unit, segment, addr)` triple matches — `team` only
/// matters for translating a team-local unit id to a global one before
/// comparison, so `resolved()` drops it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalPtr {
    pub team: TeamId,
    pub unit: UnitId,
    pub segment: SegmentId,
    pub addr: u64,
}

impl GlobalPtr {
    pub fn new(team: TeamId, unit: UnitId, segment: SegmentId, addr: u64) -> Self {
        Self {
            team,
            unit,
            segment,
            addr,
        }
    }

    /// `{unit, segment, addr}`, the part of the address that dependency
    /// matching actually compares.
    pub fn resolved(&self) -> (UnitId, SegmentId, u64) {
        (self.unit, self.segment, self.addr)
    }

    /// Hash-table slot for this address: `(addr >> 2) XOR (segment << 16)
    /// XOR (unit << 32), mod bucket_count`. The shift-by-2 assumes
    /// at-least-4-byte alignment (§4.2).
    pub fn slot(&self, bucket_count: usize) -> usize {
        let h = (self.addr >> 2)
            ^ ((self.segment.0 as u64) << 16)
            ^ ((self.unit.0 as u64) << 32);
        (h % bucket_count as u64) as usize
    }
}

/// A monotonically non-decreasing epoch counter attached to each task at
/// submission time. Phases partition tasks across units into rounds that
/// remote-dependency matching resolves one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Phase(pub u64);

impl Phase {
    pub const ZERO: Phase = Phase(0);

    /// Resolves a raw submission-time phase value against the
    /// `PHASE_TASK` sentinel (§3): `PHASE_TASK` returns `submitter`
    /// unchanged ("inherit submitter's current phase"); any other value
    /// becomes `Phase(raw as u64)`. `Runtime::handle_task` calls this
    /// before anything else sees the task's phase.
    pub fn resolve(raw: i64, submitter: Phase) -> Phase {
        if raw == PHASE_TASK {
            submitter
        } else {
            Phase(raw as u64)
        }
    }
}

/// Sentinel meaning "inherit the submitter's current phase" — never a
/// real phase a task is matched under; `Runtime::handle_task` resolves it
/// to a concrete `Phase` via `Phase::resolve` before anything else sees
/// it.
pub const PHASE_TASK: i64 = -1;

/// Monotonic counter allocating globally-unique task ids. `u64` so it
/// never wraps in practice; held per-`Runtime` rather than process-wide,
/// per the Open Question resolution in DESIGN.md.
#[derive(Debug, Default)]
pub struct TaskIdAllocator(AtomicU64);

/// A process-wide-unique task identifier, stable across units (needed so
/// a remote unit can name a task it doesn't own in a release/direct-dep
/// message).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

impl TaskIdAllocator {
    pub fn alloc(&self) -> TaskId {
        TaskId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Names a task owned by some unit, for use in remote messages where the
/// receiving unit cannot dereference the sender's local `TaskRef`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteTaskRef {
    pub owner: UnitId,
    pub id: TaskId,
}
