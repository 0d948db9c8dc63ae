//! Task objects (§3): state machine, predecessor counters, and the two
//! lists a task owns (`successors`, `remote_successors`).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use derivative::Derivative;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::dephash::DepHashTable;
use crate::deprecord::DepRecord;
use crate::ids::{Phase, TaskId, UnitId};

/// `CREATED -> QUEUED -> RUNNING -> FINISHED`, with `CANCELLED` reachable
/// from any pre-`FINISHED` state (§3 "Lifecycle").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Queued,
    Running,
    Finished,
    Cancelled,
}

impl TaskState {
    /// A predecessor in this state can still gain new successors and
    /// will eventually run its release path. Used by both matchers
    /// (`IS_ACTIVE_TASK` in spec.md §4.3) to decide whether to bother
    /// wiring an edge at all.
    pub fn is_active(self) -> bool {
        !matches!(self, TaskState::Finished | TaskState::Cancelled)
    }
}

/// Fields a task's own mutex protects: `state`, `successors` and
/// `remote_successors` (§3 invariant 5 — "a task only observes its
/// `successors` list under its own mutex"). Folded into one guard since
/// nothing in §5 requires locking them independently.
#[derive(Debug, Default)]
pub struct TaskInner {
    pub state_slot: Option<TaskState>,
    pub successors: SmallVec<[TaskRef; 4]>,
    pub remote_successors: Vec<DepRecord>,
}

/// A shared handle to a task. Cloning is cheap (`Arc` bump); a task stays
/// alive as long as something that still needs to release it — a
/// predecessor's successor list, the deferred queue, or the caller that
/// submitted it — holds a clone.
pub type TaskRef = Arc<Task>;

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Task {
    pub id: TaskId,
    /// The enclosing task. `None` only for the implicit root task.
    pub parent: Option<TaskRef>,
    pub phase: Phase,
    /// The unit that submitted this task — needed to address remote
    /// messages naming it.
    pub owner: UnitId,

    pub unresolved_local: AtomicU32,
    pub unresolved_remote: AtomicU32,

    #[derivative(Debug = "ignore")]
    pub inner: Mutex<TaskInner>,

    /// Per-parent hash table of this task's children's registered dep
    /// records. Only ever populated on a task that has children with
    /// dependencies (§3: "only non-null on parents that own children").
    #[derivative(Debug = "ignore")]
    pub local_deps: Mutex<Option<Box<DepHashTable>>>,

    /// The work to run once both counters reach zero. `None` once taken
    /// by the worker pool for execution, and always `None` for the root
    /// task (which never itself runs).
    #[derivative(Debug = "ignore")]
    pub work: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Task {
    pub fn new_root(id: TaskId, owner: UnitId) -> TaskRef {
        Arc::new(Task {
            id,
            parent: None,
            phase: Phase::ZERO,
            owner,
            unresolved_local: AtomicU32::new(0),
            unresolved_remote: AtomicU32::new(0),
            inner: Mutex::new(TaskInner {
                state_slot: Some(TaskState::Running),
                ..Default::default()
            }),
            local_deps: Mutex::new(None),
            work: Mutex::new(None),
        })
    }

    pub fn new_child(
        id: TaskId,
        parent: TaskRef,
        phase: Phase,
        owner: UnitId,
        work: Box<dyn FnOnce() + Send>,
    ) -> TaskRef {
        Arc::new(Task {
            id,
            parent: Some(parent),
            phase,
            owner,
            unresolved_local: AtomicU32::new(0),
            unresolved_remote: AtomicU32::new(0),
            inner: Mutex::new(TaskInner {
                state_slot: Some(TaskState::Created),
                ..Default::default()
            }),
            local_deps: Mutex::new(None),
            work: Mutex::new(Some(work)),
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn state(&self) -> TaskState {
        self.inner
            .lock()
            .state_slot
            .expect("state observed during construction race")
    }

    pub fn set_state(&self, state: TaskState) {
        self.inner.lock().state_slot = Some(state);
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Both predecessor counters at zero — the condition that makes a
    /// `CREATED` task eligible for enqueue (§3 invariant 3).
    pub fn is_runnable(&self) -> bool {
        self.unresolved_local.load(Ordering::Acquire) == 0
            && self.unresolved_remote.load(Ordering::Acquire) == 0
    }

    /// Adds `self` to `predecessor`'s successor list and bumps
    /// `self.unresolved_local`, iff `predecessor` is still active and
    /// `self` isn't already registered. Must be called with
    /// `predecessor`'s lock held by the caller (matchers take the lock
    /// themselves; this just does the bookkeeping).
    pub fn add_local_successor_locked(
        self: &TaskRef,
        predecessor_inner: &mut TaskInner,
    ) -> bool {
        if predecessor_inner
            .successors
            .iter()
            .any(|s| Arc::ptr_eq(s, self))
        {
            return false;
        }
        predecessor_inner.successors.push(Arc::clone(self));
        self.unresolved_local.fetch_add(1, Ordering::AcqRel);
        true
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Task {}

impl std::hash::Hash for Task {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
