//! §4.8 — the deferred-task queue: tasks with zero dependencies whose
//! phase is not yet the runnable one (a policy decided by the worker
//! layer, not this crate's concern beyond holding the reference).

use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::task::TaskRef;

#[derive(Default)]
pub struct DeferredTaskQueue {
    tasks: Mutex<Vec<TaskRef>>,
}

impl DeferredTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a task that is dependency-free but not yet runnable by
    /// phase policy.
    pub fn push(&self, task: TaskRef) {
        self.tasks.lock().push(task);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// §4.8 `handle_deferred_local`: drains the queue. Each task is
    /// re-examined — if `unresolved_remote == 0` it is handed to `ready`,
    /// otherwise its reference is simply dropped here (a later remote
    /// release will hand it to `ready` itself, per the release engine).
    pub fn handle_deferred_local(&self, ready: &dyn Fn(TaskRef)) {
        let drained: Vec<TaskRef> = std::mem::take(&mut *self.tasks.lock());
        for task in drained {
            if task.unresolved_remote.load(Ordering::Acquire) == 0 {
                crate::release::maybe_ready(&task, ready);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Phase, TaskId, UnitId};
    use crate::task::{Task, TaskState};
    use std::sync::atomic::Ordering as AtomicOrdering;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn drains_task_with_no_remote_deps_into_ready() {
        let queue = DeferredTaskQueue::new();
        let root = Task::new_root(TaskId(0), UnitId(0));
        let t = Task::new_child(TaskId(1), Arc::clone(&root), Phase::ZERO, UnitId(0), Box::new(|| {}));
        queue.push(Arc::clone(&t));

        let seen: StdMutex<Vec<TaskId>> = StdMutex::new(Vec::new());
        queue.handle_deferred_local(&|task| seen.lock().unwrap().push(task.id));

        assert_eq!(seen.lock().unwrap().as_slice(), &[TaskId(1)]);
        assert_eq!(t.state(), TaskState::Queued);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn task_still_remote_blocked_is_dropped_not_readied() {
        let queue = DeferredTaskQueue::new();
        let root = Task::new_root(TaskId(0), UnitId(0));
        let t = Task::new_child(TaskId(1), Arc::clone(&root), Phase::ZERO, UnitId(0), Box::new(|| {}));
        t.unresolved_remote.fetch_add(1, AtomicOrdering::AcqRel);
        queue.push(Arc::clone(&t));

        let seen: StdMutex<Vec<TaskId>> = StdMutex::new(Vec::new());
        queue.handle_deferred_local(&|task| seen.lock().unwrap().push(task.id));

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(t.state(), TaskState::Created);
    }
}
