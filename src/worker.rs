//! §1 — the worker-pool collaborator: N worker threads, a ready-task
//! queue, and a suspension primitive for a thread with nothing to do.
//! `RayonWorkerPool` is the default implementation, patterned directly on
//! the teacher's stage-dispatch loop (`Scheduler::dispatch_stage` /
//! `wait_for_completion` in `examples/Wazner-tonks/src/scheduler/mod.rs`):
//! a released task is handed to `rayon::spawn` and its completion is
//! reported back through a callback rather than a channel, since here
//! each task is independent (no stage-wide join to wait for).

use std::sync::{Condvar, Mutex};

use crate::config::RuntimeConfig;
use crate::ids::Phase;
use crate::task::{Task, TaskRef, TaskState};

pub trait WorkerPool: Send + Sync {
    /// Runs `task`'s work (a no-op if it has none, as for the root task)
    /// and then invokes `on_complete`, both from whatever thread actually
    /// executes the task. The core's `Runtime` supplies `on_complete` so
    /// this trait never needs to know about dependency bookkeeping.
    fn execute(&self, task: TaskRef, on_complete: Box<dyn FnOnce(TaskRef) + Send>);

    /// Parks the calling thread until `unpark_all` is called. Used by an
    /// idle worker with nothing runnable, waiting for `progress()` to
    /// hand it something.
    fn park_current_thread(&self);

    /// Wakes every thread blocked in `park_current_thread`.
    fn unpark_all(&self);

    /// Whether a dependency-free task in `phase` may be handed to
    /// `execute` right away, or must wait in the deferred queue (§4.8)
    /// until a phase boundary promotes it. The default policy gates
    /// nothing — every released task runs as soon as its counters hit
    /// zero — since `RayonWorkerPool` has no notion of phase ordering of
    /// its own; a pool embedding stricter phase discipline overrides
    /// this.
    fn is_phase_runnable(&self, _phase: Phase) -> bool {
        true
    }
}

#[derive(Default)]
pub struct RayonWorkerPool {
    parked: Mutex<()>,
    condvar: Condvar,
    /// `Some` iff `RuntimeConfig::worker_threads` asked for a pool sized
    /// differently than rayon's process-wide default; `execute` spawns
    /// onto it instead of the global pool when present.
    pool: Option<rayon::ThreadPool>,
}

impl RayonWorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a pool honoring `config.worker_threads` (§6 "N worker
    /// threads"). `None` falls back to rayon's global pool, same as
    /// `new()`.
    pub fn with_config(config: &RuntimeConfig) -> Self {
        let pool = config.worker_threads.map(|n| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .expect("failed to build rayon thread pool")
        });
        Self {
            parked: Mutex::new(()),
            condvar: Condvar::new(),
            pool,
        }
    }
}

impl WorkerPool for RayonWorkerPool {
    fn execute(&self, task: TaskRef, on_complete: Box<dyn FnOnce(TaskRef) + Send>) {
        let job = move || {
            run_task(&task);
            on_complete(task);
        };
        match &self.pool {
            Some(pool) => pool.spawn(job),
            None => rayon::spawn(job),
        }
    }

    fn park_current_thread(&self) {
        let guard = self.parked.lock().unwrap();
        let _unused = self.condvar.wait(guard).unwrap();
    }

    fn unpark_all(&self) {
        self.condvar.notify_all();
    }
}

fn run_task(task: &Task) {
    let work = task.work.lock().take();
    match work {
        Some(work) => {
            task.set_state(TaskState::Running);
            work();
            task.set_state(TaskState::Finished);
        }
        None => {
            // The root task, or a task already cancelled out from under
            // the queue before execution — nothing to run.
        }
    }
}
