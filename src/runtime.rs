//! §6 — the public facade wiring every component together. No global
//! mutable state (§9's open question, resolved): `Runtime` is an owned
//! context handle threaded explicitly through every call, cheap to clone
//! (an `Arc` bump) so it can be captured by the completion closures handed
//! to the worker pool.

use std::sync::Arc;

use hashbrown::HashMap;
use log::warn;
use parking_lot::Mutex;

use crate::cancel;
use crate::config::RuntimeConfig;
use crate::copyin::{self, PrefetchTaskFactory};
use crate::deferred::DeferredTaskQueue;
use crate::deprecord::DepType;
use crate::error::Result;
use crate::ids::{GlobalPtr, Phase, TaskId, TaskIdAllocator, UnitId, RemoteTaskRef};
use crate::matcher;
use crate::memory::{GlobalMemory, Resolution};
use crate::pool::DepRecordPool;
use crate::release;
use crate::remote::RemoteDepHandler;
use crate::task::{Task, TaskRef};
use crate::transport::{IncomingMessage, Transport};
use crate::worker::WorkerPool;

/// One dependency as supplied at task-submission time. `Data` covers
/// `IN`/`OUT`/`INOUT`/`DELAYED_IN` (§3/§4.3/§4.4); `Copyin` is §4.5;
/// `Direct`/`DirectRemote` are §4.10's address-free happens-after edges.
pub enum DepSpec {
    Data {
        ty: DepType,
        addr: GlobalPtr,
        phase: Phase,
    },
    Copyin {
        src: GlobalPtr,
        dest_addr: u64,
        phase: Phase,
    },
    Direct(TaskRef),
    DirectRemote(RemoteTaskRef),
}

struct RuntimeInner {
    config: RuntimeConfig,
    transport: Arc<dyn Transport>,
    memory: Arc<dyn GlobalMemory>,
    worker_pool: Arc<dyn WorkerPool>,
    pool: DepRecordPool,
    remote: RemoteDepHandler,
    deferred: DeferredTaskQueue,
    task_ids: TaskIdAllocator,
    /// Every task currently reachable from outside its predecessor's
    /// successor list: needed so an arriving `Release`/`DirectTaskDep`
    /// message (which only names a task by id) can find the `TaskRef` it
    /// refers to. Entries are removed once the task finishes.
    tasks: Mutex<HashMap<TaskId, TaskRef>>,
    root: TaskRef,
}

/// The task-graph runtime. Cloning is cheap and shares all state — clone
/// freely to capture in a completion closure.
#[derive(Clone)]
pub struct Runtime(Arc<RuntimeInner>);

impl Runtime {
    /// §6 `init()`. Builds a fresh runtime with its own root task; no
    /// state is shared with any other `Runtime` unless the collaborators
    /// passed in are (e.g. a shared `LoopbackTeam` transport).
    pub fn init(
        transport: Arc<dyn Transport>,
        memory: Arc<dyn GlobalMemory>,
        worker_pool: Arc<dyn WorkerPool>,
        config: RuntimeConfig,
    ) -> Runtime {
        let task_ids = TaskIdAllocator::default();
        let root = Task::new_root(task_ids.alloc(), transport.myid());
        Runtime(Arc::new(RuntimeInner {
            config,
            transport,
            memory,
            worker_pool,
            pool: DepRecordPool::new(),
            remote: RemoteDepHandler::new(),
            deferred: DeferredTaskQueue::new(),
            task_ids,
            tasks: Mutex::new(HashMap::new()),
            root,
        }))
    }

    /// §6 `fini()`. The core holds nothing that needs explicit teardown
    /// beyond what `Drop` already does when the last clone goes away; this
    /// exists so callers have the named shutdown point spec.md's external
    /// interface promises.
    pub fn fini(self) {}

    pub fn root(&self) -> &TaskRef {
        &self.0.root
    }

    /// §6 `reset(parent_task)`: drops every dep record beneath `parent`,
    /// recycling each back to the free-list pool. Idempotent — calling it
    /// again on an already-reset parent (an empty/absent table) is a
    /// no-op.
    pub fn reset(&self, parent: &Task) {
        let table = parent.local_deps.lock().take();
        if let Some(table) = table {
            for record in table.into_records() {
                self.0.pool.recycle(record);
            }
        }
    }

    /// §6 `handle_task(task, deps[])`. `phase` is the raw submission-time
    /// value: either a concrete phase number, or the `PHASE_TASK`
    /// sentinel (§3) meaning "inherit `parent`'s current phase", resolved
    /// here via `Phase::resolve` before the task is constructed — this is
    /// the one place spec.md promises the substitution happens. Allocates
    /// a task id, wires every dep in order, and — if its counters are
    /// already zero — hands it off to run. A malformed dep (§7 `INVAL`)
    /// is reported but does not stop the remaining deps of the same task
    /// from being processed.
    pub fn handle_task(
        &self,
        parent: &TaskRef,
        phase: i64,
        work: Box<dyn FnOnce() + Send>,
        deps: Vec<DepSpec>,
    ) -> Result<TaskRef> {
        let phase = Phase::resolve(phase, parent.phase);
        let id = self.0.task_ids.alloc();
        let task = Task::new_child(id, Arc::clone(parent), phase, self.0.transport.myid(), work);
        self.0.tasks.lock().insert(id, Arc::clone(&task));

        let mut first_err = None;
        for dep in deps {
            if let Err(e) = self.handle_one_dep(parent, &task, dep) {
                warn!("dependency registration failed for task {:?}: {}", id, e);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        self.try_ready(&task);

        match first_err {
            Some(e) => Err(e),
            None => Ok(task),
        }
    }

    fn handle_one_dep(&self, parent: &TaskRef, task: &TaskRef, dep: DepSpec) -> Result<()> {
        let bucket_count = self.0.config.bucket_count;
        let self_unit = self.0.transport.myid();

        match dep {
            DepSpec::Data { ty, addr, phase } => match self.0.memory.resolve(addr) {
                Resolution::Local(_) => {
                    if ty == DepType::DelayedIn {
                        matcher::match_delayed_local_datadep(parent, task, addr, phase, &self.0.pool, bucket_count);
                    } else {
                        matcher::match_local_datadep(parent, task, ty, addr, phase, &self.0.pool, bucket_count);
                    }
                    Ok(())
                }
                Resolution::Remote(_) => self.0.remote.register_outgoing(
                    task,
                    addr,
                    phase,
                    ty,
                    self_unit,
                    self.0.transport.as_ref(),
                ),
            },
            DepSpec::Copyin { src, dest_addr, phase } => {
                let factory = RuntimeFactory {
                    runtime: self,
                    parent: Arc::clone(parent),
                };
                copyin::plan_copyin(
                    parent,
                    task,
                    self_unit,
                    src,
                    dest_addr,
                    phase,
                    &self.0.pool,
                    bucket_count,
                    &factory,
                );
                Ok(())
            }
            DepSpec::Direct(target) => {
                matcher::match_direct_dep(task, &target);
                Ok(())
            }
            DepSpec::DirectRemote(target) => {
                self.0.remote.register_outgoing_direct(task, target, self_unit, self.0.transport.as_ref())
            }
        }
    }

    /// §4.6/§4.8 data-flow step: if `task`'s counters are already zero,
    /// either hand it to the worker pool or park it in the deferred queue
    /// depending on the pool's phase policy.
    fn try_ready(&self, task: &TaskRef) {
        if !task.is_runnable() {
            return;
        }
        if self.0.worker_pool.is_phase_runnable(task.phase) {
            release::maybe_ready(task, &|t| self.ready(t));
        } else {
            self.0.deferred.push(Arc::clone(task));
        }
    }

    fn ready(&self, task: TaskRef) {
        let rt = self.clone();
        self.0.worker_pool.execute(task, Box::new(move |t| rt.on_task_finished(t)));
    }

    fn on_task_finished(&self, task: TaskRef) {
        release::release_local_task(&task, &self.0.pool, self.0.transport.as_ref(), &|t| self.ready(t));
        self.0.tasks.lock().remove(&task.id);
    }

    /// §6 `handle_deferred_remote()`.
    pub fn handle_deferred_remote(&self) {
        self.0.remote.handle_deferred_remote(
            &self.0.root,
            self.0.config.bucket_count,
            self.0.transport.myid(),
            self.0.transport.as_ref(),
            &self.0.pool,
        );
    }

    /// §6 `handle_deferred_local(worker)`. The `worker` parameter of
    /// spec.md's signature is implicit here: every worker shares the same
    /// deferred queue and `ready` path through this `Runtime`.
    pub fn handle_deferred_local(&self) {
        self.0.deferred.handle_deferred_local(&|t| self.ready(t));
    }

    /// §6 `release_local_task(task)` exposed directly, for a caller that
    /// runs a task's work itself rather than through `WorkerPool::execute`
    /// (e.g. the root task, which never goes through the pool).
    pub fn release_local_task(&self, task: &TaskRef) {
        release::release_local_task(task, &self.0.pool, self.0.transport.as_ref(), &|t| self.ready(t));
    }

    /// §6 `release_remote_dep(task)`: invoked by `progress()` for an
    /// incoming `Release` message.
    pub fn release_remote_dep(&self, task: &TaskRef) {
        release::release_remote_dep(task, &self.0.remote, &|t| self.ready(t));
    }

    /// §6 `cancel_remote_deps()`.
    pub fn cancel_remote_deps(&self) {
        cancel::cancel_remote_deps(&self.0.remote, &|t| self.ready(t));
    }

    /// §6 `progress()`: drains whatever arrived on the transport and
    /// dispatches each message to the matching core entry point.
    pub fn progress(&self) -> usize {
        let messages = self.0.transport.progress();
        let count = messages.len();
        for msg in messages {
            match msg {
                IncomingMessage::DepRequest { requester, dep } => {
                    self.0.remote.receive_incoming(requester, dep, &self.0.pool);
                }
                IncomingMessage::Release { remote_task } => {
                    if let Some(task) = self.0.tasks.lock().get(&remote_task.id).cloned() {
                        self.release_remote_dep(&task);
                    } else {
                        warn!("release arrived for unknown task {:?}", remote_task.id);
                    }
                }
                IncomingMessage::DirectTaskDep { local_task, remote_task } => {
                    if let Some(task) = self.0.tasks.lock().get(&local_task.id).cloned() {
                        self.0
                            .remote
                            .receive_direct(&task, remote_task, self.0.transport.as_ref());
                    } else {
                        warn!("direct task dep arrived for unknown task {:?}", local_task.id);
                    }
                }
            }
        }
        count
    }
}

/// Adapts a `Runtime` plus the parent a copy-in consumer belongs to into
/// `copyin::PrefetchTaskFactory`. Short-lived: built fresh for each
/// `DepSpec::Copyin` dep, since the trait itself carries no parent.
struct RuntimeFactory<'a> {
    runtime: &'a Runtime,
    parent: TaskRef,
}

impl<'a> PrefetchTaskFactory for RuntimeFactory<'a> {
    fn create_prefetch_task(&self, phase: Phase, src: GlobalPtr, dest_addr: u64) -> TaskRef {
        let rt = self.runtime;
        let id = rt.0.task_ids.alloc();
        let self_unit = rt.0.transport.myid();
        let memory = Arc::clone(&rt.0.memory);
        let work: Box<dyn FnOnce() + Send> = Box::new(move || memory.fetch(src, dest_addr));
        let prefetch = Task::new_child(id, Arc::clone(&self.parent), phase, self_unit, work);
        rt.0.tasks.lock().insert(id, Arc::clone(&prefetch));

        let dest_gptr = GlobalPtr::new(crate::ids::TeamId(0), self_unit, crate::ids::LOCAL_COPYIN, dest_addr);
        matcher::match_local_datadep(
            &self.parent,
            &prefetch,
            DepType::Out,
            dest_gptr,
            phase,
            &rt.0.pool,
            rt.0.config.bucket_count,
        );

        rt.try_ready(&prefetch);
        prefetch
    }
}
