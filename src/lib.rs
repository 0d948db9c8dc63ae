//! A distributed task-graph runtime for a PGAS program: accepts
//! user-submitted tasks annotated with data dependencies, discovers the
//! happens-before relation between them across a set of units, and
//! releases each task for execution as soon as its predecessors —
//! local and remote — have completed.
//!
//! The runtime itself never touches the wire or the worker threads
//! directly; it is generic over three collaborators supplied by the
//! embedding program (see [`transport`], [`memory`], [`worker`]). A
//! single-process, single-unit program can use the in-process defaults
//! ([`transport::LoopbackTransport`], [`memory::LocalMemory`],
//! [`worker::RayonWorkerPool`]) and never touch a real DART deployment.
//!
//! [`runtime::Runtime`] is the facade: `Runtime::init` builds a context
//! handle, and every other entry point (`handle_task`,
//! `handle_deferred_remote`, `handle_deferred_local`, `progress`, ...)
//! is a method on it. There is no process-wide singleton state.

pub mod cancel;
pub mod config;
pub mod copyin;
pub mod deferred;
pub mod dephash;
pub mod deprecord;
pub mod error;
pub mod ids;
pub mod matcher;
pub mod memory;
pub mod pool;
pub mod release;
pub mod remote;
pub mod runtime;
pub mod task;
pub mod transport;
pub mod worker;

pub use config::{RuntimeConfig, RuntimeConfigBuilder};
pub use error::{Error, Result};
pub use runtime::{DepSpec, Runtime};
pub use task::{Task, TaskRef, TaskState};
