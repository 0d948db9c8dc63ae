//! §4.9 — the cancellation path: forcibly unblocks every task still
//! waiting on a remote predecessor, for use on shutdown or a
//! user-initiated abort where the contract that "every remote request is
//! answered exactly once" can no longer be relied on.

use crate::remote::RemoteDepHandler;
use crate::task::TaskRef;

/// Drains `remote_blocked_tasks`, zeroing each task's `unresolved_remote`
/// (via `RemoteDepHandler::drain_remote_blocked`), and hands any task
/// whose `unresolved_local` is also already zero to `ready`.
pub fn cancel_remote_deps(handler: &RemoteDepHandler, ready: &dyn Fn(TaskRef)) {
    for task in handler.drain_remote_blocked() {
        crate::release::maybe_ready(&task, ready);
    }
}
