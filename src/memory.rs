//! §1 — the global-memory collaborator: translates `{unit, segment,
//! offset}` to a local address when local, and otherwise reports enough
//! to resolve the dep remotely.

use crate::ids::{GlobalPtr, UnitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The address is on this unit, at this local address.
    Local(u64),
    /// The address lives on another unit.
    Remote(UnitId),
}

pub trait GlobalMemory: Send + Sync {
    fn resolve(&self, gptr: GlobalPtr) -> Resolution;

    /// Performs the actual `src -> dest_addr` copy-in fetch for a
    /// prefetch task (§4.5). The byte-level mechanics of moving remote
    /// memory into a local buffer are explicitly out of scope (§1
    /// non-goals); the default does nothing so a single-unit program
    /// (where every copy-in source already resolves locally) still
    /// builds and runs without a real collaborator wired in.
    fn fetch(&self, _src: GlobalPtr, _dest_addr: u64) {}
}

/// The obvious implementation: a `GlobalPtr`'s `addr` field already *is*
/// the local address when `gptr.unit` is us; segment translation beyond
/// that is out of scope (§1 non-goals: "the template machinery of the
/// global iterator / pattern layer").
pub struct LocalMemory {
    pub myid: UnitId,
}

impl GlobalMemory for LocalMemory {
    fn resolve(&self, gptr: GlobalPtr) -> Resolution {
        if gptr.unit == self.myid {
            Resolution::Local(gptr.addr)
        } else {
            Resolution::Remote(gptr.unit)
        }
    }
}
