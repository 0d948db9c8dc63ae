//! §4.1 — free-list pool of dependency records.
//!
//! The spec describes a singly-linked free list under one mutex. We keep
//! the exact contract (`allocate` pops or heap-allocates zeroed,
//! `recycle` zeroes and pushes, never hands out the same element twice)
//! but realize it as a `Vec<DepRecord>` LIFO stack rather than manually
//! splicing nodes — see DESIGN.md. `free_list_mutex` (§5) is this
//! `Mutex` and nothing else is ever locked while it's held.

use parking_lot::Mutex;

use crate::deprecord::DepRecord;

#[derive(Debug, Default)]
pub struct DepRecordPool {
    free: Mutex<Vec<DepRecord>>,
}

impl DepRecordPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pops a zeroed record from the free list, or heap-allocates a fresh
    /// (already-zero, via `Default`) one if the pool is empty.
    pub fn allocate(&self) -> DepRecord {
        let mut free = self.free.lock();
        free.pop().unwrap_or_default()
    }

    /// Zeroes `record` (clearing `task` per the §4.1 reuse contract) and
    /// returns it to the pool. Taking `record` by value means the caller
    /// can no longer observe it through any other list — the type system
    /// enforces "owned by exactly one list at a time" (§3 invariant 4)
    /// here for free.
    pub fn recycle(&self, mut record: DepRecord) {
        record.zero();
        self.free.lock().push(record);
    }

    #[cfg(test)]
    pub fn free_len(&self) -> usize {
        self.free.lock().len()
    }
}
