//! §4.2 — the per-parent dependency hash table.
//!
//! Lazily allocated on a `Task` the first time one of its children
//! registers a dependency. The whole table is protected by the owning
//! task's `local_deps` mutex (the `parent.mutex` of §5) rather than a
//! lock per bucket — nothing in spec.md requires finer granularity, and
//! a single lock is what "acquired before inserting/removing records"
//! describes.

use std::collections::VecDeque;

use parking_lot::MutexGuard;

use crate::deprecord::DepRecord;
use crate::ids::GlobalPtr;
use crate::task::Task;

#[derive(Debug)]
pub struct DepHashTable {
    bucket_count: usize,
    buckets: Vec<VecDeque<DepRecord>>,
}

impl DepHashTable {
    pub fn new(bucket_count: usize) -> Self {
        let mut buckets = Vec::with_capacity(bucket_count);
        buckets.resize_with(bucket_count, VecDeque::new);
        Self {
            bucket_count,
            buckets,
        }
    }

    pub fn slot_for(&self, addr: GlobalPtr) -> usize {
        addr.slot(self.bucket_count)
    }

    pub fn bucket(&self, slot: usize) -> &VecDeque<DepRecord> {
        &self.buckets[slot]
    }

    pub fn bucket_mut(&mut self, slot: usize) -> &mut VecDeque<DepRecord> {
        &mut self.buckets[slot]
    }

    /// Pushes `record` to the head of its bucket — O(1), and (given
    /// submission order == non-decreasing phase, §3 invariant 1)
    /// preserves descending-phase order front-to-back.
    pub fn push_front(&mut self, record: DepRecord) {
        let slot = self.slot_for(record.addr);
        self.buckets[slot].push_front(record);
    }

    /// Inserts `record` immediately after `after_index` in its bucket —
    /// used by the delayed matcher (§4.4 step 2) to splice a record into
    /// the middle of a bucket while preserving phase order.
    pub fn insert_after(&mut self, slot: usize, after_index: usize, record: DepRecord) {
        self.buckets[slot].insert(after_index + 1, record);
    }

    /// Consumes the table, handing back every record it held — used by
    /// `reset` (§6) to recycle the whole table's contents to the free-list
    /// pool in one pass.
    pub fn into_records(self) -> impl Iterator<Item = DepRecord> {
        self.buckets.into_iter().flatten()
    }
}

/// Locks `parent.local_deps`, lazily allocating the table on first use,
/// and returns the guard so callers can walk/mutate buckets under the
/// single lock the whole operation needs.
pub fn ensure_table(parent: &Task, bucket_count: usize) -> MutexGuard<'_, Option<Box<DepHashTable>>> {
    let mut guard = parent.local_deps.lock();
    if guard.is_none() {
        *guard = Some(Box::new(DepHashTable::new(bucket_count)));
    }
    guard
}
