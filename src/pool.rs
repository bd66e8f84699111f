//! The process-wide record freelist.
//!
//! Decoding streams acquire records here and release them when consumed, so
//! a steady-state reader allocates nothing per record: the scratch arena
//! travels with the record through the pool. The store is a bounded
//! lock-free queue; both operations are wait-free in the steady state, and
//! no FIFO ordering is promised or required.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::LazyLock;

use crossbeam_queue::ArrayQueue;

use crate::record::Record;

/// Records cached by the process-wide pool; oversupply beyond this is
/// dropped.
pub const DEFAULT_POOL_CAPACITY: usize = 4096;

static POOL: LazyLock<RecordPool> = LazyLock::new(|| RecordPool::new(DEFAULT_POOL_CAPACITY));

/// A bounded cache of cleared records with their scratch buffers retained.
pub struct RecordPool {
    free: ArrayQueue<Record>,
    dropped: AtomicU64,
    warned: AtomicU32,
}

impl RecordPool {
    /// Create a pool caching at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { free: ArrayQueue::new(capacity), dropped: AtomicU64::new(0), warned: AtomicU32::new(0) }
    }

    /// Hand out a cleared record, reusing pooled scratch capacity when
    /// available.
    #[must_use]
    pub fn acquire(&self) -> Record {
        self.free.pop().unwrap_or_default()
    }

    /// Return a record to the pool. The caller must guarantee no outstanding
    /// interior references; every field is reset and the scratch buffer kept
    /// at its prior capacity. Never fails: oversupply is dropped.
    pub fn release(&self, mut rec: Record) {
        rec.reset();
        if self.free.push(rec).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if self.warned.fetch_add(1, Ordering::Relaxed) == 0 {
                log::warn!("record pool at capacity; dropping released records");
            }
        }
    }

    /// Records dropped because the pool was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Acquire a cleared record from the process-wide pool.
#[must_use]
pub fn acquire() -> Record {
    POOL.acquire()
}

/// Release a record to the process-wide pool.
pub fn release(rec: Record) {
    POOL.release(rec);
}
