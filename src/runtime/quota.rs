//! Resource accounting shared between tables.

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An accumulator with a fixed cap. `allocate` reserves against the cap,
/// `free` returns a prior reservation.
#[derive(Debug)]
pub struct QuotaPool {
    max: u64,
    used: AtomicU64,
}

impl QuotaPool {
    pub fn new(max: u64) -> Self {
        Self {
            max,
            used: AtomicU64::new(0),
        }
    }

    /// Reserves `amount` units; false when the cap would be exceeded.
    pub fn allocate(&self, amount: u64) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let new = used.checked_add(amount)?;
                (new <= self.max).then_some(new)
            })
            .is_ok()
    }

    /// Returns `amount` previously reserved units.
    pub fn free(&self, amount: u64) {
        let old = self.used.fetch_sub(amount, Ordering::AcqRel);
        debug_assert!(old >= amount, "freed more quota than was allocated");
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn max(&self) -> u64 {
        self.max
    }
}

/// Per-embedder quota accumulators; tables charge `table_elems` when
/// growing and return it on destruction.
#[derive(Debug)]
pub struct ResourceQuota {
    pub table_elems: QuotaPool,
}

impl ResourceQuota {
    pub fn new(max_table_elems: u64) -> Arc<Self> {
        Arc::new(Self {
            table_elems: QuotaPool::new(max_table_elems),
        })
    }
}

/// An optional shared quota; `None` means unmetered.
pub type ResourceQuotaRef = Option<Arc<ResourceQuota>>;
