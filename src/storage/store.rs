//! Bounded in-memory capture store

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::record::CaptureRecord;
use crate::{Result, TapError};

/// Insertion-ordered records with FIFO eviction
///
/// Records are frozen behind an [`Arc`] once added; readers get snapshots.
#[derive(Debug)]
pub struct CaptureStore {
    records: Mutex<VecDeque<Arc<CaptureRecord>>>,
    capacity: AtomicUsize,
}

impl CaptureStore {
    /// Create a store holding at most `capacity` records
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capture store capacity must be greater than 0");
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: AtomicUsize::new(capacity),
        }
    }

    /// Append a record, returning whatever was evicted to stay within bounds
    pub fn add(&self, record: CaptureRecord) -> Vec<Arc<CaptureRecord>> {
        let mut records = self.records.lock();
        records.push_back(Arc::new(record));
        Self::evict_over(&mut records, self.capacity())
    }

    /// Remove every record, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut records = self.records.lock();
        let count = records.len();
        records.clear();
        count
    }

    /// Snapshot of all records, oldest first
    #[must_use]
    pub fn all(&self) -> Vec<Arc<CaptureRecord>> {
        self.records.lock().iter().cloned().collect()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Current bound
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Change the bound, evicting the oldest records if now over it
    ///
    /// # Errors
    ///
    /// Returns error if `capacity` is zero
    pub fn set_capacity(&self, capacity: usize) -> Result<Vec<Arc<CaptureRecord>>> {
        if capacity == 0 {
            return Err(TapError::InvalidConfig(
                "max_captures must be greater than 0".to_string(),
            ));
        }
        let mut records = self.records.lock();
        self.capacity.store(capacity, Ordering::Release);
        Ok(Self::evict_over(&mut records, capacity))
    }

    fn evict_over(
        records: &mut VecDeque<Arc<CaptureRecord>>,
        capacity: usize,
    ) -> Vec<Arc<CaptureRecord>> {
        let mut evicted = Vec::new();
        while records.len() > capacity {
            if let Some(oldest) = records.pop_front() {
                evicted.push(oldest);
            }
        }
        evicted
    }
}
