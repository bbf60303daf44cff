use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Error, Result};

/// Byte accounting for one cleaning operation.
///
/// Materialized stream payloads and decoded filter output are charged here. With a ceiling set,
/// a charge that would exceed it fails instead of allocating.
#[derive(Debug, Default)]
pub struct MemoryBudget {
    used: AtomicUsize,
    limit: Option<usize>,
}

impl MemoryBudget {
    pub fn new(limit: Option<usize>) -> MemoryBudget {
        MemoryBudget {
            used: AtomicUsize::new(0),
            limit,
        }
    }

    pub fn unlimited() -> MemoryBudget {
        MemoryBudget::new(None)
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    pub fn charge(&self, bytes: usize) -> Result<()> {
        let Some(limit) = self.limit else {
            self.used.fetch_add(bytes, Ordering::Relaxed);
            return Ok(());
        };
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|total| *total <= limit)
            })
            .map(|_| ())
            .map_err(|used| Error::MemoryLimit {
                limit,
                requested: used.saturating_add(bytes),
            })
    }

    pub fn release(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| Some(used.saturating_sub(bytes)));
    }
}
