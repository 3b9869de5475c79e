// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Guard strategies: the two mutual-exclusion disciplines being compared.
//!
//! Both variants own their [`SharedCell`] outright. Nothing outside a guard
//! can reach the cell, so the only mutation paths are `create()` and
//! `destroy()` under exclusive access.
//!
//! | Strategy      | `create` / `destroy` | `read`     |
//! |---------------|----------------------|------------|
//! | `RwLockGuard` | writer (exclusive)   | reader     |
//! | `MutexGuard`  | exclusive            | exclusive  |

use std::hint::black_box;

use parking_lot::{Mutex, RwLock};

use crate::cell::{CellAbsent, SharedCell, Snapshot};
use crate::types::Phase;

/// Capability interface shared by both strategies.
///
/// The fan-out/fan-in driver is written against this trait only, so both
/// strategies go through identical dispatch code.
pub trait GuardStrategy: Send + Sync + 'static {
    /// The phase this strategy is measured under.
    fn phase(&self) -> Phase;

    /// Install a fresh snapshot under exclusive access.
    fn create(&self);

    /// Read the snapshot under the strategy's read rule and consume it.
    fn read(&self) -> Result<Snapshot, CellAbsent>;

    /// Clear the cell under exclusive access.
    ///
    /// Returns false if the cell was already absent; calling it twice is safe.
    fn destroy(&self) -> bool;

    /// Whether a snapshot is currently installed (exclusive-side check).
    fn is_present(&self) -> bool;
}

/// Stand-in for real work on the snapshot.
#[inline]
fn consume(snapshot: &Snapshot) {
    black_box(snapshot.taken_at());
}

/// Concurrent readers, exclusive writer.
#[derive(Debug, Default)]
pub struct RwLockGuard {
    cell: RwLock<SharedCell>,
}

impl RwLockGuard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GuardStrategy for RwLockGuard {
    fn phase(&self) -> Phase {
        Phase::RwLock
    }

    fn create(&self) {
        self.cell.write().install(Snapshot::capture());
    }

    fn read(&self) -> Result<Snapshot, CellAbsent> {
        let cell = self.cell.read();
        let snapshot = *cell.get()?;
        consume(&snapshot);
        Ok(snapshot)
    }

    fn destroy(&self) -> bool {
        self.cell.write().clear().is_some()
    }

    fn is_present(&self) -> bool {
        self.cell.write().is_present()
    }
}

/// One monitor serializing every operation.
#[derive(Debug, Default)]
pub struct MutexGuard {
    cell: Mutex<SharedCell>,
}

impl MutexGuard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GuardStrategy for MutexGuard {
    fn phase(&self) -> Phase {
        Phase::Mutex
    }

    fn create(&self) {
        self.cell.lock().install(Snapshot::capture());
    }

    fn read(&self) -> Result<Snapshot, CellAbsent> {
        let cell = self.cell.lock();
        let snapshot = *cell.get()?;
        consume(&snapshot);
        Ok(snapshot)
    }

    fn destroy(&self) -> bool {
        self.cell.lock().clear().is_some()
    }

    fn is_present(&self) -> bool {
        self.cell.lock().is_present()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn exercise(guard: &dyn GuardStrategy) {
        assert!(!guard.is_present());
        assert_eq!(guard.read(), Err(CellAbsent));

        guard.create();
        assert!(guard.is_present());
        let first = guard.read().unwrap();
        assert_eq!(guard.read().unwrap(), first);

        assert!(guard.destroy());
        assert!(!guard.destroy());
        assert!(!guard.is_present());
    }

    #[test]
    fn test_rwlock_guard_lifecycle() {
        let guard = RwLockGuard::new();
        assert_eq!(guard.phase(), Phase::RwLock);
        exercise(&guard);
    }

    #[test]
    fn test_mutex_guard_lifecycle() {
        let guard = MutexGuard::new();
        assert_eq!(guard.phase(), Phase::Mutex);
        exercise(&guard);
    }

    #[test]
    fn test_concurrent_readers_see_same_snapshot() {
        let guard = Arc::new(RwLockGuard::new());
        guard.create();
        let expected = guard.read().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let guard = Arc::clone(&guard);
                thread::spawn(move || {
                    (0..1000).all(|_| guard.read() == Ok(expected))
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert!(guard.destroy());
    }

    #[test]
    fn test_rwlock_readers_overlap() {
        // Two read sides held at once would deadlock under an exclusive lock.
        let guard = RwLockGuard::new();
        guard.create();
        let first = guard.cell.read();
        let second = guard.cell.try_read();
        assert!(second.is_some());
        drop(second);
        drop(first);

        let mutex = MutexGuard::new();
        let held = mutex.cell.lock();
        assert!(mutex.cell.try_lock().is_none());
        drop(held);
    }
}
