// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! The single piece of mutable state under test.

use std::time::SystemTime;

use thiserror::Error;

/// Opaque payload installed by `create()`: the wall-clock time it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    taken_at: SystemTime,
}

impl Snapshot {
    pub fn capture() -> Self {
        Self {
            taken_at: SystemTime::now(),
        }
    }

    pub fn taken_at(&self) -> SystemTime {
        self.taken_at
    }
}

/// A read found the cell absent. Only possible if fan-out/fan-in ordering is broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("shared cell observed absent")]
pub struct CellAbsent;

/// Optional snapshot slot. Owned by exactly one guard strategy for one phase.
#[derive(Debug, Default)]
pub struct SharedCell {
    snapshot: Option<Snapshot>,
}

impl SharedCell {
    pub const fn new() -> Self {
        Self { snapshot: None }
    }

    pub fn install(&mut self, snapshot: Snapshot) {
        self.snapshot = Some(snapshot);
    }

    pub fn get(&self) -> Result<&Snapshot, CellAbsent> {
        self.snapshot.as_ref().ok_or(CellAbsent)
    }

    /// Clear the slot, returning what was there.
    pub fn clear(&mut self) -> Option<Snapshot> {
        self.snapshot.take()
    }

    pub fn is_present(&self) -> bool {
        self.snapshot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_lifecycle() {
        let mut cell = SharedCell::new();
        assert_eq!(cell.get(), Err(CellAbsent));

        let snapshot = Snapshot::capture();
        cell.install(snapshot);
        assert_eq!(cell.get(), Ok(&snapshot));

        assert_eq!(cell.clear(), Some(snapshot));
        assert_eq!(cell.clear(), None);
        assert!(!cell.is_present());
    }
}
