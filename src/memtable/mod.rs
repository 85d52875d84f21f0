//! # Memtable
//!
//! The in-memory tables a scan merges ahead of every on-disk level:
//!
//! - [`Memtable`] — the mutable table accepting writes. Point puts and
//!   tombstones land in a `BTreeMap`; a scan obtains a **sorted, stable
//!   view** through [`Memtable::sort_into_values`] and copies the in-range
//!   window into its own buffers, so later writes never disturb an active
//!   scan.
//! - [`ImmutableMemtable`] — a frozen, read-only table awaiting flush. It
//!   participates in a scan only while populated and only for snapshots at
//!   or past its `snapshot_min`.
//!
//! Deletes are tombstone values, not physical removals; the scan core
//! delivers them unfiltered and visibility resolution happens above the
//! merge.
//!
//! No WAL and no size accounting here: durability and flush policy belong to
//! the write path, which this crate only models far enough to feed scans.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;

use tracing::trace;

use crate::block::Value;
use crate::manifest::Snapshot;

// ------------------------------------------------------------------------------------------------
// Mutable Memtable
// ------------------------------------------------------------------------------------------------

/// The mutable, in-memory write buffer.
///
/// Stores at most one entry per key — a later write replaces an earlier one,
/// which is exactly the precedence the scan's merge gives the mutable table
/// anyway.
pub struct Memtable {
    entries: BTreeMap<Vec<u8>, Value>,

    /// Cached sorted view handed to scans; rebuilt lazily after mutation.
    sorted: Vec<Value>,
    sorted_stale: bool,
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            sorted: Vec::new(),
            sorted_stale: false,
        }
    }

    /// Inserts or replaces a live value.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        let value = Value::put(key, value);
        trace!(key = ?value.key, "memtable put");
        self.entries.insert(value.key.clone(), value);
        self.sorted_stale = true;
    }

    /// Inserts a point tombstone for `key`.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        let value = Value::tombstone(key);
        trace!(key = ?value.key, "memtable delete");
        self.entries.insert(value.key.clone(), value);
        self.sorted_stale = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the table's values sorted ascending by key.
    ///
    /// The returned slice is stable until the next mutation — a scan must
    /// copy the window it needs before yielding back to writers.
    pub fn sort_into_values(&mut self) -> &[Value] {
        if self.sorted_stale || self.sorted.len() != self.entries.len() {
            self.sorted.clear();
            self.sorted.extend(self.entries.values().cloned());
            self.sorted_stale = false;
        }
        &self.sorted
    }

    /// Drains every entry, returning them in key order. Used when freezing
    /// the table into an [`ImmutableMemtable`].
    pub fn drain_sorted(&mut self) -> Vec<Value> {
        self.sorted.clear();
        self.sorted_stale = false;
        let entries = std::mem::take(&mut self.entries);
        entries.into_values().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.sorted.clear();
        self.sorted_stale = false;
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

// ------------------------------------------------------------------------------------------------
// Immutable Memtable
// ------------------------------------------------------------------------------------------------

/// A frozen memtable: sorted values, read-only, visible to snapshots at or
/// past `snapshot_min`. Starts (and can be returned to) the free state, in
/// which scans skip it entirely.
pub struct ImmutableMemtable {
    values: Vec<Value>,
    snapshot_min: Snapshot,
    free: bool,
}

impl ImmutableMemtable {
    /// An unpopulated table.
    pub fn free() -> Self {
        Self {
            values: Vec::new(),
            snapshot_min: 0,
            free: true,
        }
    }

    /// Freezes `values` (sorted ascending, strictly unique keys) as of
    /// `snapshot_min`.
    pub fn install(values: Vec<Value>, snapshot_min: Snapshot) -> Self {
        debug_assert!(values.windows(2).all(|pair| pair[0].key < pair[1].key));
        Self {
            values,
            snapshot_min,
            free: false,
        }
    }

    /// Sorted values; empty while free.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn snapshot_min(&self) -> Snapshot {
        self.snapshot_min
    }

    /// `true` when the table holds no frozen data.
    pub fn is_free(&self) -> bool {
        self.free
    }

    /// Releases the frozen data (after its flush to a level completes).
    pub fn release(&mut self) {
        self.values.clear();
        self.snapshot_min = 0;
        self.free = true;
    }
}
