//! # Tree
//!
//! The facade tying the scan core's collaborators together: the manifest,
//! the mutable and immutable memtables, and the monotonic snapshot counter.
//! It also carries the blocking scan drivers most callers (and all of the
//! crate's tests and benches) use:
//!
//! - [`Tree::scan_collect`] — raw records in scan order, tombstones
//!   included, exactly as the merge produced them.
//! - [`Tree::scan_live`] — the caller-facing variant that filters
//!   tombstones and yields `(key, value)` pairs.
//!
//! Both drive a [`Scan`] through its seek/fetch/callback protocol, pumping
//! the grid's completion queue between callbacks — the single-threaded
//! event loop in miniature.
//!
//! Data enters the tree through [`Memtable`] writes, freezes into the
//! immutable table with [`Tree::freeze_mutable`], and lands on a level via
//! [`Tree::flush_immutable`] or directly through a
//! [`builder::TableBuilder`].

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Submodules
// ------------------------------------------------------------------------------------------------

pub mod builder;

pub use builder::TableBuilder;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::block::Value;
use crate::cursor::Direction;
use crate::grid::Grid;
use crate::manifest::{Manifest, Snapshot, TableInfo};
use crate::memtable::{ImmutableMemtable, Memtable};
use crate::scan::{Scan, ScanContext, ScanError};

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Construction-time parameters of a [`Tree`].
pub struct TreeConfig {
    /// Number of on-disk LSM levels.
    pub level_count: usize,

    /// Values per data block produced by [`Tree::flush_immutable`].
    pub block_value_count: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            level_count: 3,
            block_value_count: 64,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Tree
// ------------------------------------------------------------------------------------------------

/// An LSM tree as the scan core sees it: two memtables, a manifest full of
/// levelled tables, and a snapshot counter.
pub struct Tree {
    pub manifest: Manifest,
    pub table_mutable: Memtable,
    pub table_immutable: ImmutableMemtable,
    snapshot_current: Snapshot,
    block_value_count: usize,
}

impl Tree {
    pub fn new(config: TreeConfig) -> Self {
        assert!(config.block_value_count > 0);
        Self {
            manifest: Manifest::new(config.level_count),
            table_mutable: Memtable::new(),
            table_immutable: ImmutableMemtable::free(),
            snapshot_current: 1,
            block_value_count: config.block_value_count,
        }
    }

    pub fn level_count(&self) -> usize {
        self.manifest.level_count()
    }

    /// The snapshot new reads should pin.
    pub fn snapshot_current(&self) -> Snapshot {
        self.snapshot_current
    }

    /// Advances the snapshot counter and returns the fresh snapshot.
    pub fn snapshot_advance(&mut self) -> Snapshot {
        self.snapshot_current += 1;
        self.snapshot_current
    }

    // --------------------------------------------------------------------------------------------
    // Write-path plumbing (enough to feed scans)
    // --------------------------------------------------------------------------------------------

    /// Freezes the mutable table into the immutable slot, which must be
    /// free. Returns the snapshot at which the frozen data became immutable.
    pub fn freeze_mutable(&mut self) -> Snapshot {
        assert!(
            self.table_immutable.is_free(),
            "immutable table still awaiting flush"
        );
        let snapshot = self.snapshot_advance();
        let values = self.table_mutable.drain_sorted();
        debug!(snapshot, count = values.len(), "mutable table frozen");
        self.table_immutable = ImmutableMemtable::install(values, snapshot);
        snapshot
    }

    /// Flushes the immutable table to a new table on `level` and frees it.
    ///
    /// The key range written must be disjoint from the level's live tables;
    /// compaction (out of scope here) is what maintains that in a full
    /// engine. Returns `None` when the immutable table was empty.
    pub fn flush_immutable(
        &mut self,
        grid: &mut Grid,
        level: usize,
    ) -> Result<Option<TableInfo>, ScanError> {
        assert!(!self.table_immutable.is_free(), "no immutable table to flush");

        if self.table_immutable.values().is_empty() {
            self.table_immutable.release();
            return Ok(None);
        }

        let snapshot_min = self.table_immutable.snapshot_min();
        let mut builder = TableBuilder::new(self.block_value_count);
        for value in self.table_immutable.values() {
            builder.push(value.clone());
        }
        let info = builder.commit(grid, &mut self.manifest, level, snapshot_min)?;
        self.table_immutable.release();
        Ok(Some(info))
    }

    // --------------------------------------------------------------------------------------------
    // Blocking scan drivers
    // --------------------------------------------------------------------------------------------

    /// Drives one `fetch` to completion: registers the callback, then pumps
    /// grid completions until it fires.
    pub fn fetch_next(
        &self,
        scan: &mut Scan,
        grid: &mut Grid,
        context: &mut ScanContext,
    ) -> Result<Option<Value>, ScanError> {
        let slot: Rc<RefCell<Option<Result<Option<Value>, ScanError>>>> =
            Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);
        scan.fetch(
            self,
            grid,
            context,
            Box::new(move |result| {
                *sink.borrow_mut() = Some(result);
            }),
        );
        loop {
            if let Some(result) = slot.borrow_mut().take() {
                return result;
            }
            let Some(completion) = grid.tick_one() else {
                unreachable!("scan stalled with no pending I/O")
            };
            scan.on_completion(self, grid, context, completion);
        }
    }

    /// Scans `[key_min, key_max]` at `snapshot`, returning the raw merged
    /// records in scan order — tombstones included.
    pub fn scan_collect(
        &mut self,
        grid: &mut Grid,
        context: &mut ScanContext,
        snapshot: Snapshot,
        key_min: &[u8],
        key_max: &[u8],
        direction: Direction,
    ) -> Result<Vec<Value>, ScanError> {
        let mut scan = Scan::new();
        scan.seek(self, context, snapshot, key_min, key_max, direction);

        let mut records = Vec::new();
        loop {
            match self.fetch_next(&mut scan, grid, context)? {
                Some(value) => records.push(value),
                None => break,
            }
        }
        scan.reset();
        Ok(records)
    }

    /// Scans `[key_min, key_max]` at `snapshot`, yielding only live
    /// `(key, value)` pairs — tombstones filtered.
    pub fn scan_live(
        &mut self,
        grid: &mut Grid,
        context: &mut ScanContext,
        snapshot: Snapshot,
        key_min: &[u8],
        key_max: &[u8],
        direction: Direction,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ScanError> {
        let records = self.scan_collect(grid, context, snapshot, key_min, key_max, direction)?;
        Ok(records
            .into_iter()
            .filter(|value| !value.tombstone)
            .map(|value| (value.key, value.value))
            .collect())
    }
}
