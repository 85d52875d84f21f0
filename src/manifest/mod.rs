//! # Manifest
//!
//! The manifest is the authority on which tables exist on each LSM level at
//! each snapshot. The scan core never lists tables eagerly; it asks the
//! manifest for *the next* table in scan direction, one at a time, so a scan
//! touches only the tables its key range actually overlaps.
//!
//! ## Snapshot model
//!
//! Every table carries a visibility interval `[snapshot_min, snapshot_max)`.
//! A table created by a flush or compaction becomes visible at its
//! `snapshot_min`; when a compaction consumes it the table is *superseded* —
//! its `snapshot_max` is stamped — rather than removed. A scan pinned to
//! snapshot `S` therefore keeps an unchanging view of every level for its
//! whole lifetime, no matter what compactions commit concurrently.
//!
//! [`SNAPSHOT_LATEST`] is the sentinel for "whatever is live right now": it
//! selects exactly the tables that have not been superseded.
//!
//! ## Invariants
//!
//! - Per level, the tables visible at any single snapshot have disjoint key
//!   ranges (enforced on insert).
//! - Tables are held sorted by `key_min`, so the visible subset of a level
//!   is sorted in key order for both scan directions.
//! - Manifest misuse (bad level index, overlapping insert, superseding an
//!   unknown table) is a programmer error and asserts; there is no error
//!   type to propagate.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use tracing::trace;

use crate::block::{BlockAddress, BlockChecksum};
use crate::cursor::Direction;

// ------------------------------------------------------------------------------------------------
// Snapshots
// ------------------------------------------------------------------------------------------------

/// Monotonically assigned identifier selecting a consistent view of the
/// manifest and data.
pub type Snapshot = u64;

/// Sentinel snapshot meaning "the live state": selects every table that has
/// not been superseded.
pub const SNAPSHOT_LATEST: Snapshot = u64::MAX;

// ------------------------------------------------------------------------------------------------
// TableInfo
// ------------------------------------------------------------------------------------------------

/// One on-disk table as the manifest describes it: where its index block
/// lives, the key range it spans, and the snapshot interval it is visible in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Address of the table's index block.
    pub address: BlockAddress,

    /// Checksum of the table's index block.
    pub checksum: BlockChecksum,

    /// Smallest key stored in the table (inclusive).
    pub key_min: Vec<u8>,

    /// Largest key stored in the table (inclusive).
    pub key_max: Vec<u8>,

    /// First snapshot at which the table is visible.
    pub snapshot_min: Snapshot,

    /// Snapshot at which the table stops being visible ([`SNAPSHOT_LATEST`]
    /// while the table is live).
    pub snapshot_max: Snapshot,
}

impl TableInfo {
    /// Whether the table participates in reads pinned to `snapshot`.
    pub fn visible(&self, snapshot: Snapshot) -> bool {
        if snapshot == SNAPSHOT_LATEST {
            self.snapshot_max == SNAPSHOT_LATEST
        } else {
            self.snapshot_min <= snapshot && snapshot < self.snapshot_max
        }
    }

    /// Whether the table's key range intersects `[key_min, key_max]`.
    pub fn overlaps(&self, key_min: &[u8], key_max: &[u8]) -> bool {
        self.key_min.as_slice() <= key_max && key_min <= self.key_max.as_slice()
    }
}

// ------------------------------------------------------------------------------------------------
// Manifest
// ------------------------------------------------------------------------------------------------

/// Per-level table registry with snapshot-consistent enumeration.
pub struct Manifest {
    levels: Vec<Vec<TableInfo>>,
}

impl Manifest {
    pub fn new(level_count: usize) -> Self {
        assert!(level_count > 0, "a tree needs at least one level");
        Self {
            levels: (0..level_count).map(|_| Vec::new()).collect(),
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Number of tables registered on `level`, superseded ones included.
    pub fn table_count(&self, level: usize) -> usize {
        self.levels[level].len()
    }

    /// Registers a table on `level`, keeping the level sorted by `key_min`.
    ///
    /// Asserts the key-range invariants: `key_min <= key_max`, and no key
    /// overlap with another table whose visibility interval intersects.
    pub fn insert_table(&mut self, level: usize, table: TableInfo) {
        assert!(level < self.levels.len(), "level out of range");
        assert!(table.key_min <= table.key_max);
        assert!(table.snapshot_min < table.snapshot_max);

        let tables = &mut self.levels[level];
        for existing in tables.iter() {
            let keys_overlap = existing.overlaps(&table.key_min, &table.key_max);
            let snapshots_intersect = existing.snapshot_min < table.snapshot_max
                && table.snapshot_min < existing.snapshot_max;
            assert!(
                !(keys_overlap && snapshots_intersect),
                "tables visible at one snapshot must be disjoint within a level"
            );
        }

        trace!(
            level,
            address = table.address,
            snapshot_min = table.snapshot_min,
            "table registered"
        );
        let at = tables.partition_point(|t| t.key_min < table.key_min);
        tables.insert(at, table);
    }

    /// Stamps the end of a live table's visibility interval, making it
    /// invisible to snapshots `>= snapshot_max` (and to [`SNAPSHOT_LATEST`])
    /// while scans pinned to older snapshots keep seeing it.
    pub fn supersede_table(&mut self, level: usize, address: BlockAddress, snapshot_max: Snapshot) {
        let table = self.levels[level]
            .iter_mut()
            .find(|t| t.address == address)
            .expect("superseding a table the manifest does not know");
        assert!(
            table.snapshot_max == SNAPSHOT_LATEST,
            "table already superseded"
        );
        assert!(table.snapshot_min < snapshot_max);
        table.snapshot_max = snapshot_max;
        trace!(level, address, snapshot_max, "table superseded");
    }

    /// Returns the next table on `level`, in `direction`, that is visible at
    /// `snapshot`, overlaps `[key_min, key_max]`, and lies strictly beyond
    /// `key_exclusive` — the far-end key of the previously returned table
    /// (its `key_max` when ascending, `key_min` when descending).
    ///
    /// The manifest must not change what `snapshot` sees between two calls
    /// of the same walk; [`Manifest::supersede_table`] preserves this.
    pub fn next_table(
        &self,
        level: usize,
        snapshot: Snapshot,
        key_min: &[u8],
        key_max: &[u8],
        key_exclusive: Option<&[u8]>,
        direction: Direction,
    ) -> Option<&TableInfo> {
        assert!(level < self.levels.len(), "level out of range");
        let candidates = self.levels[level]
            .iter()
            .filter(|t| t.visible(snapshot) && t.overlaps(key_min, key_max));

        match direction {
            Direction::Ascending => candidates
                .filter(|t| key_exclusive.is_none_or(|k| t.key_min.as_slice() > k))
                .min_by(|a, b| a.key_min.cmp(&b.key_min)),
            Direction::Descending => candidates
                .filter(|t| key_exclusive.is_none_or(|k| t.key_max.as_slice() < k))
                .max_by(|a, b| a.key_max.cmp(&b.key_max)),
        }
    }
}
