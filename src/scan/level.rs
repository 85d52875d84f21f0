//! Level iterators — the walkers that turn one LSM level into a stream of
//! data blocks overlapping the scan range.
//!
//! Two cooperating pieces:
//!
//! - [`LevelIndexIterator`] asks the manifest for successive overlapping
//!   tables, snapshot-consistently, tracking its position with the far-end
//!   key of the last table it yielded (`key_max` ascending, `key_min`
//!   descending).
//! - [`LevelIterator`] layers the per-table data-block walk on top: once a
//!   table's index block is loaded and refined, it visits the refined window
//!   one data block at a time (front-to-back ascending, back-to-front
//!   descending), then falls through to the manifest for the next table.
//!
//! Neither type performs I/O. They only *decide* the next read; the scan
//! driver owns submission and completion handling, so every state transition
//! here is synchronous and unit-testable.

use crate::block::{BlockAddress, BlockChecksum, IndexBlock};
use crate::cursor::{Cursor, Direction, index_block_range};
use crate::manifest::{Manifest, Snapshot};

// ------------------------------------------------------------------------------------------------
// LevelIndexIterator
// ------------------------------------------------------------------------------------------------

/// Snapshot-consistent walk over one level's overlapping tables.
#[derive(Debug)]
pub(crate) struct LevelIndexIterator {
    level: usize,
    snapshot: Snapshot,

    /// Far-end key of the last yielded table; the manifest only returns
    /// tables strictly beyond it in scan direction.
    key_exclusive: Option<Vec<u8>>,
}

impl LevelIndexIterator {
    pub(crate) fn new(level: usize, snapshot: Snapshot) -> Self {
        Self {
            level,
            snapshot,
            key_exclusive: None,
        }
    }

    /// Returns the index-block read for the next overlapping table and
    /// advances the walk past it, or `None` at end of level.
    pub(crate) fn next(
        &mut self,
        manifest: &Manifest,
        key_min: &[u8],
        key_max: &[u8],
        direction: Direction,
    ) -> Option<TableRead> {
        let table = manifest.next_table(
            self.level,
            self.snapshot,
            key_min,
            key_max,
            self.key_exclusive.as_deref(),
            direction,
        )?;
        assert!(
            table.overlaps(key_min, key_max),
            "manifest returned a table outside the scan range"
        );
        self.key_exclusive = Some(match direction {
            Direction::Ascending => table.key_max.clone(),
            Direction::Descending => table.key_min.clone(),
        });
        Some(TableRead {
            address: table.address,
            checksum: table.checksum,
        })
    }
}

/// The index-block read locating one table.
pub(crate) struct TableRead {
    pub address: BlockAddress,
    pub checksum: BlockChecksum,
}

// ------------------------------------------------------------------------------------------------
// LevelIterator
// ------------------------------------------------------------------------------------------------

/// The next thing a level must do to make progress.
pub(crate) enum LevelAction {
    /// Read the index block of the next overlapping table.
    ReadIndex {
        address: BlockAddress,
        checksum: BlockChecksum,
    },

    /// Read the data block at the current position of the refined window.
    ReadData {
        address: BlockAddress,
        checksum: BlockChecksum,
    },

    /// No further tables on this level: deliver the terminal wakeup.
    Done,
}

/// Per-level composition of the manifest walk and the data-block walk.
#[derive(Debug)]
pub(crate) struct LevelIterator {
    index: LevelIndexIterator,

    /// Window of index-block entries still to visit for the current table.
    /// `None` until an index block has been loaded and refined; unpositioned
    /// once the table's window is exhausted.
    blocks: Option<Cursor>,
}

impl LevelIterator {
    pub(crate) fn new(level: usize, snapshot: Snapshot) -> Self {
        Self {
            index: LevelIndexIterator::new(level, snapshot),
            blocks: None,
        }
    }

    /// Decides the next read for this level.
    ///
    /// `index_block` is the scan-owned copy of the current table's index
    /// block; it is only consulted while the block window is positioned.
    pub(crate) fn next_action(
        &mut self,
        manifest: &Manifest,
        index_block: &IndexBlock,
        key_min: &[u8],
        key_max: &[u8],
        direction: Direction,
    ) -> LevelAction {
        if let Some(blocks) = &self.blocks
            && let Some(position) = blocks.position()
        {
            return LevelAction::ReadData {
                address: index_block.data_addresses()[position],
                checksum: index_block.data_checksums()[position],
            };
        }

        match self.index.next(manifest, key_min, key_max, direction) {
            Some(read) => {
                self.blocks = None;
                LevelAction::ReadIndex {
                    address: read.address,
                    checksum: read.checksum,
                }
            }
            None => LevelAction::Done,
        }
    }

    /// Refines a freshly loaded index block to the window of data blocks
    /// that can hold in-range keys, positioning at the window's near end.
    ///
    /// Returns `false` when no data block qualifies.
    pub(crate) fn on_index_loaded(
        &mut self,
        index_block: &IndexBlock,
        key_min: &[u8],
        key_max: &[u8],
        direction: Direction,
    ) -> bool {
        let (start, count) = index_block_range(index_block.data_keys(), key_min, key_max);
        if count == 0 {
            self.blocks = None;
            return false;
        }
        self.blocks = Some(Cursor::new(start, count, direction));
        true
    }

    /// Consumes the current window position once its data block has been
    /// copied in. Stepping off the window's end leaves the iterator ready to
    /// ask the manifest for the next table.
    pub(crate) fn block_consumed(&mut self, direction: Direction) {
        let blocks = self
            .blocks
            .as_mut()
            .expect("consumed a data block without a block window");
        blocks.advance(direction);
    }
}
