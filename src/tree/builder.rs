//! Table builder — packs a sorted run of values into grid blocks.
//!
//! The flush/compaction output path, reduced to what feeding the scan core
//! requires: chunk the staged values into data blocks, store each block in
//! the grid, record its boundary key in the index block, store the index
//! block, and register the resulting [`TableInfo`] in the manifest.

use tracing::debug;

use crate::block::{self, BlockError, DataBlock, IndexBlock, Value};
use crate::grid::Grid;
use crate::manifest::{Manifest, SNAPSHOT_LATEST, Snapshot, TableInfo};

/// Accumulates strictly ascending values, then writes one complete table.
pub struct TableBuilder {
    block_value_count: usize,
    values: Vec<Value>,
}

impl TableBuilder {
    /// `block_value_count` is the number of values packed per data block;
    /// the final block of a table may hold fewer.
    pub fn new(block_value_count: usize) -> Self {
        assert!(block_value_count > 0);
        Self {
            block_value_count,
            values: Vec::new(),
        }
    }

    /// Stages one value. Keys must arrive in strictly ascending order.
    pub fn push(&mut self, value: Value) {
        if let Some(last) = self.values.last() {
            assert!(
                last.key < value.key,
                "table values must be strictly ascending"
            );
        }
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Writes the staged values as one table: data blocks and index block
    /// into `grid`, the [`TableInfo`] into `manifest` on `level`, visible
    /// from `snapshot_min`.
    pub fn commit(
        self,
        grid: &mut Grid,
        manifest: &mut Manifest,
        level: usize,
        snapshot_min: Snapshot,
    ) -> Result<TableInfo, BlockError> {
        assert!(!self.values.is_empty(), "committing an empty table");

        let key_min = self.values[0].key.clone();
        let key_max = self.values[self.values.len() - 1].key.clone();

        let mut index = IndexBlock::new();
        for chunk in self.values.chunks(self.block_value_count) {
            let mut data = DataBlock::new();
            for value in chunk {
                data.push(value.clone());
            }
            let bytes = block::encode_block(&data)?;
            let (address, checksum) = grid.put_block(bytes);
            index.push_entry(chunk[chunk.len() - 1].key.clone(), address, checksum);
        }

        let bytes = block::encode_block(&index)?;
        let (address, checksum) = grid.put_block(bytes);

        let info = TableInfo {
            address,
            checksum,
            key_min,
            key_max,
            snapshot_min,
            snapshot_max: SNAPSHOT_LATEST,
        };
        debug!(
            level,
            address,
            blocks = index.len(),
            values = self.values.len(),
            "table committed"
        );
        manifest.insert_table(level, info.clone());
        Ok(info)
    }
}
