//! # Block Layout
//!
//! On-disk table layout as seen by the scan core: sorted **data blocks** of
//! versioned values and per-table **index blocks** describing them.
//!
//! ## Design Overview
//!
//! Each table on a level consists of one index block plus the data blocks it
//! points at:
//!
//! ```text
//! IndexBlock:  [boundary_key | address | checksum]   (one entry per data block,
//!              [boundary_key | address | checksum]    boundary = block's max key,
//!              ...                                    entries sorted ascending)
//!
//! DataBlock:   [Value, Value, ...]                   (strictly sorted by key)
//! ```
//!
//! Blocks travel through the storage grid as [`bincode`]-encoded bytes with
//! **fixed integer encoding**; a CRC32 checksum over the encoded bytes is
//! computed at write time and verified on every read. Tombstones are ordinary
//! values flagged `tombstone` — the scan core merges them like any other
//! value and leaves filtering to callers.
//!
//! Blocks are immutable once stored. During a scan each block is decoded
//! once, into a scan-owned buffer slot, and stays valid there until the scan
//! advances past it.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use bincode::config::standard;
use bincode::{Decode, Encode};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Identifiers
// ------------------------------------------------------------------------------------------------

/// Storage address of one block.
pub type BlockAddress = u64;

/// CRC32 over a block's encoded bytes.
pub type BlockChecksum = u32;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors surfaced while encoding or decoding block bytes.
#[derive(Debug, Error)]
pub enum BlockError {
    /// Block could not be encoded.
    #[error("Block encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Block bytes could not be decoded.
    #[error("Block decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

// ------------------------------------------------------------------------------------------------
// Value
// ------------------------------------------------------------------------------------------------

/// A single versioned entry: a key, its payload, and a tombstone flag.
///
/// Values are immutable within a table. A tombstone carries an empty payload
/// and marks the key as deleted in its generation; the scan core delivers
/// tombstones unfiltered so that callers can resolve visibility.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Value {
    /// The key bytes. Defines ordering and equality.
    pub key: Vec<u8>,

    /// The payload bytes. Empty for tombstones.
    pub value: Vec<u8>,

    /// Whether this entry deletes the key.
    pub tombstone: bool,
}

impl Value {
    /// A live key-value pair.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            tombstone: false,
        }
    }

    /// A deletion marker for `key`.
    pub fn tombstone(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Vec::new(),
            tombstone: true,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Index Block
// ------------------------------------------------------------------------------------------------

/// Per-table directory of data blocks.
///
/// Three parallel arrays, sorted ascending by boundary key. Entry `i`
/// describes data block `i`: `keys[i]` is that block's **largest** key,
/// `addresses[i]` / `checksums[i]` locate and verify it in storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct IndexBlock {
    keys: Vec<Vec<u8>>,
    addresses: Vec<BlockAddress>,
    checksums: Vec<BlockChecksum>,
}

impl IndexBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one data-block entry. Boundary keys must arrive in strictly
    /// ascending order.
    pub fn push_entry(&mut self, boundary_key: Vec<u8>, address: BlockAddress, checksum: BlockChecksum) {
        if let Some(last) = self.keys.last() {
            assert!(
                last.as_slice() < boundary_key.as_slice(),
                "index block boundary keys must be strictly ascending"
            );
        }
        self.keys.push(boundary_key);
        self.addresses.push(address);
        self.checksums.push(checksum);
    }

    /// Boundary keys (each data block's max key), sorted ascending.
    pub fn data_keys(&self) -> &[Vec<u8>] {
        &self.keys
    }

    /// Data-block addresses, parallel to [`IndexBlock::data_keys`].
    pub fn data_addresses(&self) -> &[BlockAddress] {
        &self.addresses
    }

    /// Data-block checksums, parallel to [`IndexBlock::data_keys`].
    pub fn data_checksums(&self) -> &[BlockChecksum] {
        &self.checksums
    }

    /// Number of data blocks described.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Drops all entries, keeping allocations for reuse.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.addresses.clear();
        self.checksums.clear();
    }
}

// ------------------------------------------------------------------------------------------------
// Data Block
// ------------------------------------------------------------------------------------------------

/// A sorted run of values stored contiguously.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct DataBlock {
    values: Vec<Value>,
}

impl DataBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one value. Keys must arrive in strictly ascending order.
    pub fn push(&mut self, value: Value) {
        if let Some(last) = self.values.last() {
            assert!(
                last.key < value.key,
                "data block keys must be strictly ascending"
            );
        }
        self.values.push(value);
    }

    /// The values, sorted ascending by key.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Binary point lookup within this block.
    pub fn search(&self, key: &[u8]) -> Option<&Value> {
        self.values
            .binary_search_by(|value| value.key.as_slice().cmp(key))
            .ok()
            .map(|index| &self.values[index])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drops all values, keeping the allocation for reuse.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

// ------------------------------------------------------------------------------------------------
// Encoding helpers
// ------------------------------------------------------------------------------------------------

/// Encodes a block into the byte form stored by the grid: standard bincode
/// configuration with fixed-int encoding.
pub fn encode_block<T: Encode>(block: &T) -> Result<Vec<u8>, BlockError> {
    Ok(bincode::encode_to_vec(
        block,
        standard().with_fixed_int_encoding(),
    )?)
}

/// Decodes block bytes previously produced by [`encode_block`].
pub fn decode_block<T: Decode<()>>(bytes: &[u8]) -> Result<T, BlockError> {
    let (block, _) = bincode::decode_from_slice(bytes, standard().with_fixed_int_encoding())?;
    Ok(block)
}

/// CRC32 over encoded block bytes.
pub fn checksum_of(bytes: &[u8]) -> BlockChecksum {
    crc32fast::hash(bytes)
}
