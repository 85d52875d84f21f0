//! # Block Storage Grid
//!
//! Asynchronous, callback-free block storage for the scan core. The grid is
//! the crate's I/O seam: scans submit block reads and next-tick wakeups, the
//! event loop drains **completions**, and every completion carries the
//! routing tag it was submitted with.
//!
//! ## Design Overview
//!
//! Submissions never complete inside the caller's frame. `read_block` and
//! `on_next_tick` only enqueue work; results surface exclusively through
//! [`Grid::tick_one`], which the event loop calls until it runs dry:
//!
//! ```text
//! scan ── read_block(tag, addr, csum, kind) ──► pending queue
//! scan ── on_next_tick(tag)                ──► pending queue
//! loop ── tick_one() ◄──────────────────────── completion (tag + payload)
//! ```
//!
//! This is what keeps the scan's "the fetch callback never fires within
//! `fetch`'s own stack frame" guarantee trivially true.
//!
//! ## Integrity
//!
//! Blocks are stored as encoded bytes. Every read verifies the CRC32 of the
//! stored bytes against the checksum the caller expects (taken from the
//! manifest or an index block); mismatches and unknown addresses surface as
//! [`GridError`] inside the completion rather than as panics — the storage
//! layer's error policy belongs to the caller.
//!
//! ## Test controls
//!
//! Deterministic single-threaded behaviour makes fault injection simple:
//! [`Grid::delay_block`] holds reads of one address for a number of queue
//! rotations (letting later submissions overtake them) and
//! [`Grid::corrupt_block`] flips a stored byte. Read counters per kind and
//! per address let tests assert exactly how much I/O a scan performed.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::{HashMap, VecDeque};

use thiserror::Error;
use tracing::{trace, warn};

use crate::block::{self, BlockAddress, BlockChecksum};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors a block read can complete with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    /// No block was ever stored at this address.
    #[error("No block at address {address}")]
    MissingBlock { address: BlockAddress },

    /// Stored bytes do not hash to the checksum the caller expected.
    #[error("Checksum mismatch at address {address}: expected {expected:#010x}, found {actual:#010x}")]
    ChecksumMismatch {
        address: BlockAddress,
        expected: BlockChecksum,
        actual: BlockChecksum,
    },
}

// ------------------------------------------------------------------------------------------------
// Submission & completion types
// ------------------------------------------------------------------------------------------------

/// Which of a table's two block kinds a read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Index,
    Data,
}

/// Routing tag echoed back on the completion.
///
/// `buffer` identifies the scan (its buffer slot id is unique while active);
/// `level` is the LSM level a block read or end-of-level tick belongs to.
/// A tick with `level: None` is a scan-wide wakeup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadTag {
    pub buffer: u32,
    pub level: Option<u32>,
}

/// One finished submission, as drained by the event loop.
#[derive(Debug)]
pub enum Completion {
    /// A block read finished (successfully or not).
    Read {
        tag: ReadTag,
        kind: BlockKind,
        result: Result<Vec<u8>, GridError>,
    },

    /// A next-tick wakeup fired.
    Tick { tag: ReadTag },
}

enum Pending {
    Read {
        tag: ReadTag,
        address: BlockAddress,
        checksum: BlockChecksum,
        kind: BlockKind,
        holds: u32,
    },
    Tick {
        tag: ReadTag,
    },
}

struct StoredBlock {
    bytes: Vec<u8>,
}

// ------------------------------------------------------------------------------------------------
// Grid
// ------------------------------------------------------------------------------------------------

/// In-memory block store plus the completion queue that makes every access
/// asynchronous with respect to the submitter.
pub struct Grid {
    blocks: HashMap<BlockAddress, StoredBlock>,
    address_next: BlockAddress,
    pending: VecDeque<Pending>,
    delays: HashMap<BlockAddress, u32>,
    index_reads: u64,
    data_reads: u64,
    reads_per_address: HashMap<BlockAddress, u64>,
}

impl Grid {
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            address_next: 1, // address 0 is reserved as "never allocated"
            pending: VecDeque::new(),
            delays: HashMap::new(),
            index_reads: 0,
            data_reads: 0,
            reads_per_address: HashMap::new(),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Write side (table building)
    // --------------------------------------------------------------------------------------------

    /// Stores encoded block bytes at a freshly allocated address.
    ///
    /// Returns the address and the CRC32 readers must present to read the
    /// block back.
    pub fn put_block(&mut self, bytes: Vec<u8>) -> (BlockAddress, BlockChecksum) {
        let address = self.address_next;
        self.address_next += 1;
        let checksum = block::checksum_of(&bytes);
        trace!(address, checksum, len = bytes.len(), "block stored");
        self.blocks.insert(address, StoredBlock { bytes });
        (address, checksum)
    }

    // --------------------------------------------------------------------------------------------
    // Read side (scan core contract)
    // --------------------------------------------------------------------------------------------

    /// Submits an asynchronous block read.
    ///
    /// The result is delivered through a later [`Grid::tick_one`] as a
    /// [`Completion::Read`] carrying `tag` — never within this call.
    pub fn read_block(
        &mut self,
        tag: ReadTag,
        address: BlockAddress,
        checksum: BlockChecksum,
        kind: BlockKind,
    ) {
        let holds = self.delays.get(&address).copied().unwrap_or(0);
        self.pending.push_back(Pending::Read {
            tag,
            address,
            checksum,
            kind,
            holds,
        });
    }

    /// Schedules a wakeup that fires on a later [`Grid::tick_one`] with no
    /// I/O attached.
    pub fn on_next_tick(&mut self, tag: ReadTag) {
        self.pending.push_back(Pending::Tick { tag });
    }

    /// Delivers the next due completion, or `None` when nothing is pending.
    ///
    /// Completions are FIFO except that reads still held by a configured
    /// delay rotate to the back of the queue, aging one step per pass.
    pub fn tick_one(&mut self) -> Option<Completion> {
        if self.pending.is_empty() {
            return None;
        }
        loop {
            match self.pending.pop_front()? {
                Pending::Tick { tag } => return Some(Completion::Tick { tag }),
                Pending::Read {
                    tag,
                    address,
                    checksum,
                    kind,
                    holds,
                } => {
                    if holds > 0 {
                        self.pending.push_back(Pending::Read {
                            tag,
                            address,
                            checksum,
                            kind,
                            holds: holds - 1,
                        });
                        continue;
                    }
                    let result = self.complete_read(address, checksum, kind);
                    return Some(Completion::Read { tag, kind, result });
                }
            }
        }
    }

    /// Number of submissions not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    fn complete_read(
        &mut self,
        address: BlockAddress,
        checksum: BlockChecksum,
        kind: BlockKind,
    ) -> Result<Vec<u8>, GridError> {
        match kind {
            BlockKind::Index => self.index_reads += 1,
            BlockKind::Data => self.data_reads += 1,
        }
        *self.reads_per_address.entry(address).or_insert(0) += 1;

        let Some(stored) = self.blocks.get(&address) else {
            warn!(address, "read of unknown block address");
            return Err(GridError::MissingBlock { address });
        };
        let actual = block::checksum_of(&stored.bytes);
        if actual != checksum {
            warn!(address, expected = checksum, actual, "block checksum mismatch");
            return Err(GridError::ChecksumMismatch {
                address,
                expected: checksum,
                actual,
            });
        }
        Ok(stored.bytes.clone())
    }

    // --------------------------------------------------------------------------------------------
    // Fault injection & statistics
    // --------------------------------------------------------------------------------------------

    /// Holds every future read of `address` for `rotations` passes of the
    /// completion queue, letting later submissions complete first.
    pub fn delay_block(&mut self, address: BlockAddress, rotations: u32) {
        self.delays.insert(address, rotations);
    }

    /// Flips a byte of the stored block so its checksum no longer matches.
    pub fn corrupt_block(&mut self, address: BlockAddress) {
        let stored = self
            .blocks
            .get_mut(&address)
            .expect("corrupting a block that was never stored");
        let last = stored.bytes.last_mut().expect("stored block is empty");
        *last ^= 0xFF;
    }

    /// Total index-block reads completed.
    pub fn index_read_count(&self) -> u64 {
        self.index_reads
    }

    /// Total data-block reads completed.
    pub fn data_read_count(&self) -> u64 {
        self.data_reads
    }

    /// Reads completed against one address.
    pub fn read_count(&self, address: BlockAddress) -> u64 {
        self.reads_per_address.get(&address).copied().unwrap_or(0)
    }
}
