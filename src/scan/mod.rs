//! # Scan
//!
//! The range-scan engine: given `[key_min, key_max]`, a snapshot, and a
//! direction, deliver every value in range — merged across the mutable
//! memtable, the immutable memtable, and every LSM level — one value per
//! `fetch`, in key order, with newer generations overriding older ones.
//!
//! ## Design Overview
//!
//! ```text
//!             ┌─────────────────────────── Scan ───────────────────────────┐
//!             │ state ∈ {Idle, Seeking, Fetching{pending}}                 │
//!             │                                                            │
//!             │  memtable cursors        LevelScan[0..L]                   │
//!             │  (windows copied   ┌──────────────────────────┐            │
//!             │   out at seek)     │ state ∈ {Load, Next,     │            │
//!             │                    │          Current, Eof}   │            │
//!             │                    │ LevelIterator ──► grid   │            │
//!             │                    └──────────────────────────┘            │
//!             │                 k-way merge (precedence by stream)         │
//!             └────────────────────────────────────────────────────────────┘
//! ```
//!
//! `seek` pins the snapshot, copies the in-range memtable windows, and arms
//! one [`level::LevelIterator`] per level. `fetch` issues block reads for
//! every level in `Load`, tracked by a pending counter seeded with an
//! epilogue guard of 1; when the counter reaches zero the merge pops exactly
//! one value and the caller's callback fires. When no I/O is needed the
//! wakeup goes through the grid's next-tick queue, so the callback **never**
//! fires inside `fetch`'s own frame.
//!
//! A merge pop that finds some level still loading reports `Drained`; the
//! scan then re-enters the fetch cycle internally — the caller still sees
//! exactly one callback per `fetch`.
//!
//! ## Memory
//!
//! All block storage for a scan comes from a [`ScanContext`]: a bump
//! allocator of [`SCAN_MAX`] buffer sets, each holding one index-block slot
//! and one data-block slot per level. Peak block memory per scan is
//! therefore `2 × level_count` blocks, independent of how many tables the
//! scan visits. Buffer slots return to the pool only through
//! [`ScanContext::reset`], which callers invoke once every scan sharing the
//! context is finished.
//!
//! ## Concurrency model
//!
//! Single-threaded and cooperative. All transitions run on the event loop
//! thread, either inside `seek`/`fetch` or inside
//! [`Scan::on_completion`] as the loop drains the grid. There are no locks;
//! at most one callback per scan is outstanding at any time; a pending
//! `fetch` cannot be cancelled — wait for its callback, then `reset`.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Submodules
// ------------------------------------------------------------------------------------------------

pub(crate) mod level;
mod merge;

pub(crate) use merge::MergeStep;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::block::{self, BlockError, DataBlock, IndexBlock, Value};
use crate::cursor::{Cursor, Direction, range_of};
use crate::grid::{BlockKind, Completion, Grid, GridError, ReadTag};
use crate::manifest::Snapshot;
use crate::tree::Tree;

use level::{LevelAction, LevelIterator};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors a fetch can deliver through its callback.
///
/// Everything else that can go wrong around a scan — seeking while not
/// idle, fetching while not seeking, exhausting the buffer pool — is a
/// programmer error and asserts instead.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The storage layer failed a block read. Scans do not retry.
    #[error("Storage error: {0}")]
    Grid(#[from] GridError),

    /// A block arrived but its bytes would not decode.
    #[error("Block error: {0}")]
    Block(#[from] BlockError),
}

// ------------------------------------------------------------------------------------------------
// ScanContext & ScanBuffer
// ------------------------------------------------------------------------------------------------

/// Most scans a [`ScanContext`] can serve before [`ScanContext::reset`].
pub const SCAN_MAX: usize = 10;

/// Handle to one buffer set inside a [`ScanContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferId(u32);

impl BufferId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One (index block, data block) slot pair per level.
pub(crate) struct LevelBuffer {
    pub index: IndexBlock,
    pub data: DataBlock,
}

struct ScanBuffer {
    levels: Vec<LevelBuffer>,
}

impl ScanBuffer {
    fn new(level_count: usize) -> Self {
        Self {
            levels: (0..level_count)
                .map(|_| LevelBuffer {
                    index: IndexBlock::new(),
                    data: DataBlock::new(),
                })
                .collect(),
        }
    }

    fn clear(&mut self) {
        for level in &mut self.levels {
            level.index.clear();
            level.data.clear();
        }
    }
}

/// Bump allocator of per-scan buffer sets, shared by a tree's scans.
///
/// `get_buffer` is monotonic; individual slots are never handed back. All
/// scans sharing a context finish, then the caller calls `reset` once to
/// reclaim every slot.
pub struct ScanContext {
    buffers: Vec<ScanBuffer>,
    used: usize,
    level_count: usize,
}

impl ScanContext {
    pub fn new(level_count: usize) -> Self {
        assert!(level_count > 0, "a tree needs at least one level");
        Self {
            buffers: (0..SCAN_MAX).map(|_| ScanBuffer::new(level_count)).collect(),
            used: 0,
            level_count,
        }
    }

    pub fn level_count(&self) -> usize {
        self.level_count
    }

    /// Claims the next free buffer set. Asserts when all [`SCAN_MAX`] sets
    /// are taken.
    pub fn get_buffer(&mut self) -> BufferId {
        assert!(self.used < SCAN_MAX, "scan buffer pool exhausted");
        let id = BufferId(self.used as u32);
        self.used += 1;
        id
    }

    /// Reclaims every buffer set. No scan sharing this context may still be
    /// active.
    pub fn reset(&mut self) {
        self.used = 0;
        for buffer in &mut self.buffers {
            buffer.clear();
        }
    }

    /// Buffer sets currently claimed.
    pub fn buffers_used(&self) -> usize {
        self.used
    }

    pub(crate) fn level(&self, id: BufferId, level: usize) -> &LevelBuffer {
        &self.buffers[id.index()].levels[level]
    }

    pub(crate) fn level_mut(&mut self, id: BufferId, level: usize) -> &mut LevelBuffer {
        &mut self.buffers[id.index()].levels[level]
    }
}

// ------------------------------------------------------------------------------------------------
// Per-level scan state
// ------------------------------------------------------------------------------------------------

/// State of one level's participation in the merge.
#[derive(Debug)]
pub(crate) enum LevelState {
    /// The level needs its iterator invoked; nothing to peek yet.
    Load,

    /// Index block refined; the first data-block read is in flight.
    Next,

    /// A data block is loaded and the cursor walks its in-range values.
    Current(Cursor),

    /// No further in-range values on this level, ever.
    Eof,
}

pub(crate) struct LevelScan {
    pub iterator: LevelIterator,
    pub state: LevelState,
}

// ------------------------------------------------------------------------------------------------
// Scan driver
// ------------------------------------------------------------------------------------------------

/// Callback delivering one fetched value, the end-of-scan `None`, or a
/// storage error. Fired exactly once per `fetch`, never inside `fetch`'s
/// own frame.
pub type FetchCallback = Box<dyn FnOnce(Result<Option<Value>, ScanError>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Idle,
    Seeking,
    Fetching { pending: u32 },
}

/// One range scan over a tree.
///
/// Lifecycle: [`Scan::seek`] → any number of [`Scan::fetch`] /
/// [`Scan::on_completion`] rounds → [`Scan::reset`].
pub struct Scan {
    state: ScanState,
    snapshot: Snapshot,
    key_min: Vec<u8>,
    key_max: Vec<u8>,
    direction: Direction,
    buffer: Option<BufferId>,
    callback: Option<FetchCallback>,
    failure: Option<ScanError>,

    pub(crate) mutable_values: Vec<Value>,
    pub(crate) mutable_cursor: Cursor,
    pub(crate) immutable_values: Vec<Value>,
    pub(crate) immutable_cursor: Cursor,
    pub(crate) levels: Vec<LevelScan>,
}

impl Scan {
    pub fn new() -> Self {
        Self {
            state: ScanState::Idle,
            snapshot: 0,
            key_min: Vec::new(),
            key_max: Vec::new(),
            direction: Direction::Ascending,
            buffer: None,
            callback: None,
            failure: None,
            mutable_values: Vec::new(),
            mutable_cursor: Cursor::unset(),
            immutable_values: Vec::new(),
            immutable_cursor: Cursor::unset(),
            levels: Vec::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == ScanState::Idle
    }

    /// The snapshot this scan is pinned to (meaningful after `seek`).
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot
    }

    pub(crate) fn direction(&self) -> Direction {
        self.direction
    }

    pub(crate) fn buffer(&self) -> BufferId {
        self.buffer.expect("scan has no buffer")
    }

    // --------------------------------------------------------------------------------------------
    // seek
    // --------------------------------------------------------------------------------------------

    /// Pins the scan to `snapshot` and `[key_min, key_max]` in `direction`.
    ///
    /// Claims a buffer set, copies the in-range memtable windows into
    /// scan-owned storage, and arms one level iterator per LSM level. No
    /// I/O is issued until the first `fetch`.
    pub fn seek(
        &mut self,
        tree: &mut Tree,
        context: &mut ScanContext,
        snapshot: Snapshot,
        key_min: &[u8],
        key_max: &[u8],
        direction: Direction,
    ) {
        assert!(self.state == ScanState::Idle, "seek on a scan that is not idle");
        assert!(key_min <= key_max, "seek range is inverted");
        assert_eq!(context.level_count(), tree.level_count());

        let buffer = context.get_buffer();
        for index in 0..tree.level_count() {
            let slot = context.level_mut(buffer, index);
            slot.index.clear();
            slot.data.clear();
        }

        // Mutable table: copy the in-range window so later writes cannot
        // move under the scan.
        let values = tree.table_mutable.sort_into_values();
        let (start, count) = range_of(values, |v| v.key.as_slice(), key_min, key_max);
        self.mutable_values.clear();
        self.mutable_values.extend_from_slice(&values[start..start + count]);
        self.mutable_cursor = Cursor::new(0, count, direction);

        // Immutable table: participates only while populated and visible at
        // this snapshot.
        self.immutable_values.clear();
        let immutable = &tree.table_immutable;
        if !immutable.is_free() && immutable.snapshot_min() <= snapshot {
            let values = immutable.values();
            let (start, count) = range_of(values, |v| v.key.as_slice(), key_min, key_max);
            self.immutable_values
                .extend_from_slice(&values[start..start + count]);
            self.immutable_cursor = Cursor::new(0, count, direction);
        } else {
            self.immutable_cursor = Cursor::new(0, 0, direction);
        }

        self.levels = (0..tree.level_count())
            .map(|index| LevelScan {
                iterator: LevelIterator::new(index, snapshot),
                state: LevelState::Load,
            })
            .collect();

        self.snapshot = snapshot;
        self.key_min = key_min.to_vec();
        self.key_max = key_max.to_vec();
        self.direction = direction;
        self.buffer = Some(buffer);
        self.failure = None;
        self.state = ScanState::Seeking;

        debug!(
            snapshot,
            key_min = ?self.key_min,
            key_max = ?self.key_max,
            ?direction,
            "scan seeked"
        );
    }

    // --------------------------------------------------------------------------------------------
    // fetch
    // --------------------------------------------------------------------------------------------

    /// Requests the next value. `callback` fires exactly once — with
    /// `Ok(Some(value))`, the end-of-scan `Ok(None)`, or a storage error —
    /// and always from a later grid completion, never from this frame.
    pub fn fetch(
        &mut self,
        tree: &Tree,
        grid: &mut Grid,
        context: &ScanContext,
        callback: FetchCallback,
    ) {
        assert!(
            matches!(self.state, ScanState::Seeking),
            "fetch on a scan that is not seeking"
        );
        assert!(self.callback.is_none(), "fetch while a callback is pending");
        self.callback = Some(callback);
        self.fetch_begin(tree, grid, context);
    }

    /// Issues reads for every level in `Load`. Shared by the public `fetch`
    /// and the internal drained-merge retry.
    fn fetch_begin(&mut self, tree: &Tree, grid: &mut Grid, context: &ScanContext) {
        // Seed the counter with an epilogue guard so a completion cannot
        // observe zero while loads are still being issued.
        self.state = ScanState::Fetching { pending: 1 };

        for index in 0..self.levels.len() {
            if matches!(self.levels[index].state, LevelState::Load) {
                self.pending_add(1);
                self.level_issue(tree, grid, context, index);
            }
        }

        let pending = self.pending_sub(1);
        if pending == 0 {
            // No I/O was needed; the merge must still run outside the
            // caller's frame.
            grid.on_next_tick(self.tag(None));
        }
    }

    fn pending_add(&mut self, amount: u32) {
        let ScanState::Fetching { pending } = &mut self.state else {
            unreachable!("pending counter touched outside a fetch");
        };
        *pending += amount;
    }

    fn pending_sub(&mut self, amount: u32) -> u32 {
        let ScanState::Fetching { pending } = &mut self.state else {
            unreachable!("pending counter touched outside a fetch");
        };
        *pending -= amount;
        *pending
    }

    fn tag(&self, level: Option<u32>) -> ReadTag {
        ReadTag {
            buffer: self.buffer().index() as u32,
            level,
        }
    }

    /// Submits this level's next read, as decided by its iterator.
    fn level_issue(&mut self, tree: &Tree, grid: &mut Grid, context: &ScanContext, index: usize) {
        let buffer = self.buffer();
        let index_block = &context.level(buffer, index).index;
        let action = self.levels[index].iterator.next_action(
            &tree.manifest,
            index_block,
            &self.key_min,
            &self.key_max,
            self.direction,
        );
        let tag = ReadTag {
            buffer: buffer.index() as u32,
            level: Some(index as u32),
        };
        match action {
            LevelAction::ReadIndex { address, checksum } => {
                trace!(level = index, address, "index block read issued");
                grid.read_block(tag, address, checksum, BlockKind::Index);
            }
            LevelAction::ReadData { address, checksum } => {
                trace!(level = index, address, "data block read issued");
                grid.read_block(tag, address, checksum, BlockKind::Data);
            }
            LevelAction::Done => {
                trace!(level = index, "no further tables; end-of-level tick");
                grid.on_next_tick(tag);
            }
        }
    }

    // --------------------------------------------------------------------------------------------
    // Completion handling
    // --------------------------------------------------------------------------------------------

    /// Routes one grid completion into the scan. The event loop calls this
    /// for every completion carrying this scan's buffer id.
    pub fn on_completion(
        &mut self,
        tree: &Tree,
        grid: &mut Grid,
        context: &mut ScanContext,
        completion: Completion,
    ) {
        match completion {
            Completion::Read { tag, kind, result } => {
                self.assert_tag(tag);
                let level = tag.level.expect("block read completion without a level") as usize;
                match kind {
                    BlockKind::Index => self.on_index(tree, grid, context, level, result),
                    BlockKind::Data => self.on_data(tree, grid, context, level, result),
                }
            }
            Completion::Tick { tag } => {
                self.assert_tag(tag);
                match tag.level {
                    Some(level) => self.on_level_done(tree, grid, context, level as usize),
                    // The no-I/O epilogue wakeup: the pending counter is
                    // already at zero.
                    None => self.on_fetch(tree, grid, context),
                }
            }
        }
    }

    fn assert_tag(&self, tag: ReadTag) {
        assert_eq!(
            tag.buffer,
            self.buffer().index() as u32,
            "completion routed to the wrong scan"
        );
    }

    /// An index block arrived: copy it into the scan-owned slot, refine it
    /// to the in-range window, and chain into the window's first data read.
    fn on_index(
        &mut self,
        tree: &Tree,
        grid: &mut Grid,
        context: &mut ScanContext,
        level: usize,
        result: Result<Vec<u8>, GridError>,
    ) {
        debug_assert!(matches!(self.levels[level].state, LevelState::Load));

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(error) => return self.level_failed(tree, grid, context, level, error.into()),
        };
        let decoded: IndexBlock = match block::decode_block(&bytes) {
            Ok(block) => block,
            Err(error) => return self.level_failed(tree, grid, context, level, error.into()),
        };

        let buffer = self.buffer();
        context.level_mut(buffer, level).index = decoded;
        let index_block = &context.level(buffer, level).index;

        let in_range = self.levels[level].iterator.on_index_loaded(
            index_block,
            &self.key_min,
            &self.key_max,
            self.direction,
        );
        if !in_range {
            trace!(level, "index block refined to nothing");
            self.levels[level].state = LevelState::Eof;
            self.pending_done(tree, grid, context);
            return;
        }

        self.levels[level].state = LevelState::Next;
        // Chain straight into the first data block of the refined window;
        // the fetch's pending count carries over.
        self.level_issue(tree, grid, context, level);
    }

    /// A data block arrived: copy it in, advance the block window, and make
    /// the level current — or send it back to `Load` when the block holds
    /// nothing in range.
    fn on_data(
        &mut self,
        tree: &Tree,
        grid: &mut Grid,
        context: &mut ScanContext,
        level: usize,
        result: Result<Vec<u8>, GridError>,
    ) {
        debug_assert!(matches!(
            self.levels[level].state,
            LevelState::Load | LevelState::Next
        ));

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(error) => return self.level_failed(tree, grid, context, level, error.into()),
        };
        let decoded: DataBlock = match block::decode_block(&bytes) {
            Ok(block) => block,
            Err(error) => return self.level_failed(tree, grid, context, level, error.into()),
        };

        let buffer = self.buffer();
        context.level_mut(buffer, level).data = decoded;
        self.levels[level].iterator.block_consumed(self.direction);

        let values = context.level(buffer, level).data.values();
        let (start, count) = range_of(values, |v| v.key.as_slice(), &self.key_min, &self.key_max);
        if count == 0 {
            // The block's boundary key overlapped the range but none of its
            // values do. Back to Load; the merge will report Drained and the
            // fetch cycle re-enters.
            trace!(level, "data block held no in-range values");
            self.levels[level].state = LevelState::Load;
            self.pending_done(tree, grid, context);
            return;
        }

        trace!(level, in_range = count, "data block current");
        self.levels[level].state = LevelState::Current(Cursor::new(start, count, self.direction));
        self.pending_done(tree, grid, context);
    }

    /// The end-of-level wakeup fired: nothing further on this level.
    fn on_level_done(&mut self, tree: &Tree, grid: &mut Grid, context: &mut ScanContext, level: usize) {
        debug_assert!(matches!(self.levels[level].state, LevelState::Load));
        trace!(level, "level exhausted");
        self.levels[level].state = LevelState::Eof;
        self.pending_done(tree, grid, context);
    }

    /// Records the first storage failure and settles the level so the fetch
    /// round can finish and surface the error.
    fn level_failed(
        &mut self,
        tree: &Tree,
        grid: &mut Grid,
        context: &mut ScanContext,
        level: usize,
        error: ScanError,
    ) {
        warn!(level, %error, "level read failed");
        self.levels[level].state = LevelState::Eof;
        if self.failure.is_none() {
            self.failure = Some(error);
        }
        self.pending_done(tree, grid, context);
    }

    fn pending_done(&mut self, tree: &Tree, grid: &mut Grid, context: &mut ScanContext) {
        if self.pending_sub(1) == 0 {
            self.on_fetch(tree, grid, context);
        }
    }

    // --------------------------------------------------------------------------------------------
    // on_fetch: one merge step
    // --------------------------------------------------------------------------------------------

    /// All outstanding I/O of this fetch round has completed: run one merge
    /// step and either deliver through the callback or re-enter the fetch
    /// cycle for a drained stream.
    fn on_fetch(&mut self, tree: &Tree, grid: &mut Grid, context: &ScanContext) {
        self.state = ScanState::Seeking;

        if let Some(error) = self.failure.take() {
            let callback = self.callback.take().expect("fetch without a callback");
            callback(Err(error));
            return;
        }

        match self.merge_pop(context) {
            MergeStep::Item(value) => {
                trace!(key = ?value.key, "value delivered");
                let callback = self.callback.take().expect("fetch without a callback");
                callback(Ok(Some(value)));
            }
            MergeStep::Done => {
                debug!("scan complete");
                let callback = self.callback.take().expect("fetch without a callback");
                callback(Ok(None));
            }
            MergeStep::Drained => {
                // Some level needs another block before the merge can
                // decide. The caller's callback stays pending; this is the
                // scan's only internal loop.
                trace!("merge drained; fetch re-enters");
                self.fetch_begin(tree, grid, context);
            }
        }
    }

    // --------------------------------------------------------------------------------------------
    // reset
    // --------------------------------------------------------------------------------------------

    /// Returns the scan to `Idle`, discarding merge state. Must not be
    /// called with a fetch outstanding; delivered values that borrowed from
    /// scan buffers must no longer be held.
    ///
    /// The buffer set stays claimed until [`ScanContext::reset`].
    pub fn reset(&mut self) {
        assert!(
            matches!(self.state, ScanState::Seeking),
            "reset on a scan that is not seeking"
        );
        assert!(self.callback.is_none(), "reset with a fetch outstanding");

        self.state = ScanState::Idle;
        self.levels.clear();
        self.mutable_values.clear();
        self.immutable_values.clear();
        self.mutable_cursor = Cursor::unset();
        self.immutable_cursor = Cursor::unset();
        self.buffer = None;
        debug!("scan reset");
    }
}

impl Default for Scan {
    fn default() -> Self {
        Self::new()
    }
}
