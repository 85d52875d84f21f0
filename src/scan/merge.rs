//! K-way merge over the scan's streams.
//!
//! Streams are ordered newest generation first: the mutable memtable, the
//! immutable memtable, then level 0 through level L−1. The merge pops the
//! extreme key in scan direction; on key ties the earliest stream wins,
//! which is exactly generation precedence, and the equal keys of every older
//! stream are drained so a key is delivered at most once.
//!
//! A pop only commits once **every** stream can be peeked: a single drained
//! level could be hiding the true next key, so the whole step yields
//! [`MergeStep::Drained`] and the scan re-enters its fetch cycle.
//!
//! Tombstones are not filtered here — they merge and shadow like any other
//! value, and callers resolve visibility.

use tracing::trace;

use crate::block::Value;
use crate::cursor::Direction;

use super::{LevelState, Scan, ScanContext};

// ------------------------------------------------------------------------------------------------
// Merge step results
// ------------------------------------------------------------------------------------------------

/// Outcome of one merge step.
pub(crate) enum MergeStep {
    /// The next value in scan order.
    Item(Value),

    /// Every stream is exhausted; the scan is complete.
    Done,

    /// Some stream awaits an I/O completion; retry after servicing it.
    Drained,
}

/// What one stream shows the merge.
enum Peek<'a> {
    Key(&'a [u8]),
    Empty,
    Drained,
}

// ------------------------------------------------------------------------------------------------
// Merge over Scan streams
// ------------------------------------------------------------------------------------------------

impl Scan {
    const STREAM_MUTABLE: usize = 0;
    const STREAM_IMMUTABLE: usize = 1;
    const STREAM_LEVEL_BASE: usize = 2;

    fn stream_count(&self) -> usize {
        Self::STREAM_LEVEL_BASE + self.levels.len()
    }

    /// Current key of one stream, or why there is none.
    ///
    /// Memtable streams never perform I/O, so an exhausted window is simply
    /// `Empty`. A level reports `Drained` while in `Load` or `Next`; peeked
    /// keys come from the loaded data block's values, never from index
    /// boundary keys.
    fn peek<'a>(&'a self, context: &'a ScanContext, stream: usize) -> Peek<'a> {
        match stream {
            Self::STREAM_MUTABLE => match self.mutable_cursor.get(&self.mutable_values) {
                Some(value) => Peek::Key(&value.key),
                None => Peek::Empty,
            },
            Self::STREAM_IMMUTABLE => match self.immutable_cursor.get(&self.immutable_values) {
                Some(value) => Peek::Key(&value.key),
                None => Peek::Empty,
            },
            _ => {
                let level = stream - Self::STREAM_LEVEL_BASE;
                match &self.levels[level].state {
                    LevelState::Eof => Peek::Empty,
                    LevelState::Load | LevelState::Next => Peek::Drained,
                    LevelState::Current(cursor) => {
                        let values = context.level(self.buffer(), level).data.values();
                        match cursor.get(values) {
                            Some(value) => Peek::Key(&value.key),
                            None => unreachable!("current level cursor without a value"),
                        }
                    }
                }
            }
        }
    }

    /// Pops the current value of `stream` and advances it. A level whose
    /// data-block cursor exhausts transitions to `Load` so the next fetch
    /// round reloads it.
    fn pop_stream(&mut self, context: &ScanContext, stream: usize) -> Value {
        match stream {
            Self::STREAM_MUTABLE => {
                let value = self
                    .mutable_cursor
                    .get(&self.mutable_values)
                    .cloned()
                    .expect("popping an empty mutable stream");
                self.mutable_cursor.advance(self.direction());
                value
            }
            Self::STREAM_IMMUTABLE => {
                let value = self
                    .immutable_cursor
                    .get(&self.immutable_values)
                    .cloned()
                    .expect("popping an empty immutable stream");
                self.immutable_cursor.advance(self.direction());
                value
            }
            _ => {
                let level = stream - Self::STREAM_LEVEL_BASE;
                let buffer = self.buffer();
                let direction = self.direction();
                let (value, exhausted) = {
                    let LevelState::Current(cursor) = &mut self.levels[level].state else {
                        unreachable!("popping a level that is not current")
                    };
                    let values = context.level(buffer, level).data.values();
                    let value = match cursor.get(values) {
                        Some(value) => value.clone(),
                        None => unreachable!("current level cursor without a value"),
                    };
                    let more = cursor.advance(direction);
                    (value, !more)
                };
                if exhausted {
                    self.levels[level].state = LevelState::Load;
                }
                value
            }
        }
    }

    /// One merge step: peek every stream, pick the winner, drain ties.
    pub(crate) fn merge_pop(&mut self, context: &ScanContext) -> MergeStep {
        let mut winner: Option<usize> = None;
        for stream in 0..self.stream_count() {
            match self.peek(context, stream) {
                Peek::Drained => return MergeStep::Drained,
                Peek::Empty => {}
                Peek::Key(key) => {
                    let wins = match winner {
                        None => true,
                        Some(current) => {
                            let Peek::Key(current_key) = self.peek(context, current) else {
                                unreachable!("winner stream stopped peeking")
                            };
                            match self.direction() {
                                Direction::Ascending => key < current_key,
                                Direction::Descending => key > current_key,
                            }
                        }
                    };
                    if wins {
                        winner = Some(stream);
                    }
                }
            }
        }

        let Some(winner) = winner else {
            return MergeStep::Done;
        };
        let value = self.pop_stream(context, winner);

        // Older generations may carry the same key; drain them so the key is
        // delivered exactly once, from its newest generation. Streams before
        // the winner cannot tie: they would have won.
        for stream in winner + 1..self.stream_count() {
            let shadowed = matches!(
                self.peek(context, stream),
                Peek::Key(key) if key == value.key.as_slice()
            );
            if shadowed {
                let dropped = self.pop_stream(context, stream);
                trace!(key = ?dropped.key, stream, "shadowed value dropped");
            }
        }

        MergeStep::Item(value)
    }
}
