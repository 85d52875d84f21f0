//! # AevumDB
//!
//! The **range-scan core of an LSM-tree storage engine**: snapshot-consistent
//! range scans merged across the in-memory tables and every on-disk level,
//! delivered one value at a time through a caller-driven pull loop on a
//! single-threaded event loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                           Scan                                │
//! │   ┌───────────┐  ┌────────────┐  ┌─────────────────────────┐  │
//! │   │  Mutable  │  │ Immutable  │  │  LevelScan × L          │  │
//! │   │  memtable │  │ memtable   │  │  (manifest walk +       │  │
//! │   │  cursor   │  │ cursor     │  │   block walk per level) │  │
//! │   └─────┬─────┘  └─────┬──────┘  └──────────┬──────────────┘  │
//! │         └──────────────┴───────┬────────────┘                 │
//! │                    k-way merge (newest generation wins)       │
//! │                                │                              │
//! │   fetch(cb) ───────────────────┴────────► cb(Some(value))     │
//! └───────────────────────────────┬───────────────────────────────┘
//! │        Manifest (snapshot-consistent table authority)         │
//! │        Grid (asynchronous, checksummed block storage)         │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`scan`] | Seek/fetch driver, per-level state machines, buffer pool, k-way merge |
//! | [`cursor`] | Cursors over sorted slices and the range searches that place them |
//! | [`block`] | Value, index-block, and data-block layout with CRC32 integrity |
//! | [`grid`] | Asynchronous block storage: reads and wakeups complete via an event loop |
//! | [`manifest`] | Which tables exist per level at each snapshot |
//! | [`memtable`] | Mutable and immutable in-memory tables |
//! | [`tree`] | Facade bundling the collaborators, plus blocking scan drivers |
//!
//! ## Key Guarantees
//!
//! - **Order** — values arrive strictly in key order, ascending or
//!   descending as requested, ties resolved newest-generation-first.
//! - **Snapshot isolation** — a scan pinned to a snapshot is unaffected by
//!   concurrent flushes and compactions.
//! - **One callback per fetch** — every `fetch` produces exactly one
//!   callback, asynchronously; end-of-scan is a single `None`.
//! - **Bounded memory** — a scan holds one index block and one data block
//!   per level, from a fixed shared pool, regardless of table count.
//! - **Integrity** — every block read is verified against its CRC32 before
//!   the scan touches it.
//!
//! ## Quick Start
//!
//! ```rust
//! use aevumdb::block::Value;
//! use aevumdb::cursor::Direction;
//! use aevumdb::grid::Grid;
//! use aevumdb::scan::ScanContext;
//! use aevumdb::tree::{TableBuilder, Tree, TreeConfig};
//!
//! let mut grid = Grid::new();
//! let mut tree = Tree::new(TreeConfig { level_count: 2, ..TreeConfig::default() });
//! let mut context = ScanContext::new(2);
//!
//! // A table on level 0...
//! let mut builder = TableBuilder::new(4);
//! builder.push(Value::put(b"apple", b"red"));
//! builder.push(Value::put(b"pear", b"green"));
//! builder.commit(&mut grid, &mut tree.manifest, 0, 1).unwrap();
//!
//! // ...and a fresher write in the memtable.
//! tree.table_mutable.put(b"apple", b"golden");
//!
//! let snapshot = tree.snapshot_current();
//! let live = tree
//!     .scan_live(&mut grid, &mut context, snapshot, b"a", b"z", Direction::Ascending)
//!     .unwrap();
//!
//! // The memtable's "apple" shadows the level's.
//! assert_eq!(live.len(), 2);
//! assert_eq!(live[0], (b"apple".to_vec(), b"golden".to_vec()));
//! assert_eq!(live[1], (b"pear".to_vec(), b"green".to_vec()));
//! ```

pub mod block;
pub mod cursor;
pub mod grid;
pub mod manifest;
pub mod memtable;
pub mod scan;
pub mod tree;
