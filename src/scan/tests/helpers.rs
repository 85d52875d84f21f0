use std::cell::RefCell;
use std::rc::Rc;

use tracing_subscriber::EnvFilter;

use crate::block::Value;
use crate::grid::Grid;
use crate::manifest::TableInfo;
use crate::scan::{Scan, ScanContext, ScanError};
use crate::tree::{TableBuilder, Tree, TreeConfig};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Levels in every test fixture.
pub const LEVEL_COUNT: usize = 3;

/// Values per data block unless a test packs blocks explicitly.
pub const BLOCK_VALUE_COUNT: usize = 4;

/// A fresh tree, grid, and scan context sharing [`LEVEL_COUNT`] levels.
pub fn fixture() -> (Tree, Grid, ScanContext) {
    init_tracing();
    let tree = Tree::new(TreeConfig {
        level_count: LEVEL_COUNT,
        block_value_count: BLOCK_VALUE_COUNT,
    });
    (tree, Grid::new(), ScanContext::new(LEVEL_COUNT))
}

/// Installs `values` (sorted ascending) as one table on `level`, visible
/// from snapshot 1, packed `block_value_count` values per data block.
pub fn install_level_values(
    tree: &mut Tree,
    grid: &mut Grid,
    level: usize,
    values: Vec<Value>,
    block_value_count: usize,
) -> TableInfo {
    let mut builder = TableBuilder::new(block_value_count);
    for value in values {
        builder.push(value);
    }
    builder
        .commit(grid, &mut tree.manifest, level, 1)
        .expect("table commit")
}

/// Installs live `(key, value)` pairs as one table on `level`.
pub fn install_level_table(
    tree: &mut Tree,
    grid: &mut Grid,
    level: usize,
    entries: &[(&[u8], &[u8])],
) -> TableInfo {
    let values = entries
        .iter()
        .map(|(key, value)| Value::put(*key, *value))
        .collect();
    install_level_values(tree, grid, level, values, BLOCK_VALUE_COUNT)
}

/// Where one in-flight fetch deposits its result.
pub type FetchSlot = Rc<RefCell<Option<Result<Option<Value>, ScanError>>>>;

/// Starts a fetch whose callback fills the returned slot.
pub fn fetch_async(
    scan: &mut Scan,
    tree: &Tree,
    grid: &mut Grid,
    context: &ScanContext,
) -> FetchSlot {
    let slot: FetchSlot = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&slot);
    scan.fetch(
        tree,
        grid,
        context,
        Box::new(move |result| {
            *sink.borrow_mut() = Some(result);
        }),
    );
    slot
}

/// Pumps grid completions into the scan until `slot` is filled.
pub fn pump_until_delivered(
    scan: &mut Scan,
    tree: &Tree,
    grid: &mut Grid,
    context: &mut ScanContext,
    slot: &FetchSlot,
) -> Result<Option<Value>, ScanError> {
    loop {
        if let Some(result) = slot.borrow_mut().take() {
            return result;
        }
        let completion = grid.tick_one().expect("scan stalled with no pending I/O");
        scan.on_completion(tree, grid, context, completion);
    }
}

/// One full fetch round: start, pump, return the delivered result.
pub fn fetch_blocking(
    scan: &mut Scan,
    tree: &Tree,
    grid: &mut Grid,
    context: &mut ScanContext,
) -> Result<Option<Value>, ScanError> {
    let slot = fetch_async(scan, tree, grid, context);
    pump_until_delivered(scan, tree, grid, context, &slot)
}

/// Collects a whole scan through repeated fetches, tombstones included.
pub fn collect_scan(
    scan: &mut Scan,
    tree: &Tree,
    grid: &mut Grid,
    context: &mut ScanContext,
) -> Vec<Value> {
    let mut records = Vec::new();
    loop {
        match fetch_blocking(scan, tree, grid, context).expect("fetch") {
            Some(value) => records.push(value),
            None => break,
        }
    }
    records
}

/// The keys of a record run.
pub fn keys_of(records: &[Value]) -> Vec<Vec<u8>> {
    records.iter().map(|value| value.key.clone()).collect()
}
