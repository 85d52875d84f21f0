use tracing_subscriber::EnvFilter;

use crate::grid::Grid;
use crate::scan::ScanContext;
use crate::tree::{Tree, TreeConfig};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A two-level tree with small data blocks, plus its grid and scan context.
pub fn fixture() -> (Tree, Grid, ScanContext) {
    init_tracing();
    let config = TreeConfig {
        level_count: 2,
        block_value_count: 4,
    };
    let context = ScanContext::new(config.level_count);
    (Tree::new(config), Grid::new(), context)
}
