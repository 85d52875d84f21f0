//! ScanContext pool discipline and concurrent scans sharing one context.

#[cfg(test)]
mod tests {
    use crate::cursor::Direction;
    use crate::grid::Completion;
    use crate::scan::{SCAN_MAX, Scan, ScanContext};
    use crate::scan::tests::helpers::*;

    // ----------------------------------------------------------------
    // Bump allocation
    // ----------------------------------------------------------------

    #[test]
    fn each_seek_claims_one_buffer_set() {
        let (mut tree, _grid, mut context) = fixture();
        assert_eq!(context.buffers_used(), 0);

        let mut scan = Scan::new();
        scan.seek(&mut tree, &mut context, 1, b"a", b"z", Direction::Ascending);
        assert_eq!(context.buffers_used(), 1);

        // Per-scan reset does not release the slot; only the context-wide
        // reset does.
        scan.reset();
        assert_eq!(context.buffers_used(), 1);

        context.reset();
        assert_eq!(context.buffers_used(), 0);
    }

    #[test]
    #[should_panic(expected = "pool exhausted")]
    fn pool_exhaustion_is_a_programmer_error() {
        let (mut tree, _grid, mut context) = fixture();
        for _ in 0..SCAN_MAX + 1 {
            let mut scan = Scan::new();
            scan.seek(&mut tree, &mut context, 1, b"a", b"z", Direction::Ascending);
        }
    }

    #[test]
    fn context_reset_makes_the_pool_reusable() {
        let (mut tree, mut grid, mut context) = fixture();
        tree.table_mutable.put(&b"k"[..], &b"v"[..]);

        for _ in 0..3 {
            for _ in 0..SCAN_MAX {
                let mut scan = Scan::new();
                scan.seek(&mut tree, &mut context, 1, b"a", b"z", Direction::Ascending);
                let records = collect_scan(&mut scan, &tree, &mut grid, &mut context);
                assert_eq!(records.len(), 1);
                scan.reset();
            }
            assert_eq!(context.buffers_used(), SCAN_MAX);
            context.reset();
        }
    }

    // ----------------------------------------------------------------
    // Two interleaved scans, one context
    // ----------------------------------------------------------------

    #[test]
    fn interleaved_scans_route_completions_by_buffer() {
        let (mut tree, mut grid, mut context) = fixture();
        install_level_table(&mut tree, &mut grid, 0, &[(b"a", b"1"), (b"b", b"2")]);
        install_level_table(&mut tree, &mut grid, 1, &[(b"c", b"3")]);

        let mut ascending = Scan::new();
        let mut descending = Scan::new();
        ascending.seek(&mut tree, &mut context, 1, b"a", b"z", Direction::Ascending);
        descending.seek(&mut tree, &mut context, 1, b"a", b"z", Direction::Descending);

        let slot_a = fetch_async(&mut ascending, &tree, &mut grid, &context);
        let slot_d = fetch_async(&mut descending, &tree, &mut grid, &context);

        // Route each completion to the scan its buffer id names.
        while slot_a.borrow().is_none() || slot_d.borrow().is_none() {
            let completion = grid.tick_one().expect("both scans stalled");
            let buffer = match &completion {
                Completion::Read { tag, .. } | Completion::Tick { tag } => tag.buffer,
            };
            if buffer == 0 {
                ascending.on_completion(&tree, &mut grid, &mut context, completion);
            } else {
                descending.on_completion(&tree, &mut grid, &mut context, completion);
            }
        }

        let first_up = slot_a.borrow_mut().take().unwrap().unwrap().unwrap();
        let first_down = slot_d.borrow_mut().take().unwrap().unwrap().unwrap();
        assert_eq!(first_up.key, b"a".to_vec());
        assert_eq!(first_down.key, b"c".to_vec());
        assert_eq!(context.buffers_used(), 2);
    }
}
