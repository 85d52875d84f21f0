//! Tree facade: freeze/flush plumbing and the blocking scan drivers.

#[cfg(test)]
mod tests {
    use crate::cursor::Direction;
    use crate::tree::tests::helpers::fixture;

    // ----------------------------------------------------------------
    // Write path: mutable → immutable → level 0
    // ----------------------------------------------------------------

    #[test]
    fn freeze_then_flush_lands_data_on_a_level() {
        let (mut tree, mut grid, mut context) = fixture();
        tree.table_mutable.put(&b"a"[..], &b"1"[..]);
        tree.table_mutable.put(&b"b"[..], &b"2"[..]);

        let frozen_at = tree.freeze_mutable();
        assert!(tree.table_mutable.is_empty());
        assert!(!tree.table_immutable.is_free());
        assert_eq!(tree.table_immutable.snapshot_min(), frozen_at);

        let info = tree
            .flush_immutable(&mut grid, 0)
            .unwrap()
            .expect("flushed table");
        assert!(tree.table_immutable.is_free());
        assert_eq!(info.key_min, b"a".to_vec());
        assert_eq!(info.key_max, b"b".to_vec());

        let snapshot = tree.snapshot_current();
        let live = tree
            .scan_live(&mut grid, &mut context, snapshot, b"a", b"z", Direction::Ascending)
            .unwrap();
        assert_eq!(
            live,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec())
            ]
        );
    }

    #[test]
    fn flush_of_an_empty_freeze_is_a_no_op() {
        let (mut tree, mut grid, _context) = fixture();
        tree.freeze_mutable();
        let flushed = tree.flush_immutable(&mut grid, 0).unwrap();
        assert!(flushed.is_none());
        assert!(tree.table_immutable.is_free());
        assert_eq!(tree.manifest.table_count(0), 0);
    }

    #[test]
    #[should_panic(expected = "awaiting flush")]
    fn freeze_over_an_occupied_immutable_panics() {
        let (mut tree, _grid, _context) = fixture();
        tree.table_mutable.put(&b"a"[..], &b"1"[..]);
        tree.freeze_mutable();
        tree.table_mutable.put(&b"b"[..], &b"2"[..]);
        tree.freeze_mutable();
    }

    // ----------------------------------------------------------------
    // scan_collect vs scan_live
    // ----------------------------------------------------------------

    #[test]
    fn scan_live_filters_what_scan_collect_reports() {
        let (mut tree, mut grid, mut context) = fixture();
        tree.table_mutable.put(&b"a"[..], &b"1"[..]);
        tree.table_mutable.delete(&b"b"[..]);
        tree.table_mutable.put(&b"c"[..], &b"3"[..]);

        let snapshot = tree.snapshot_current();
        let raw = tree
            .scan_collect(&mut grid, &mut context, snapshot, b"a", b"z", Direction::Ascending)
            .unwrap();
        assert_eq!(raw.len(), 3, "tombstone delivered by the raw scan");
        assert!(raw[1].tombstone);

        let live = tree
            .scan_live(&mut grid, &mut context, snapshot, b"a", b"z", Direction::Ascending)
            .unwrap();
        assert_eq!(
            live,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"c".to_vec(), b"3".to_vec())
            ]
        );
    }

    #[test]
    fn deleted_key_disappears_from_live_scans_across_layers() {
        let (mut tree, mut grid, mut context) = fixture();
        tree.table_mutable.put(&b"a"[..], &b"1"[..]);
        tree.table_mutable.put(&b"b"[..], &b"2"[..]);
        tree.freeze_mutable();
        tree.flush_immutable(&mut grid, 0).unwrap();

        tree.table_mutable.delete(&b"b"[..]);

        let snapshot = tree.snapshot_current();
        let live = tree
            .scan_live(&mut grid, &mut context, snapshot, b"a", b"z", Direction::Ascending)
            .unwrap();
        assert_eq!(live, vec![(b"a".to_vec(), b"1".to_vec())]);
    }
}
