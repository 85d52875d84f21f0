//! Snapshot visibility: supersede semantics and pinned-view stability.

#[cfg(test)]
mod tests {
    use crate::cursor::Direction;
    use crate::manifest::{Manifest, SNAPSHOT_LATEST, TableInfo};

    fn table(address: u64, key_min: &[u8], key_max: &[u8], snapshot_min: u64) -> TableInfo {
        TableInfo {
            address,
            checksum: 0,
            key_min: key_min.to_vec(),
            key_max: key_max.to_vec(),
            snapshot_min,
            snapshot_max: SNAPSHOT_LATEST,
        }
    }

    #[test]
    fn table_invisible_before_its_snapshot_min() {
        let mut manifest = Manifest::new(1);
        manifest.insert_table(0, table(1, b"a", b"z", 10));

        assert!(
            manifest
                .next_table(0, 9, b"a", b"z", None, Direction::Ascending)
                .is_none()
        );
        assert!(
            manifest
                .next_table(0, 10, b"a", b"z", None, Direction::Ascending)
                .is_some()
        );
    }

    #[test]
    fn superseded_table_vanishes_from_latest_but_not_from_pinned_snapshots() {
        let mut manifest = Manifest::new(1);
        manifest.insert_table(0, table(1, b"a", b"z", 1));

        manifest.supersede_table(0, 1, 20);

        // Pinned below the supersede point: still visible.
        assert!(
            manifest
                .next_table(0, 19, b"a", b"z", None, Direction::Ascending)
                .is_some()
        );
        // At or past it, and at latest: gone.
        assert!(
            manifest
                .next_table(0, 20, b"a", b"z", None, Direction::Ascending)
                .is_none()
        );
        assert!(
            manifest
                .next_table(0, SNAPSHOT_LATEST, b"a", b"z", None, Direction::Ascending)
                .is_none()
        );
    }

    #[test]
    fn compaction_style_replacement_keeps_old_snapshot_view_intact() {
        let mut manifest = Manifest::new(1);
        manifest.insert_table(0, table(1, b"a", b"m", 1));
        manifest.insert_table(0, table(2, b"n", b"z", 1));

        // A "compaction" at snapshot 30 replaces both with one merged table.
        manifest.supersede_table(0, 1, 30);
        manifest.supersede_table(0, 2, 30);
        manifest.insert_table(0, table(3, b"a", b"z", 30));

        // A scan pinned at snapshot 10 still walks the two old tables.
        let first = manifest
            .next_table(0, 10, b"a", b"z", None, Direction::Ascending)
            .unwrap();
        assert_eq!(first.address, 1);
        let second = manifest
            .next_table(0, 10, b"a", b"z", Some(b"m".as_slice()), Direction::Ascending)
            .unwrap();
        assert_eq!(second.address, 2);

        // The live view sees only the merged table.
        let live = manifest
            .next_table(0, SNAPSHOT_LATEST, b"a", b"z", None, Direction::Ascending)
            .unwrap();
        assert_eq!(live.address, 3);
        assert!(
            manifest
                .next_table(0, SNAPSHOT_LATEST, b"a", b"z", Some(b"z".as_slice()), Direction::Ascending)
                .is_none()
        );
    }

    #[test]
    #[should_panic(expected = "already superseded")]
    fn double_supersede_is_a_programmer_error() {
        let mut manifest = Manifest::new(1);
        manifest.insert_table(0, table(1, b"a", b"z", 1));
        manifest.supersede_table(0, 1, 5);
        manifest.supersede_table(0, 1, 6);
    }
}
