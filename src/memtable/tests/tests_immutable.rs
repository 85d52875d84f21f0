//! Immutable memtable: free state and snapshot gating data.

#[cfg(test)]
mod tests {
    use crate::block::Value;
    use crate::memtable::ImmutableMemtable;

    #[test]
    fn free_table_exposes_nothing() {
        let table = ImmutableMemtable::free();
        assert!(table.is_free());
        assert!(table.values().is_empty());
    }

    #[test]
    fn install_freezes_a_sorted_run() {
        let table = ImmutableMemtable::install(
            vec![
                Value::put(&b"a"[..], &b"1"[..]),
                Value::tombstone(&b"b"[..]),
            ],
            7,
        );
        assert!(!table.is_free());
        assert_eq!(table.snapshot_min(), 7);
        assert_eq!(table.values().len(), 2);
    }

    #[test]
    fn release_returns_the_table_to_the_free_state() {
        let mut table =
            ImmutableMemtable::install(vec![Value::put(&b"a"[..], &b"1"[..])], 3);
        table.release();
        assert!(table.is_free());
        assert!(table.values().is_empty());
    }
}
