//! Mutable memtable: sorted views, overwrites, tombstones.

#[cfg(test)]
mod tests {
    use crate::memtable::Memtable;

    #[test]
    fn sort_into_values_is_sorted_regardless_of_insert_order() {
        let mut table = Memtable::new();
        table.put(&b"d"[..], &b"4"[..]);
        table.put(&b"a"[..], &b"1"[..]);
        table.put(&b"c"[..], &b"3"[..]);
        table.put(&b"b"[..], &b"2"[..]);

        let keys: Vec<&[u8]> = table
            .sort_into_values()
            .iter()
            .map(|v| v.key.as_slice())
            .collect();
        assert_eq!(keys, vec![b"a", b"b", b"c", b"d"]);
    }

    #[test]
    fn overwrite_keeps_one_entry_with_the_latest_value() {
        let mut table = Memtable::new();
        table.put(&b"k"[..], &b"v1"[..]);
        table.put(&b"k"[..], &b"v2"[..]);

        let values = table.sort_into_values();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, b"v2".to_vec());
    }

    #[test]
    fn delete_replaces_a_put_with_a_tombstone() {
        let mut table = Memtable::new();
        table.put(&b"k"[..], &b"v"[..]);
        table.delete(&b"k"[..]);

        let values = table.sort_into_values();
        assert_eq!(values.len(), 1);
        assert!(values[0].tombstone);
    }

    #[test]
    fn sorted_view_refreshes_after_mutation() {
        let mut table = Memtable::new();
        table.put(&b"b"[..], &b"2"[..]);
        assert_eq!(table.sort_into_values().len(), 1);

        table.put(&b"a"[..], &b"1"[..]);
        let keys: Vec<&[u8]> = table
            .sort_into_values()
            .iter()
            .map(|v| v.key.as_slice())
            .collect();
        assert_eq!(keys, vec![b"a", b"b"]);
    }

    #[test]
    fn drain_sorted_empties_the_table() {
        let mut table = Memtable::new();
        table.put(&b"b"[..], &b"2"[..]);
        table.put(&b"a"[..], &b"1"[..]);

        let drained = table.drain_sorted();
        assert_eq!(drained.len(), 2);
        assert!(drained[0].key < drained[1].key);
        assert!(table.is_empty());
        assert!(table.sort_into_values().is_empty());
    }
}
