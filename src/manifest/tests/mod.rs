mod tests_snapshots;
