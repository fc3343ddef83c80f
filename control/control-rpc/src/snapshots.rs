//! Named in-memory byte snapshots (`SNAPSHOT`/`DIFF` commands). Snapshots
//! persist only for the process lifetime, per the control surface's
//! ownership rules.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct NamedSnapshot {
    pub memory_type: String,
    pub address: u32,
    pub length: u32,
    pub timestamp_ms: u64,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct SnapshotStore {
    snapshots: HashMap<String, NamedSnapshot>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture(&mut self, name: String, snapshot: NamedSnapshot) {
        self.snapshots.insert(name, snapshot);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NamedSnapshot> {
        self.snapshots.get(name)
    }

    #[must_use]
    pub fn list_names(&self) -> Vec<&str> {
        self.snapshots.keys().map(String::as_str).collect()
    }

    pub fn drop_snapshot(&mut self, name: &str) -> bool {
        self.snapshots.remove(name).is_some()
    }
}

/// A byte-for-byte diff between two equal-length snapshots: `(offset,
/// a_value, b_value)` for every differing byte.
pub fn diff(a: &NamedSnapshot, b: &NamedSnapshot) -> Result<Vec<(usize, u8, u8)>, String> {
    if a.bytes.len() != b.bytes.len() {
        return Err(format!(
            "snapshot length mismatch: {} vs {}",
            a.bytes.len(),
            b.bytes.len()
        ));
    }
    Ok(a.bytes
        .iter()
        .zip(b.bytes.iter())
        .enumerate()
        .filter(|(_, (x, y))| x != y)
        .map(|(i, (&x, &y))| (i, x, y))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(bytes: Vec<u8>) -> NamedSnapshot {
        NamedSnapshot { memory_type: "SnesMemory".to_string(), address: 0, length: bytes.len() as u32, timestamp_ms: 0, bytes }
    }

    #[test]
    fn capture_list_drop_round_trip() {
        let mut store = SnapshotStore::new();
        store.capture("a".to_string(), snap(vec![1, 2, 3]));
        assert_eq!(store.list_names(), vec!["a"]);
        assert!(store.get("a").is_some());
        assert!(store.drop_snapshot("a"));
        assert!(store.get("a").is_none());
    }

    #[test]
    fn diff_reports_differing_bytes() {
        let a = snap(vec![1, 2, 3, 4]);
        let b = snap(vec![1, 9, 3, 8]);
        assert_eq!(diff(&a, &b).unwrap(), vec![(1, 2, 9), (3, 4, 8)]);
    }

    #[test]
    fn diff_rejects_length_mismatch() {
        let a = snap(vec![1, 2, 3]);
        let b = snap(vec![1, 2]);
        assert!(diff(&a, &b).is_err());
    }
}
