use std::collections::HashMap;
use std::sync::Mutex;

use relgate_core::{RecordKind, StoreError};

use crate::traits::LogStore;

/// In-memory log for tests. Not durable, but good for unit/small scenario tests.
#[derive(Default)]
pub struct InMemoryLogStore {
    inner: Mutex<HashMap<RecordKind, Vec<String>>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for InMemoryLogStore {
    fn append_line(&self, kind: RecordKind, line: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Unavailable("in-memory log poisoned".into()))?;
        let partition = inner.entry(kind).or_default();
        partition.push(line.to_string());
        Ok(partition.len() as u64)
    }

    fn read_lines(&self, kind: RecordKind) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Unavailable("in-memory log poisoned".into()))?;
        Ok(inner.get(&kind).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::LogStoreExt;
    use relgate_core::{CheckDetail, GateRecord, HealthRecord, SessionId, ValidationRecord};

    #[test]
    fn test_new_store_is_empty() {
        let store = InMemoryLogStore::new();
        for kind in RecordKind::ALL {
            assert_eq!(store.count(kind).unwrap(), 0);
        }
    }

    #[test]
    fn test_append_and_read_in_order() {
        let store = InMemoryLogStore::new();
        let a = ValidationRecord::new("pre_release", "3.6.0", 0, vec![CheckDetail::pass("a")]);
        let b = ValidationRecord::new("post_release", "3.6.0", 1, vec![CheckDetail::fail("b", "x")]);
        assert_eq!(store.append(&a).unwrap(), 1);
        assert_eq!(store.append(&b).unwrap(), 2);
        let all: Vec<ValidationRecord> = store.read_all().unwrap();
        assert_eq!(all, vec![a, b]);
    }

    #[test]
    fn test_partitions_are_separate() {
        let store = InMemoryLogStore::new();
        store.append(&ValidationRecord::new("s", "1.0.0", 0, vec![])).unwrap();
        store.append(&HealthRecord::new(SessionId::new("s1"), vec![])).unwrap();
        assert_eq!(store.count(RecordKind::Validation).unwrap(), 1);
        assert_eq!(store.count(RecordKind::Health).unwrap(), 1);
        assert_eq!(store.count(RecordKind::Gate).unwrap(), 0);
    }

    #[test]
    fn test_read_latest_returns_last_match() {
        let store = InMemoryLogStore::new();
        store.append(&ValidationRecord::new("s", "3.5.0", 0, vec![])).unwrap();
        store.append(&ValidationRecord::new("s", "3.6.0", 1, vec![])).unwrap();
        store.append(&ValidationRecord::new("s", "3.6.0", 0, vec![])).unwrap();
        store.append(&ValidationRecord::new("other", "3.6.0", 9, vec![])).unwrap();
        let latest: ValidationRecord = store
            .read_latest(|r: &ValidationRecord| r.script_name == "s" && r.subject_version == "3.6.0")
            .unwrap()
            .unwrap();
        assert_eq!(latest.exit_code, 0);
    }

    #[test]
    fn test_corrupt_line_fails_loudly() {
        let store = InMemoryLogStore::new();
        store.append_line(RecordKind::Validation, "{not json").unwrap();
        let err = store.read_all::<ValidationRecord>().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { line: 1, .. }));
    }

    #[test]
    fn test_kind_mismatch_is_detected() {
        let store = InMemoryLogStore::new();
        let health = serde_json::to_string(&HealthRecord::new(SessionId::new("s"), vec![])).unwrap();
        // a health line placed in the gate partition must not be read as a gate record
        store.append_line(RecordKind::Gate, &health).unwrap();
        let err = store.read_all::<GateRecord>().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. } | StoreError::KindMismatch { .. }));
    }
}
