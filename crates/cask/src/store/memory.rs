//! In-memory [`Store`] implementation.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::sync::RwLock;

use super::{Store, StoreError};

/// A thread-safe in-memory key/value store.
///
/// Useful for tests and for hosts that persist the contents themselves after
/// an invocation (see [`MemoryStore::snapshot`]).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value directly from host code.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.into(), value.into());
        Ok(())
    }

    /// Copy out the current contents, ordered by key.
    pub fn snapshot(&self) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemoryStore {
    fn put(&self, key: &str, value: &mut dyn Read) -> Result<(), StoreError> {
        // Drain the stream first so a failed read never leaves a partial value.
        let mut data = Vec::new();
        value.read_to_end(&mut data)?;

        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), data);
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.contains_key(key))
    }

    fn get(&self, key: &str, sink: &mut dyn Write) -> Result<bool, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        match entries.get(key) {
            Some(data) => {
                sink.write_all(data)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io;

    use super::*;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("stream broke"))
        }
    }

    #[test]
    fn test_put_then_get() {
        let store = MemoryStore::new();
        store.put("k1", &mut "v1".as_bytes()).unwrap();

        let mut sink = Vec::new();
        assert!(store.get("k1", &mut sink).unwrap());
        assert_eq!(sink, b"v1");
    }

    #[test]
    fn test_get_missing_leaves_sink_empty() {
        let store = MemoryStore::new();

        let mut sink = Vec::new();
        assert!(!store.get("missing", &mut sink).unwrap());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_has() {
        let store = MemoryStore::new();
        assert!(!store.has("k").unwrap());

        store.insert("k", "v").unwrap();
        assert!(store.has("k").unwrap());
    }

    #[test]
    fn test_put_replaces_value() {
        let store = MemoryStore::new();
        store.put("k", &mut "old".as_bytes()).unwrap();
        store.put("k", &mut "new".as_bytes()).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot().unwrap()["k"], b"new");
    }

    #[test]
    fn test_failed_read_is_not_stored() {
        let store = MemoryStore::new();

        let result = store.put("k", &mut FailingReader);
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert!(!store.has("k").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_is_ordered() {
        let store = MemoryStore::new();
        store.insert("b", "2").unwrap();
        store.insert("a", "1").unwrap();

        let keys: Vec<_> = store.snapshot().unwrap().into_keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
