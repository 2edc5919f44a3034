//! In-memory index
//!
//! BTreeMap-based exact mapping. Ordered so iteration is deterministic.

use std::collections::BTreeMap;

use super::Index;

/// Exact in-memory key → value map
#[derive(Debug, Default, Clone)]
pub struct MemIndex {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,

    /// Approximate size of live keys and values in bytes
    size: usize,
}

impl MemIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Approximate size of live keys and values in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Iterate live entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }
}

impl Index for MemIndex {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn has(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        let added = key.len() + value.len();
        let key_len = key.len();
        if let Some(old) = self.entries.insert(key, value) {
            self.size -= key_len + old.len();
        }
        self.size += added;
    }

    fn delete(&mut self, key: &[u8]) {
        if let Some(old) = self.entries.remove(key) {
            self.size -= key.len() + old.len();
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
