//! Index Module
//!
//! Key → value mapping rebuilt from the log on open.
//!
//! ## Responsibilities
//! - Answer point lookups without touching disk
//! - Reflect every applied record (later records override earlier ones)
//! - Never hold tombstones: a deleted key is simply absent
//!
//! The storage engine only talks to the [`Index`] trait, so a persistent or
//! ordered implementation can replace [`MemIndex`] without touching callers.

mod memory;

pub use memory::MemIndex;

/// Key → value capability used by the storage engine
pub trait Index: Send {
    /// Current value for `key`, or `None` if absent
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Whether `key` currently has a value
    fn has(&self, key: &[u8]) -> bool;

    /// Insert or overwrite
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// Remove `key` if present
    fn delete(&mut self, key: &[u8]);

    /// Number of live keys
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a possibly-absent value: `None` removes the key
    fn apply(&mut self, key: Vec<u8>, value: Option<Vec<u8>>) {
        match value {
            Some(value) => self.put(key, value),
            None => self.delete(&key),
        }
    }
}
