//! Volatile storage
//!
//! Same contract as [`LogStorage`](super::LogStorage) with no file behind it.
//! Handy for exercising the transaction managers in isolation.

use crate::error::{Result, TideError};
use crate::index::{Index, MemIndex};
use crate::log::Entry;

use super::Storage;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    index: MemIndex,
    closed: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(TideError::StorageClosed);
        }
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self.index.get(key))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_open()?;
        self.index.put(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn put_batch(&mut self, entries: Vec<Entry>) -> Result<()> {
        self.check_open()?;
        for entry in entries {
            self.index.apply(entry.key, entry.value);
        }
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.check_open()?;
        self.index.delete(key);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
