//! Log-structured storage engine
//!
//! One append-only log file plus an in-memory index of current values.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, TideError};
use crate::index::{Index, MemIndex};
use crate::log::{replay, Entry, LogReader, LogWriter, Record, ReplayStats, MAX_FIELD_LEN};

use super::Storage;

/// Append-only log + index
///
/// The log is authoritative: a record is appended (and synced per the
/// configured strategy) before the index changes, so a failed write leaves
/// the index untouched.
pub struct LogStorage<I = MemIndex> {
    path: PathBuf,

    /// `None` once closed
    writer: Option<LogWriter>,

    index: I,

    /// Largest key or value accepted, never above `MAX_FIELD_LEN`
    max_entry_size: usize,

    /// What the opening replay found
    replay_stats: ReplayStats,
}

impl LogStorage<MemIndex> {
    /// Open or create a log with the default in-memory index
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_with_index(config, MemIndex::new())
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified log file
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().path(path).build();
        Self::open(&config)
    }

    /// Check a log file without opening it for append
    pub fn verify(path: &Path) -> Result<ReplayStats> {
        let mut reader = LogReader::open(path)?;
        replay(&mut reader, |_| {})
    }
}

impl<I: Index> LogStorage<I> {
    /// Open or create a log, rebuilding `index` from it.
    ///
    /// On startup:
    /// 1. Create the parent directory and file if missing
    /// 2. Replay every record into the index
    /// 3. Keep the file open for appends
    pub fn open_with_index(config: &Config, mut index: I) -> Result<Self> {
        let path = config.path.clone();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Opening the writer creates the file when absent
        let writer = LogWriter::open(&path, config.sync_strategy)?;

        let mut reader = LogReader::open(&path)?;
        let replay_stats = replay(&mut reader, |entry| index.apply(entry.key, entry.value))?;

        tracing::info!(
            "Opened log {:?}: {} records, {} entries, {} bytes replayed, {} live keys",
            path,
            replay_stats.records,
            replay_stats.entries,
            replay_stats.bytes,
            index.len()
        );

        Ok(Self {
            path,
            writer: Some(writer),
            index,
            max_entry_size: config.max_entry_size.min(MAX_FIELD_LEN),
            replay_stats,
        })
    }

    /// Statistics from the replay performed by `open`
    pub fn replay_stats(&self) -> ReplayStats {
        self.replay_stats
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes in the log, or `None` once closed
    pub fn log_size(&self) -> Option<u64> {
        self.writer.as_ref().map(LogWriter::offset)
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Reject a key or value the log cannot (or may not) encode
    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.max_entry_size {
            return Err(TideError::EntryTooLarge {
                len,
                limit: self.max_entry_size,
            });
        }
        Ok(())
    }

    /// Append one record, then apply it to the index
    fn append(&mut self, record: Record) -> Result<()> {
        for entry in record.entries() {
            self.check_len(entry.key.len())?;
            if let Some(value) = &entry.value {
                self.check_len(value.len())?;
            }
        }

        let writer = self.writer.as_mut().ok_or(TideError::StorageClosed)?;
        writer.append(&record)?;

        for entry in record.into_entries() {
            self.index.apply(entry.key, entry.value);
        }
        Ok(())
    }
}

impl<I: Index> Storage for LogStorage<I> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.is_closed() {
            return Err(TideError::StorageClosed);
        }
        Ok(self.index.get(key))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.append(Record::single(Entry::put(key, value)))
    }

    fn put_batch(&mut self, entries: Vec<Entry>) -> Result<()> {
        self.append(Record::batch(entries))
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.append(Record::single(Entry::tombstone(key)))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.sync()?;
            tracing::info!("Closed log {:?} at {} bytes", self.path, writer.offset());
        }
        Ok(())
    }
}
