//! Log Writer
//!
//! Handles appending records to the log file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::SyncStrategy;
use crate::error::Result;

use super::Record;

/// Appends records to the log file
pub struct LogWriter {
    file: File,

    path: PathBuf,

    sync_strategy: SyncStrategy,

    /// Records appended since the last fsync
    unsynced: usize,

    /// Current end of the log
    offset: u64,
}

impl LogWriter {
    /// Open or create a log file for appending
    pub fn open(path: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            sync_strategy,
            unsynced: 0,
            offset,
        })
    }

    /// Append a record with a single write.
    ///
    /// Returns the number of bytes written. If the write fails the file is
    /// cut back to its previous length so a torn record never reaches replay.
    pub fn append(&mut self, record: &Record) -> Result<u64> {
        let bytes = record.encode();

        if let Err(e) = self.file.write_all(&bytes) {
            if let Err(trunc) = self.file.set_len(self.offset) {
                tracing::warn!("Failed to roll back torn append to {:?}: {}", self.path, trunc);
            }
            return Err(e.into());
        }
        self.offset += bytes.len() as u64;
        self.unsynced += 1;

        match self.sync_strategy {
            SyncStrategy::EveryWrite => self.sync()?,
            SyncStrategy::EveryNEntries { count } => {
                if self.unsynced >= count {
                    self.sync()?;
                }
            }
        }

        Ok(bytes.len() as u64)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Current size of the log in bytes
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
