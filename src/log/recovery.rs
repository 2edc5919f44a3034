//! Log Replay
//!
//! Rebuilds state by applying every record in append order.

use std::io::Read;

use crate::error::Result;

use super::{Entry, LogReader};

/// Result of a replay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records successfully read
    pub records: u64,

    /// Entries applied (a batch record contributes one per key)
    pub entries: u64,

    /// Bytes of valid log consumed
    pub bytes: u64,
}

/// Replay every record, feeding entries to `apply` in order.
///
/// Stops successfully at a clean end of log. Any corrupt or truncated record
/// fails the whole replay: nothing after it is trusted and no repair is
/// attempted. Entries from records before the fault have already been handed
/// to `apply`, so callers must discard their state on error.
pub fn replay<R, F>(reader: &mut LogReader<R>, mut apply: F) -> Result<ReplayStats>
where
    R: Read,
    F: FnMut(Entry),
{
    let mut stats = ReplayStats::default();

    loop {
        let record = match reader.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(
                    "Log replay stopped after {} records ({} bytes): {}",
                    stats.records,
                    reader.offset(),
                    e
                );
                return Err(e);
            }
        };

        stats.records += 1;
        for entry in record.into_entries() {
            stats.entries += 1;
            apply(entry);
        }
    }

    stats.bytes = reader.offset();
    Ok(stats)
}
