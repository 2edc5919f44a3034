//! Append-Only Log Module
//!
//! The on-disk half of the storage engine: a flat sequence of checksummed
//! records. There is no file header, footer, or index section; the full state
//! is rebuilt by replaying every record on open.
//!
//! ## Responsibilities
//! - Encode single puts/deletes and multi-entry batches as one record each
//! - CRC32 checksum over every payload
//! - Append with a single write per record, synced per [`SyncStrategy`]
//! - Replay with strict corruption detection (no auto-repair)
//!
//! ## Record Format (all integers big-endian)
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (13 bytes)                                        │
//! │   CRC32: u32 (4) | Timestamp: i64 (8) | Kind: u8 (1)     │
//! ├──────────────────────────────────────────────────────────┤
//! │ Payload, Kind = 0 (single)                               │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                 │
//! ├──────────────────────────────────────────────────────────┤
//! │ Payload, Kind = 1 (multi)                                │
//! │   [Count: u32] then Count single payloads back to back   │
//! └──────────────────────────────────────────────────────────┘
//! ValLen = u32::MAX marks a tombstone and carries no value bytes,
//! so an empty value (ValLen = 0) is never confused with a delete.
//! ```
//!
//! [`SyncStrategy`]: crate::config::SyncStrategy

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{Entry, Record, RecordBody, RecordKind, HEADER_SIZE, MAX_FIELD_LEN};
pub use reader::LogReader;
pub use recovery::{replay, ReplayStats};
pub use writer::LogWriter;
