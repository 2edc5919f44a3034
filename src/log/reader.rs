//! Log Reader
//!
//! Streams records out of a log file, validating each checksum.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use bytes::Buf;

use crate::error::{Result, TideError};

use super::entry::{decode_body, Entry, RecordHeader, COUNT_SIZE, ENTRY_PREFIX_SIZE};
use super::{Record, RecordKind, HEADER_SIZE};

/// Reads records sequentially from the start of a log
pub struct LogReader<R> {
    reader: R,

    /// Byte offset of the next unread record
    offset: u64,

    /// Set after the first error; the reader yields nothing afterwards
    failed: bool,
}

impl LogReader<BufReader<File>> {
    /// Open a log file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> LogReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            failed: false,
        }
    }

    /// Bytes consumed so far (end of the last valid record)
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next record.
    ///
    /// - `Ok(None)`: clean end of log (no bytes left at a record boundary)
    /// - `Err(Corruption)`: partial header, truncated payload, unknown kind,
    ///   or checksum mismatch
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if self.failed {
            return Ok(None);
        }
        match self.read_record() {
            Ok(Some((record, len))) => {
                self.offset += len;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    fn read_record(&mut self) -> Result<Option<(Record, u64)>> {
        let start = self.offset;

        let mut header = Vec::with_capacity(HEADER_SIZE);
        let got = self.read_into(&mut header, HEADER_SIZE)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_SIZE {
            return Err(TideError::corruption(start, "truncated header"));
        }
        let header = RecordHeader::decode(&header)
            .ok_or_else(|| TideError::corruption(start, "unknown record kind"))?;

        // Pull exactly the payload bytes, structure first, so the checksum
        // covers what the writer hashed and nothing more.
        let mut payload = Vec::new();
        match header.kind {
            RecordKind::Single => self.read_entry(&mut payload, start)?,
            RecordKind::Multi => {
                self.read_exact_or_corrupt(&mut payload, COUNT_SIZE, start)?;
                let count = (&payload[..]).get_u32();
                for _ in 0..count {
                    self.read_entry(&mut payload, start)?;
                }
            }
        }

        if crc32fast::hash(&payload) != header.checksum {
            return Err(TideError::corruption(start, "checksum mismatch"));
        }

        let mut cursor = &payload[..];
        let body = decode_body(header.kind, &mut cursor)
            .ok_or_else(|| TideError::corruption(start, "malformed payload"))?;

        let record = Record {
            timestamp: header.timestamp,
            body,
        };
        Ok(Some((record, (HEADER_SIZE + payload.len()) as u64)))
    }

    /// Append one encoded entry (prefix + key + value) to `payload`
    fn read_entry(&mut self, payload: &mut Vec<u8>, start: u64) -> Result<()> {
        let prefix_at = payload.len();
        self.read_exact_or_corrupt(payload, ENTRY_PREFIX_SIZE, start)?;
        let body_len = Entry::body_len(&payload[prefix_at..]);
        self.read_exact_or_corrupt(payload, body_len, start)
    }

    fn read_exact_or_corrupt(&mut self, buf: &mut Vec<u8>, len: usize, start: u64) -> Result<()> {
        if self.read_into(buf, len)? < len {
            return Err(TideError::corruption(start, "truncated payload"));
        }
        Ok(())
    }

    /// Read up to `len` bytes onto the end of `buf`, stopping early at EOF.
    /// Growth follows the bytes actually present, never the requested length.
    fn read_into(&mut self, buf: &mut Vec<u8>, len: usize) -> Result<usize> {
        let got = (&mut self.reader).take(len as u64).read_to_end(buf)?;
        Ok(got)
    }
}

impl<R: Read> Iterator for LogReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
