//! Log record definitions
//!
//! Defines records, their entries, and the binary encoding of both.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, TideError};

/// Size of the fixed record header: crc (4) + timestamp (8) + kind (1)
pub const HEADER_SIZE: usize = 13;

/// Value length marking a tombstone
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Largest key or value a record can carry (`u32::MAX` is the tombstone)
pub const MAX_FIELD_LEN: usize = (u32::MAX - 1) as usize;

/// Size of one entry's fixed prefix: key_len (4) + val_len (4)
pub(crate) const ENTRY_PREFIX_SIZE: usize = 8;

/// Size of a multi payload's entry count
pub(crate) const COUNT_SIZE: usize = 4;

/// Record kind stored in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Single = 0,
    Multi = 1,
}

impl RecordKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(RecordKind::Single),
            1 => Some(RecordKind::Multi),
            _ => None,
        }
    }
}

/// A key with its new value; `None` is a tombstone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

impl Entry {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn tombstone(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Encoded size: [key_len][val_len][key][value]
    pub fn encoded_len(&self) -> usize {
        ENTRY_PREFIX_SIZE + self.key.len() + self.value.as_ref().map_or(0, Vec::len)
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u32(self.key.len() as u32);
        match &self.value {
            Some(value) => buf.put_u32(value.len() as u32),
            None => buf.put_u32(TOMBSTONE_MARKER),
        }
        buf.put_slice(&self.key);
        if let Some(value) = &self.value {
            buf.put_slice(value);
        }
    }

    /// Decode one entry, advancing `buf`. `None` means the input ran out.
    fn decode_from(buf: &mut &[u8]) -> Option<Self> {
        if buf.remaining() < ENTRY_PREFIX_SIZE {
            return None;
        }
        let key_len = buf.get_u32() as usize;
        let val_len = buf.get_u32();
        let value_len = if val_len == TOMBSTONE_MARKER {
            0
        } else {
            val_len as usize
        };

        if buf.remaining() < key_len + value_len {
            return None;
        }
        let key = buf[..key_len].to_vec();
        buf.advance(key_len);

        let value = if val_len == TOMBSTONE_MARKER {
            None
        } else {
            let value = buf[..value_len].to_vec();
            buf.advance(value_len);
            Some(value)
        };

        Some(Self { key, value })
    }

    /// Byte length of the key and value that follow the prefix
    pub(crate) fn body_len(prefix: &[u8]) -> usize {
        let mut prefix = prefix;
        let key_len = prefix.get_u32() as usize;
        let val_len = prefix.get_u32();
        if val_len == TOMBSTONE_MARKER {
            key_len
        } else {
            key_len + val_len as usize
        }
    }
}

/// The payload of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    /// One put or delete
    Single(Entry),

    /// A committed transaction's write set, applied all-or-nothing
    Multi(Vec<Entry>),
}

/// The durable unit of the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Write time (unix nanos)
    pub timestamp: i64,

    pub body: RecordBody,
}

impl Record {
    /// A single-entry record stamped with the current time
    pub fn single(entry: Entry) -> Self {
        Self {
            timestamp: now_nanos(),
            body: RecordBody::Single(entry),
        }
    }

    /// A batch record stamped with the current time
    pub fn batch(entries: Vec<Entry>) -> Self {
        Self {
            timestamp: now_nanos(),
            body: RecordBody::Multi(entries),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self.body {
            RecordBody::Single(_) => RecordKind::Single,
            RecordBody::Multi(_) => RecordKind::Multi,
        }
    }

    /// Entries in the order they must be applied
    pub fn entries(&self) -> &[Entry] {
        match &self.body {
            RecordBody::Single(entry) => std::slice::from_ref(entry),
            RecordBody::Multi(entries) => entries,
        }
    }

    pub fn into_entries(self) -> Vec<Entry> {
        match self.body {
            RecordBody::Single(entry) => vec![entry],
            RecordBody::Multi(entries) => entries,
        }
    }

    /// Encode the payload only (the bytes covered by the checksum)
    pub fn encode_payload(&self) -> BytesMut {
        match &self.body {
            RecordBody::Single(entry) => {
                let mut buf = BytesMut::with_capacity(entry.encoded_len());
                entry.encode_into(&mut buf);
                buf
            }
            RecordBody::Multi(entries) => {
                let size = COUNT_SIZE + entries.iter().map(Entry::encoded_len).sum::<usize>();
                let mut buf = BytesMut::with_capacity(size);
                buf.put_u32(entries.len() as u32);
                for entry in entries {
                    entry.encode_into(&mut buf);
                }
                buf
            }
        }
    }

    /// Encode header + payload, ready for a single append
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.encode_payload();
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u32(crc32fast::hash(&payload));
        buf.put_i64(self.timestamp);
        buf.put_u8(self.kind() as u8);
        buf.put_slice(&payload);
        buf.to_vec()
    }

    /// Decode one record from the front of `bytes`.
    ///
    /// Returns the record and the number of bytes consumed. Any shortfall or
    /// checksum mismatch is reported as corruption at offset 0.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < HEADER_SIZE {
            return Err(TideError::corruption(0, "truncated header"));
        }
        let header = RecordHeader::decode(&bytes[..HEADER_SIZE])
            .ok_or_else(|| TideError::corruption(0, "unknown record kind"))?;

        let mut cursor = &bytes[HEADER_SIZE..];
        let before = cursor.len();
        let body = decode_body(header.kind, &mut cursor)
            .ok_or_else(|| TideError::corruption(0, "truncated payload"))?;
        let payload_len = before - cursor.len();

        let payload = &bytes[HEADER_SIZE..HEADER_SIZE + payload_len];
        if crc32fast::hash(payload) != header.checksum {
            return Err(TideError::corruption(0, "checksum mismatch"));
        }

        Ok((
            Self {
                timestamp: header.timestamp,
                body,
            },
            HEADER_SIZE + payload_len,
        ))
    }
}

/// Parsed fixed-size record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub checksum: u32,
    pub timestamp: i64,
    pub kind: RecordKind,
}

impl RecordHeader {
    /// Parse exactly `HEADER_SIZE` bytes. `None` for an unknown kind.
    pub fn decode(mut bytes: &[u8]) -> Option<Self> {
        let checksum = bytes.get_u32();
        let timestamp = bytes.get_i64();
        let kind = RecordKind::from_byte(bytes.get_u8())?;
        Some(Self {
            checksum,
            timestamp,
            kind,
        })
    }
}

/// Decode a payload of the given kind, advancing `buf` past it.
pub(crate) fn decode_body(kind: RecordKind, buf: &mut &[u8]) -> Option<RecordBody> {
    match kind {
        RecordKind::Single => Entry::decode_from(buf).map(RecordBody::Single),
        RecordKind::Multi => {
            if buf.remaining() < COUNT_SIZE {
                return None;
            }
            let count = buf.get_u32() as usize;
            // A corrupt count must not drive a huge allocation
            let mut entries = Vec::with_capacity(count.min(buf.remaining() / ENTRY_PREFIX_SIZE));
            for _ in 0..count {
                entries.push(Entry::decode_from(buf)?);
            }
            Some(RecordBody::Multi(entries))
        }
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
