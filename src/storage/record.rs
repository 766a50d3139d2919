//! Value-log records and index file encoding
//!
//! Every value appended to a partition's log is wrapped in a small record so
//! that a deletion can never be confused with a stored value:
//!
//! ```text
//! ┌─────────┬───────────────┬──────────────────────┐
//! │ Tag (1) │ CRC32 LE (4)  │ Payload (variable)   │
//! └─────────┴───────────────┴──────────────────────┘
//!   Tag 0 = live value, Tag 1 = tombstone (empty payload)
//!   CRC covers tag + payload
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Tag byte for a live value
pub(crate) const TAG_VALUE: u8 = 0;

/// Tag byte for a deletion marker
pub(crate) const TAG_TOMBSTONE: u8 = 1;

/// Tag (1) + CRC32 (4)
pub(crate) const RECORD_HEADER_SIZE: usize = 5;

/// Current index file format version
pub(crate) const INDEX_VERSION: u16 = 1;

/// A value or a deletion marker, as held by the memtable and by partitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl Entry {
    /// The live value, or `None` for a tombstone
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Entry::Value(v) => Some(v),
            Entry::Tombstone => None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Entry::Tombstone)
    }

    /// Bytes this entry contributes to memtable size accounting
    pub(crate) fn payload_len(&self) -> usize {
        self.value().map_or(0, <[u8]>::len)
    }

    /// Encode as a value-log record
    pub(crate) fn encode(&self) -> Vec<u8> {
        let (tag, payload): (u8, &[u8]) = match self {
            Entry::Value(v) => (TAG_VALUE, v),
            Entry::Tombstone => (TAG_TOMBSTONE, &[]),
        };

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[tag]);
        hasher.update(payload);
        let crc = hasher.finalize();

        let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
        buf.push(tag);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    /// Decode a value-log record, returning a reason string on failure
    pub(crate) fn decode(mut record: Vec<u8>) -> Result<Self, String> {
        if record.len() < RECORD_HEADER_SIZE {
            return Err(format!("record too short: {} bytes", record.len()));
        }

        let tag = record[0];
        let stored_crc = u32::from_le_bytes([record[1], record[2], record[3], record[4]]);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[tag]);
        hasher.update(&record[RECORD_HEADER_SIZE..]);
        let actual_crc = hasher.finalize();

        if stored_crc != actual_crc {
            return Err(format!(
                "checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, actual_crc
            ));
        }

        match tag {
            TAG_VALUE => {
                record.drain(..RECORD_HEADER_SIZE);
                Ok(Entry::Value(record))
            }
            TAG_TOMBSTONE if record.len() == RECORD_HEADER_SIZE => Ok(Entry::Tombstone),
            TAG_TOMBSTONE => Err("tombstone record carries a payload".to_string()),
            other => Err(format!("unknown record tag {}", other)),
        }
    }
}

/// Location of one record inside a partition's value log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Byte position of the record in the value log
    pub offset: u64,
    /// Record length in bytes (header included)
    pub length: u32,
}

/// Borrowed form written to `{id}-index.bin`
#[derive(Serialize)]
pub(crate) struct IndexFileRef<'a> {
    pub version: u16,
    pub entries: &'a HashMap<Vec<u8>, IndexEntry>,
}

/// Owned form read back from `{id}-index.bin`
#[derive(Deserialize)]
pub(crate) struct IndexFile {
    pub version: u16,
    pub entries: HashMap<Vec<u8>, IndexEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte_value_is_not_a_tombstone() {
        // 0x04 was once a deletion sentinel; as a payload it must stay a value
        let entry = Entry::Value(vec![0x04]);
        let decoded = Entry::decode(entry.encode()).unwrap();
        assert_eq!(decoded, Entry::Value(vec![0x04]));
    }

    #[test]
    fn test_tombstone_record_layout() {
        let encoded = Entry::Tombstone.encode();
        assert_eq!(encoded.len(), RECORD_HEADER_SIZE);
        assert_eq!(encoded[0], TAG_TOMBSTONE);
        assert_eq!(Entry::decode(encoded).unwrap(), Entry::Tombstone);
    }

    #[test]
    fn test_empty_value_distinct_from_tombstone() {
        let decoded = Entry::decode(Entry::Value(Vec::new()).encode()).unwrap();
        assert_eq!(decoded, Entry::Value(Vec::new()));
    }

    #[test]
    fn test_flipped_payload_bit_detected() {
        let mut encoded = Entry::Value(b"hello".to_vec()).encode();
        encoded[RECORD_HEADER_SIZE] ^= 0x01;
        let err = Entry::decode(encoded).unwrap_err();
        assert!(err.contains("checksum"));
    }

    #[test]
    fn test_truncated_record_rejected() {
        assert!(Entry::decode(vec![TAG_VALUE, 0, 0]).is_err());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut encoded = Entry::Value(b"x".to_vec()).encode();
        encoded[0] = 7;
        // Recompute CRC so only the tag check can fail
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&[7]);
        hasher.update(b"x");
        encoded[1..5].copy_from_slice(&hasher.finalize().to_le_bytes());

        let err = Entry::decode(encoded).unwrap_err();
        assert!(err.contains("unknown record tag"));
    }

    #[test]
    fn test_index_file_roundtrip_through_bincode() {
        let mut entries = HashMap::new();
        entries.insert(b"a".to_vec(), IndexEntry { offset: 0, length: 6 });
        entries.insert(b"b".to_vec(), IndexEntry { offset: 6, length: 5 });

        let bytes = bincode::serialize(&IndexFileRef {
            version: INDEX_VERSION,
            entries: &entries,
        })
        .unwrap();
        let decoded: IndexFile = bincode::deserialize(&bytes).unwrap();

        assert_eq!(decoded.version, INDEX_VERSION);
        assert_eq!(decoded.entries, entries);
    }
}
