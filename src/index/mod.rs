use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::codec::CodecId;
use crate::error::{ArchiveError, Result};

/// Index format tag written by this build.
pub const METADATA_VERSION: &str = "0.1";

/// Location and encoding of one entry's stored bytes.
///
/// Field names on disk keep the historical spelling (`start_file_pointer`,
/// `zipped_block_size`).  Records written before the codec was recorded
/// deserialize as gzip, which is what those writers always produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Absolute offset of the first stored byte.
    #[serde(rename = "start_file_pointer")]
    pub start_offset:      u64,
    /// Number of stored (possibly compressed) bytes.
    #[serde(rename = "zipped_block_size")]
    pub compressed_length: u64,
    #[serde(default = "legacy_codec")]
    pub codec:             CodecId,
    /// Uncompressed length; zero when unknown.
    #[serde(rename = "original_size", default)]
    pub original_length:   u64,
    /// CRC-32 of the stored bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crc32:             Option<u32>,
}

fn legacy_codec() -> CodecId {
    CodecId::Gzip
}

impl EntryRecord {
    /// One past the last stored byte.
    pub fn end_offset(&self) -> u64 {
        self.start_offset.saturating_add(self.compressed_length)
    }
}

/// Name → record map plus the format tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveIndex {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Data")]
    pub data:    BTreeMap<String, EntryRecord>,
}

impl Default for ArchiveIndex {
    fn default() -> Self {
        Self { version: METADATA_VERSION.to_owned(), data: BTreeMap::new() }
    }
}

impl ArchiveIndex {
    pub fn contains(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&EntryRecord> {
        self.data.get(name)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Add a record.  Names are never overwritten.
    pub fn insert(&mut self, name: String, record: EntryRecord) -> Result<()> {
        if self.data.contains_key(&name) {
            return Err(ArchiveError::DuplicateName { name });
        }
        self.data.insert(name, record);
        Ok(())
    }

    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Check the index against the archive it was read from.
    ///
    /// Every entry must end at or before `index_offset`, and no two entries
    /// may share a byte.
    pub fn validate(&self, index_offset: u64) -> Result<()> {
        if self.version != METADATA_VERSION {
            return Err(ArchiveError::corrupt(format!(
                "unsupported index version {:?} (expected {METADATA_VERSION:?})",
                self.version
            )));
        }

        let mut ranges: Vec<(&str, &EntryRecord)> =
            self.data.iter().map(|(n, r)| (n.as_str(), r)).collect();
        ranges.sort_by_key(|(_, r)| (r.start_offset, r.end_offset()));

        for (name, rec) in &ranges {
            if rec.start_offset.checked_add(rec.compressed_length).is_none()
                || rec.end_offset() > index_offset
            {
                return Err(ArchiveError::corrupt(format!(
                    "entry {name:?} [{}, +{}) runs past the index at {index_offset}",
                    rec.start_offset, rec.compressed_length
                )));
            }
        }
        for pair in ranges.windows(2) {
            let (prev_name, prev) = pair[0];
            let (name, rec) = pair[1];
            if prev.end_offset() > rec.start_offset {
                return Err(ArchiveError::corrupt(format!(
                    "entries {prev_name:?} and {name:?} overlap"
                )));
            }
        }
        Ok(())
    }
}
