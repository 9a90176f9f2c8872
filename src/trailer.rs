//! The fixed-size footer of a sealed archive.
//!
//! The last [`TRAILER_SIZE`] bytes are the absolute offset of the serialized
//! index, as an unsigned little-endian 64-bit integer.  Nothing else about the
//! archive is self-describing; every other offset is found through the index.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{ArchiveError, Result};

pub const TRAILER_SIZE: u64 = 8;

/// Location of the index inside a sealed archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub index_offset: u64,
    /// Total archive length, trailer included.
    pub file_len:     u64,
}

impl Trailer {
    /// Byte length of the serialized index.
    pub fn index_len(&self) -> u64 {
        self.file_len.saturating_sub(TRAILER_SIZE).saturating_sub(self.index_offset)
    }
}

pub fn write_trailer<W: Write>(mut writer: W, index_offset: u64) -> io::Result<()> {
    writer.write_u64::<LittleEndian>(index_offset)
}

/// Seek to the end of `reader` and decode the trailer.
///
/// Rejects files too short to hold a trailer and offsets that point past the
/// start of the trailer itself.  I/O failures are reported as
/// [`ArchiveError::CorruptArchive`] only when they mean "the bytes are not
/// there"; other failures surface as plain I/O errors.
pub fn read_trailer<R: Read + Seek>(mut reader: R, origin: &Path) -> Result<Trailer> {
    let file_len = reader
        .seek(SeekFrom::End(0))
        .map_err(|e| ArchiveError::io("Seeking to end of archive", origin, e))?;
    if file_len < TRAILER_SIZE {
        return Err(ArchiveError::corrupt(format!(
            "archive is {file_len} bytes, shorter than the {TRAILER_SIZE}-byte trailer"
        )));
    }

    reader
        .seek(SeekFrom::Start(file_len - TRAILER_SIZE))
        .map_err(|e| ArchiveError::io("Seeking to trailer", origin, e))?;
    let index_offset = reader
        .read_u64::<LittleEndian>()
        .map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ArchiveError::corrupt("truncated trailer"),
            _ => ArchiveError::io("Reading trailer", origin, e),
        })?;

    if index_offset > file_len - TRAILER_SIZE {
        return Err(ArchiveError::corrupt(format!(
            "index offset {index_offset} lies outside the {file_len}-byte archive"
        )));
    }
    Ok(Trailer { index_offset, file_len })
}
