//! Payload codecs.
//!
//! Each entry is stored either verbatim or as a single gzip member.  The
//! codec is chosen per append call and recorded in the entry's index record,
//! so the extractor never has to guess.
//!
//! Encoding and decoding are both streaming: nothing here buffers a whole
//! entry in memory.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

/// Default gzip level (same default as the `gzip` tool).
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Highest level accepted by the DEFLATE encoder.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

// ── CodecId ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecId {
    /// Payload stored verbatim.
    None,
    /// Payload is one gzip member (RFC 1952).
    Gzip,
}

impl CodecId {
    /// Map the per-call compress flag onto a codec.
    #[inline]
    pub fn for_flag(compress: bool) -> Self {
        if compress { CodecId::Gzip } else { CodecId::None }
    }

    pub fn is_compressed(self) -> bool {
        self != CodecId::None
    }

    /// Human-readable name; also the on-disk spelling in the index.
    pub fn name(self) -> &'static str {
        match self {
            CodecId::None => "none",
            CodecId::Gzip => "gzip",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" | "stored" => Some(CodecId::None),
            "gzip" | "gz"     => Some(CodecId::Gzip),
            _                 => None,
        }
    }
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Copy all of `src` into `dst`, compressing with `codec`.
///
/// Returns the number of uncompressed bytes consumed from `src`.  The gzip
/// trailer is written before returning, so `dst` holds a complete member.
pub fn encode_stream<R, W>(codec: CodecId, level: u32, src: &mut R, dst: &mut W) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    match codec {
        CodecId::None => io::copy(src, dst),
        CodecId::Gzip => {
            let level = Compression::new(level.min(MAX_COMPRESSION_LEVEL));
            let mut encoder = GzEncoder::new(dst, level);
            let n = io::copy(src, &mut encoder)?;
            encoder.finish()?;
            Ok(n)
        }
    }
}

// ── Decoding ─────────────────────────────────────────────────────────────────

/// Readable view of one entry's original bytes.
///
/// `S` is expected to already be bounded to the entry's stored byte range;
/// the decoder never sees anything past it.
pub enum EntryReader<S: Read> {
    Stored(S),
    Gzip(GzDecoder<S>),
}

impl<S: Read> EntryReader<S> {
    pub fn new(codec: CodecId, stored: S) -> Self {
        match codec {
            CodecId::None => EntryReader::Stored(stored),
            CodecId::Gzip => EntryReader::Gzip(GzDecoder::new(stored)),
        }
    }

    pub fn codec(&self) -> CodecId {
        match self {
            EntryReader::Stored(_) => CodecId::None,
            EntryReader::Gzip(_)   => CodecId::Gzip,
        }
    }
}

impl<S: Read> Read for EntryReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EntryReader::Stored(r) => r.read(buf),
            EntryReader::Gzip(r)   => r.read(buf),
        }
    }
}
