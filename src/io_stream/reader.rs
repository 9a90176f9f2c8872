use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::{lock, Crc32Writer, SectionReader};
use crate::codec::{CodecId, EntryReader};
use crate::error::{ArchiveError, IoContext, Result};
use crate::index::{ArchiveIndex, EntryRecord};
use crate::trailer::{read_trailer, Trailer};

/// Read-only view of a sealed archive.
///
/// The index is parsed and validated once in the constructor; afterwards the
/// extractor never changes and can be shared across threads.
pub struct Extractor<R: Read + Seek> {
    origin:  PathBuf,
    source:  Arc<Mutex<R>>,
    trailer: Trailer,
    index:   ArchiveIndex,
}

impl Extractor<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).context("Opening archive", path)?;
        Self::with_origin(file, path.to_owned())
    }
}

impl<R: Read + Seek> Extractor<R> {
    pub fn new(source: R) -> Result<Self> {
        Self::with_origin(source, PathBuf::from("<stream>"))
    }

    fn with_origin(mut source: R, origin: PathBuf) -> Result<Self> {
        let trailer = read_trailer(&mut source, &origin)?;

        source
            .seek(SeekFrom::Start(trailer.index_offset))
            .context("Seeking to index", &origin)?;
        let mut raw = Vec::new();
        (&mut source)
            .take(trailer.index_len())
            .read_to_end(&mut raw)
            .context("Reading index", &origin)?;
        if (raw.len() as u64) < trailer.index_len() {
            return Err(ArchiveError::corrupt("index ends before the trailer"));
        }

        let index = ArchiveIndex::from_bytes(&raw)
            .map_err(|e| ArchiveError::corrupt(format!("malformed index: {e}")))?;
        index.validate(trailer.index_offset)?;

        debug!(
            archive = %origin.display(),
            entries = index.len(),
            index_offset = trailer.index_offset,
            "opened archive"
        );
        Ok(Self { origin, source: Arc::new(Mutex::new(source)), trailer, index })
    }

    pub fn path(&self) -> &Path {
        &self.origin
    }

    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }

    pub fn trailer(&self) -> Trailer {
        self.trailer
    }

    /// Entry names, sorted.
    pub fn available_names(&self) -> Vec<String> {
        self.index.names().map(str::to_owned).collect()
    }

    pub fn entry(&self, name: &str) -> Option<&EntryRecord> {
        self.index.get(name)
    }

    fn record(&self, name: &str) -> Result<&EntryRecord> {
        self.index
            .get(name)
            .ok_or_else(|| ArchiveError::NotFound { name: name.to_owned() })
    }

    fn stored_section(&self, rec: &EntryRecord) -> SectionReader<R> {
        SectionReader::new(Arc::clone(&self.source), rec.start_offset, rec.compressed_length)
    }

    /// Stream of `name`'s original bytes, decompressed if it was stored
    /// compressed.  The stream never reads outside the entry's stored range.
    pub fn get_reader(&self, name: &str) -> Result<EntryReader<SectionReader<R>>> {
        let rec = self.record(name)?;
        Ok(EntryReader::new(rec.codec, self.stored_section(rec)))
    }

    /// Read all of `name` into memory.
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let rec = self.record(name)?;
        let mut out = Vec::with_capacity(prealloc_hint(rec));
        EntryReader::new(rec.codec, self.stored_section(rec))
            .read_to_end(&mut out)
            .context("Reading entry", name)?;
        Ok(out)
    }

    /// Check every entry against the checksum and length recorded at append
    /// time.  Returns the number of entries that carried a checksum.
    pub fn verify(&self) -> Result<usize> {
        let mut checked = 0;
        for (name, rec) in &self.index.data {
            let Some(expected) = rec.crc32 else {
                warn!(entry = %name, "no checksum recorded, skipping");
                continue;
            };

            let mut crc = Crc32Writer::new(io::sink());
            io::copy(&mut self.stored_section(rec), &mut crc).context("Reading entry", name)?;
            let found = crc.finalize();
            if found != expected {
                return Err(ArchiveError::ChecksumMismatch { name: name.clone(), expected, found });
            }

            let decoded = io::copy(&mut EntryReader::new(rec.codec, self.stored_section(rec)), &mut io::sink())
                .context("Decoding entry", name)?;
            if decoded != rec.original_length {
                return Err(ArchiveError::corrupt(format!(
                    "entry {name:?} decodes to {decoded} bytes, index says {}",
                    rec.original_length
                )));
            }
            checked += 1;
        }
        debug!(archive = %self.origin.display(), checked, "verified archive");
        Ok(checked)
    }

    /// Give back the underlying source.  Fails if an entry reader still holds
    /// a reference to it.
    pub fn into_inner(self) -> std::result::Result<R, Self> {
        let Self { origin, source, trailer, index } = self;
        match Arc::try_unwrap(source) {
            Ok(m) => Ok(m.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())),
            Err(source) => Err(Self { origin, source, trailer, index }),
        }
    }
}

/// Upper bound on memory reserved up front for [`Extractor::read_entry`].
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// DEFLATE expands at most ~1032:1.
const MAX_INFLATE_RATIO: u64 = 1032;

/// `original_size` comes from the index and is not trusted; the vector still
/// grows past the hint if the entry really is larger.
fn prealloc_hint(rec: &EntryRecord) -> usize {
    let bound = match rec.codec {
        CodecId::None => rec.compressed_length,
        CodecId::Gzip => rec.compressed_length.saturating_mul(MAX_INFLATE_RATIO),
    };
    let hint = rec.original_length.min(bound).min(MAX_PREALLOC);
    usize::try_from(hint).unwrap_or(0)
}
