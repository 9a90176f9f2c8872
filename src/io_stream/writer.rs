use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use super::{lock, ArchiveSink, Crc32Writer};
use crate::codec::{encode_stream, CodecId, DEFAULT_COMPRESSION_LEVEL};
use crate::error::{ArchiveError, IoContext, Result};
use crate::index::{ArchiveIndex, EntryRecord};
use crate::trailer::write_trailer;

/// Settings fixed for the lifetime of an [`Appender`].
///
/// Whether a given entry is compressed is a per-call argument, not an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// gzip level, 0-9.
    pub level: u32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self { level: DEFAULT_COMPRESSION_LEVEL }
    }
}

enum WriterState<W> {
    Open { sink: W, index: ArchiveIndex },
    Closed,
}

/// Appends named entries to the end of an existing file.
///
/// Lifecycle is `open -> append* -> close`.  Any call after `close` (including
/// a second `close`) fails with [`ArchiveError::Closed`].
pub struct Appender<W: ArchiveSink> {
    origin:  PathBuf,
    options: WriterOptions,
    state:   Mutex<WriterState<W>>,
}

impl Appender<File> {
    /// Open `path` for read/write.  The file must already exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, WriterOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .context("Opening file (RW)", path)?;
        let mut appender = Self::new(file, options);
        appender.origin = path.to_owned();
        Ok(appender)
    }
}

impl<W: ArchiveSink> Appender<W> {
    pub fn new(sink: W, options: WriterOptions) -> Self {
        Self {
            origin: PathBuf::from("<stream>"),
            options,
            state: Mutex::new(WriterState::Open { sink, index: ArchiveIndex::default() }),
        }
    }

    pub fn options(&self) -> WriterOptions {
        self.options
    }

    pub fn is_closed(&self) -> bool {
        matches!(*lock(&self.state), WriterState::Closed)
    }

    /// Names appended so far, sorted.
    pub fn entry_names(&self) -> Result<Vec<String>> {
        match &*lock(&self.state) {
            WriterState::Open { index, .. } => Ok(index.names().map(str::to_owned).collect()),
            WriterState::Closed => Err(ArchiveError::Closed),
        }
    }

    // ── Append ───────────────────────────────────────────────────────────────

    /// Append everything `source` yields under `name`.
    ///
    /// A duplicate name is rejected before anything is written.  If this
    /// returns an I/O error, bytes may already have been written past the last
    /// indexed entry; they stay unreferenced.
    pub fn append_stream<R: Read + ?Sized>(
        &self,
        name:     &str,
        source:   &mut R,
        compress: bool,
    ) -> Result<EntryRecord> {
        let mut state = lock(&self.state);
        let (sink, index) = match &mut *state {
            WriterState::Open { sink, index } => (sink, index),
            WriterState::Closed => return Err(ArchiveError::Closed),
        };
        if index.contains(name) {
            return Err(ArchiveError::DuplicateName { name: name.to_owned() });
        }

        let codec = CodecId::for_flag(compress);
        let start = sink.seek(SeekFrom::End(0)).context("Seeking to end of file", &self.origin)?;

        let mut counted = Crc32Writer::new(&mut *sink);
        let original_length = encode_stream(codec, self.options.level, source, &mut counted)
            .context("Writing entry data", name)?;
        let crc = counted.finalize();

        let end = sink
            .seek(SeekFrom::End(0))
            .context("Seeking to end of file after write", &self.origin)?;

        let record = EntryRecord {
            start_offset: start,
            compressed_length: end - start,
            codec,
            original_length,
            crc32: Some(crc),
        };
        index.insert(name.to_owned(), record)?;

        debug!(
            entry = name,
            codec = codec.name(),
            start,
            stored = record.compressed_length,
            original = original_length,
            "appended entry"
        );
        Ok(record)
    }

    pub fn append_bytes(&self, name: &str, data: &[u8], compress: bool) -> Result<EntryRecord> {
        let mut data = data;
        self.append_stream(name, &mut data, compress)
    }

    /// Append the contents of `path`, using the path as given as the entry
    /// name.
    pub fn append_file<P: AsRef<Path>>(&self, path: P, compress: bool) -> Result<EntryRecord> {
        let path = path.as_ref();
        let name = path.to_string_lossy().into_owned();

        // Reject a repeat before touching the filesystem, so the error kind
        // does not depend on whether the source still exists.
        match &*lock(&self.state) {
            WriterState::Open { index, .. } if index.contains(&name) => {
                return Err(ArchiveError::DuplicateName { name });
            }
            WriterState::Closed => return Err(ArchiveError::Closed),
            WriterState::Open { .. } => {}
        }

        let mut source = File::open(path).context("Opening file", path)?;
        self.append_stream(&name, &mut source, compress)
    }

    // ── Seal ─────────────────────────────────────────────────────────────────

    /// Write the index and trailer, sync the sink, then release it.
    ///
    /// For a file this waits for the data to reach the disk, so write errors
    /// the OS reports late come back here as [`ArchiveError::Io`].
    pub fn close(&self) -> Result<()> {
        let state = mem::replace(&mut *lock(&self.state), WriterState::Closed);
        let sink = seal(&self.origin, state)?;
        drop(sink);
        Ok(())
    }

    /// Like [`close`](Self::close), but hands the sink back.
    pub fn finish(self) -> Result<W> {
        let state = self.state.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        seal(&self.origin, state)
    }
}

fn seal<W: ArchiveSink>(origin: &Path, state: WriterState<W>) -> Result<W> {
    let (mut sink, index) = match state {
        WriterState::Open { sink, index } => (sink, index),
        WriterState::Closed => return Err(ArchiveError::Closed),
    };

    let index_offset =
        sink.seek(SeekFrom::End(0)).context("Seeking to end of file", origin)?;
    let bytes = index
        .to_bytes()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        .context("Encoding index", origin)?;

    sink.write_all(&bytes).context("Writing index", origin)?;
    write_trailer(&mut sink, index_offset).context("Writing index location", origin)?;
    sink.sync().context("Closing archive", origin)?;

    info!(
        archive = %origin.display(),
        entries = index.len(),
        index_offset,
        index_len = bytes.len(),
        "sealed archive"
    );
    Ok(sink)
}
