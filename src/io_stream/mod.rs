//! Streaming archive engine: appender and extractor.
//!
//! # Appender
//! [`Appender`] appends named streams to the tail of an existing file.  Each
//! append seeks to end-of-file, writes the entry (verbatim or as one gzip
//! member) and records `[start, start + stored_len)` in the in-memory index.
//! [`Appender::close`] writes the JSON index followed by the 8-byte trailer.
//! All mutation goes through one mutex, so a shared `&Appender` may be used
//! from several threads; appends land on disk in lock order.
//!
//! # Extractor
//! [`Extractor`] reads the trailer, parses and validates the index once, and
//! then hands out [`EntryReader`](crate::codec::EntryReader)s bounded to each
//! entry's byte range.  Those readers share the source behind a mutex and
//! re-seek on every read, so several may be in flight at once.
//!
//! # Layout
//! ```text
//! [ existing bytes ][ entry 1 ] ... [ entry N ][ JSON index ][ u64 LE index offset ]
//! ```
//!
//! Two appenders on the same path at once will corrupt it; that is left to
//! the caller.

mod reader;
mod section;
mod writer;

pub use reader::Extractor;
pub use section::SectionReader;
pub use writer::{Appender, WriterOptions};

use std::fs::File;
use std::io::{self, BufWriter, Cursor, Seek, Write};
use std::sync::{Mutex, MutexGuard};

// ── Sinks ────────────────────────────────────────────────────────────────────

/// Destination an [`Appender`] seals into.
///
/// `sync` runs as the last step of sealing and must surface any write error
/// the destination has deferred.  Files are synced to disk, so late errors
/// such as ENOSPC are reported by `close`; in-memory sinks are only flushed.
pub trait ArchiveSink: Write + Seek {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl ArchiveSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_all()
    }
}

impl ArchiveSink for Cursor<Vec<u8>> {}
impl ArchiveSink for Cursor<&mut Vec<u8>> {}
impl ArchiveSink for Cursor<&mut [u8]> {}

impl<S: ArchiveSink> ArchiveSink for BufWriter<S> {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.get_mut().sync()
    }
}

impl<S: ArchiveSink + ?Sized> ArchiveSink for &mut S {
    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// `Write` adapter that feeds every byte it passes through into a CRC-32.
pub(crate) struct Crc32Writer<W> {
    inner:  W,
    hasher: crc32fast::Hasher,
}

impl<W: Write> Crc32Writer<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner, hasher: crc32fast::Hasher::new() }
    }

    pub(crate) fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

impl<W: Write> Write for Crc32Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Lock, ignoring poison.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
