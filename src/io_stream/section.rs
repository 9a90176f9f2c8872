use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use super::lock;

/// Reader over `[start, end)` of a shared seekable source.
///
/// The source cursor is shared, so every `read` takes the lock, seeks to this
/// section's own position and reads at most up to `end`.  Reads past `end`
/// return `Ok(0)` whatever follows in the source.
pub struct SectionReader<R> {
    source: Arc<Mutex<R>>,
    start:  u64,
    pos:    u64,
    end:    u64,
}

impl<R: Read + Seek> SectionReader<R> {
    pub fn new(source: Arc<Mutex<R>>, start: u64, len: u64) -> Self {
        let end = start.saturating_add(len);
        Self { source, start, pos: start, end }
    }

    /// Total length of the section.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> u64 {
        self.end - self.pos
    }
}

impl<R: Read + Seek> Read for SectionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));

        let mut src = lock(&self.source);
        src.seek(SeekFrom::Start(self.pos))?;
        let n = src.read(&mut buf[..want])?;
        drop(src);

        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended {} bytes before section end", remaining),
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}
