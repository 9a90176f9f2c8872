use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Every failure the appender and extractor can report.
///
/// I/O failures carry the operation that failed and the file or entry it was
/// acting on, so callers can branch on the kind and still print something
/// useful.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{op} failed for {}: {source}", path.display())]
    Io {
        op:     &'static str,
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Entry {name:?} has already been appended")]
    DuplicateName { name: String },

    #[error("Entry {name:?} not found in archive")]
    NotFound { name: String },

    #[error("Corrupt archive: {reason}")]
    CorruptArchive { reason: String },

    #[error("Appender is closed")]
    Closed,

    #[error("Checksum mismatch for {name:?}: expected {expected:08x}, found {found:08x}")]
    ChecksumMismatch { name: String, expected: u32, found: u32 },
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        ArchiveError::Io { op, path: path.into(), source }
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        ArchiveError::CorruptArchive { reason: reason.into() }
    }
}

/// Attach operation/path context to a bare `io::Result`.
pub(crate) trait IoContext<T> {
    fn context(self, op: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn context(self, op: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| ArchiveError::io(op, path, e))
    }
}
