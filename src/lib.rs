//! Append named blobs to the tail of an existing file and read them back.
//!
//! ```no_run
//! use binappend::{Appender, Extractor};
//!
//! let w = Appender::open("app.bin")?;
//! w.append_file("assets/logo.png", true)?;
//! w.append_bytes("config.json", br#"{"debug":false}"#, false)?;
//! w.close()?;
//!
//! let ex = Extractor::open("app.bin")?;
//! for name in ex.available_names() {
//!     println!("{name}");
//! }
//! let config = ex.read_entry("config.json")?;
//! # Ok::<(), binappend::ArchiveError>(())
//! ```

pub mod codec;
pub mod error;
pub mod index;
pub mod io_stream;
pub mod trailer;

pub use codec::{CodecId, EntryReader};
pub use error::{ArchiveError, Result};
pub use index::{ArchiveIndex, EntryRecord, METADATA_VERSION};
pub use io_stream::{Appender, ArchiveSink, Extractor, SectionReader, WriterOptions};
pub use trailer::TRAILER_SIZE;
