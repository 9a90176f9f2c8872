use binappend::{Appender, ArchiveError, ArchiveIndex, CodecId, Extractor, TRAILER_SIZE};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tempfile::NamedTempFile;

fn read_all<R: Read>(mut r: R) -> Vec<u8> {
    let mut out = Vec::new();
    r.read_to_end(&mut out).unwrap();
    out
}

#[test]
fn test_hello_and_zeros_scenario() {
    let temp_file = NamedTempFile::new().unwrap();
    let archive_path = temp_file.path().to_path_buf();

    {
        let writer = Appender::open(&archive_path).unwrap();
        writer.append_bytes("a.txt", b"hello", false).unwrap();
        writer.append_bytes("b.bin", &vec![0u8; 10_000], true).unwrap();
        writer.close().unwrap();
    }

    let reader = Extractor::open(&archive_path).unwrap();
    let names: BTreeSet<String> = reader.available_names().into_iter().collect();
    assert_eq!(names, BTreeSet::from(["a.txt".to_string(), "b.bin".to_string()]));
    assert_eq!(read_all(reader.get_reader("a.txt").unwrap()), b"hello");
    assert_eq!(read_all(reader.get_reader("b.bin").unwrap()), vec![0u8; 10_000]);
}

#[test]
fn test_existing_content_is_preserved() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"#!/bin/sh\necho host\n").unwrap();
    temp_file.flush().unwrap();
    let archive_path = temp_file.path().to_path_buf();

    let writer = Appender::open(&archive_path).unwrap();
    let rec = writer.append_bytes("payload", b"tail data", false).unwrap();
    writer.close().unwrap();

    let bytes = fs::read(&archive_path).unwrap();
    assert!(bytes.starts_with(b"#!/bin/sh\necho host\n"));
    assert_eq!(rec.start_offset, 20);

    let reader = Extractor::open(&archive_path).unwrap();
    assert_eq!(reader.read_entry("payload").unwrap(), b"tail data");
}

#[test]
fn test_append_file_uses_path_as_name() {
    let dir = tempfile::tempdir().unwrap();
    let archive_path = dir.path().join("host.bin");
    File::create(&archive_path).unwrap();
    let source = dir.path().join("notes.txt");
    fs::write(&source, b"file contents\n").unwrap();

    let writer = Appender::open(&archive_path).unwrap();
    writer.append_file(&source, true).unwrap();
    let err = writer.append_file(&source, false).unwrap_err();
    assert!(matches!(err, ArchiveError::DuplicateName { .. }));
    writer.close().unwrap();

    let reader = Extractor::open(&archive_path).unwrap();
    let name = source.to_string_lossy().into_owned();
    assert_eq!(reader.available_names(), vec![name.clone()]);
    assert_eq!(reader.entry(&name).unwrap().codec, CodecId::Gzip);
    assert_eq!(reader.read_entry(&name).unwrap(), b"file contents\n");
}

#[test]
fn test_open_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.bin");
    assert!(matches!(Appender::open(&missing), Err(ArchiveError::Io { .. })));
    assert!(!missing.exists(), "open must not create the archive");
    assert!(matches!(Extractor::open(&missing), Err(ArchiveError::Io { .. })));

    let host = dir.path().join("host");
    File::create(&host).unwrap();
    let writer = Appender::open(&host).unwrap();
    let err = writer.append_file(&missing, false).unwrap_err();
    assert!(matches!(err, ArchiveError::Io { .. }));
}

#[test]
fn test_duplicate_does_not_alter_file() {
    let temp_file = NamedTempFile::new().unwrap();
    let archive_path = temp_file.path().to_path_buf();

    let writer = Appender::open(&archive_path).unwrap();
    writer.append_bytes("same", b"first", true).unwrap();
    let len_after_first = fs::metadata(&archive_path).unwrap().len();
    let err = writer.append_bytes("same", b"second", true).unwrap_err();
    assert!(matches!(err, ArchiveError::DuplicateName { ref name } if name == "same"));
    assert_eq!(fs::metadata(&archive_path).unwrap().len(), len_after_first);
    writer.close().unwrap();

    let reader = Extractor::open(&archive_path).unwrap();
    assert_eq!(reader.read_entry("same").unwrap(), b"first");
}

#[test]
fn test_trailer_points_at_index() {
    let temp_file = NamedTempFile::new().unwrap();
    let archive_path = temp_file.path().to_path_buf();

    let writer = Appender::open(&archive_path).unwrap();
    writer.append_bytes("x", b"xxxx", false).unwrap();
    writer.append_bytes("y", b"yyyyyyyy", true).unwrap();
    writer.close().unwrap();

    let mut file = File::open(&archive_path).unwrap();
    let len = file.seek(SeekFrom::End(0)).unwrap();
    file.seek(SeekFrom::Start(len - TRAILER_SIZE)).unwrap();
    let mut tail = [0u8; 8];
    file.read_exact(&mut tail).unwrap();
    let index_offset = u64::from_le_bytes(tail);

    file.seek(SeekFrom::Start(index_offset)).unwrap();
    let mut index_bytes = vec![0u8; (len - TRAILER_SIZE - index_offset) as usize];
    file.read_exact(&mut index_bytes).unwrap();
    let index = ArchiveIndex::from_bytes(&index_bytes).unwrap();

    assert_eq!(index.version, "0.1");
    assert_eq!(index.len(), 2);
    for rec in index.data.values() {
        assert!(rec.end_offset() <= index_offset);
    }
    index.validate(index_offset).unwrap();
}

#[test]
fn test_truncated_archive_is_corrupt() {
    let temp_file = NamedTempFile::new().unwrap();
    let archive_path = temp_file.path().to_path_buf();

    let writer = Appender::open(&archive_path).unwrap();
    writer.append_bytes("a", b"abc", false).unwrap();
    writer.close().unwrap();

    OpenOptions::new().write(true).open(&archive_path).unwrap().set_len(5).unwrap();
    assert!(matches!(Extractor::open(&archive_path), Err(ArchiveError::CorruptArchive { .. })));
}

#[test]
fn test_unclosed_archive_is_corrupt() {
    let temp_file = NamedTempFile::new().unwrap();
    let archive_path = temp_file.path().to_path_buf();

    let writer = Appender::open(&archive_path).unwrap();
    writer.append_bytes("a", &[0xAB; 64], false).unwrap();
    drop(writer);

    assert!(matches!(Extractor::open(&archive_path), Err(ArchiveError::CorruptArchive { .. })));
}

#[test]
fn test_entry_stream_ignores_trailing_garbage() {
    let temp_file = NamedTempFile::new().unwrap();
    let archive_path = temp_file.path().to_path_buf();

    // Two gzip entries back to back: a decoder that ran past the first
    // would happily keep going into the second.
    let writer = Appender::open(&archive_path).unwrap();
    writer.append_bytes("first", b"one", true).unwrap();
    writer.append_bytes("second", b"two", true).unwrap();
    writer.close().unwrap();

    let reader = Extractor::open(&archive_path).unwrap();
    assert_eq!(reader.read_entry("first").unwrap(), b"one");
    assert_eq!(reader.read_entry("second").unwrap(), b"two");
}

#[test]
fn test_listing_is_stable_and_excludes_unknown() {
    let temp_file = NamedTempFile::new().unwrap();
    let archive_path = temp_file.path().to_path_buf();

    let writer = Appender::open(&archive_path).unwrap();
    for name in ["c", "a", "b"] {
        writer.append_bytes(name, name.as_bytes(), false).unwrap();
    }
    writer.close().unwrap();

    let reader = Extractor::open(&archive_path).unwrap();
    let first = reader.available_names();
    assert_eq!(first, reader.available_names());
    assert!(!first.contains(&"d".to_string()));
    assert!(matches!(reader.get_reader("d"), Err(ArchiveError::NotFound { .. })));
}

/// Yields `good` bytes of payload, then fails.
struct BrokenSource {
    good: usize,
}

impl Read for BrokenSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.good == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "source went away"));
        }
        let n = buf.len().min(self.good);
        buf[..n].fill(0x5A);
        self.good -= n;
        Ok(n)
    }
}

#[test]
fn test_failed_append_leaves_orphaned_bytes_unindexed() {
    let temp_file = NamedTempFile::new().unwrap();
    let archive_path = temp_file.path().to_path_buf();

    let writer = Appender::open(&archive_path).unwrap();
    let before = writer.append_bytes("before", b"ok", false).unwrap();

    let err = writer.append_stream("broken", &mut BrokenSource { good: 300 }, false).unwrap_err();
    assert!(matches!(err, ArchiveError::Io { .. }));
    assert_eq!(writer.entry_names().unwrap(), vec!["before".to_string()]);

    let orphan_end = fs::metadata(&archive_path).unwrap().len();
    assert!(orphan_end > before.end_offset(), "partial payload reached the file");

    let after = writer.append_bytes("after", b"still fine", true).unwrap();
    assert!(after.start_offset >= orphan_end);
    writer.close().unwrap();

    let reader = Extractor::open(&archive_path).unwrap();
    reader.index().validate(reader.trailer().index_offset).unwrap();
    assert_eq!(reader.available_names(), vec!["after".to_string(), "before".to_string()]);
    assert!(matches!(reader.get_reader("broken"), Err(ArchiveError::NotFound { .. })));
    assert_eq!(reader.read_entry("after").unwrap(), b"still fine");
    assert_eq!(reader.verify().unwrap(), 2);
}

#[test]
fn test_concurrent_appends_are_serialized() {
    let temp_file = NamedTempFile::new().unwrap();
    let archive_path = temp_file.path().to_path_buf();

    let writer = Arc::new(Appender::open(&archive_path).unwrap());
    std::thread::scope(|s| {
        for t in 0..4u8 {
            let writer = Arc::clone(&writer);
            s.spawn(move || {
                for i in 0..8u8 {
                    let data = vec![t * 16 + i; 1000 + i as usize];
                    writer.append_bytes(&format!("t{t}/e{i}"), &data, i % 2 == 0).unwrap();
                }
            });
        }
    });
    writer.close().unwrap();

    let reader = Arc::new(Extractor::open(&archive_path).unwrap());
    assert_eq!(reader.available_names().len(), 32);
    reader.index().validate(reader.trailer().index_offset).unwrap();

    std::thread::scope(|s| {
        for t in 0..4u8 {
            let reader = Arc::clone(&reader);
            s.spawn(move || {
                for i in 0..8u8 {
                    let got = read_all(reader.get_reader(&format!("t{t}/e{i}")).unwrap());
                    assert_eq!(got, vec![t * 16 + i; 1000 + i as usize]);
                }
            });
        }
    });
    assert_eq!(reader.verify().unwrap(), 32);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_round_trip(
        prefix in proptest::collection::vec(any::<u8>(), 0..64),
        entries in proptest::collection::btree_map(
            "[a-z0-9_./]{1,12}",
            (proptest::collection::vec(any::<u8>(), 0..2048), any::<bool>()),
            0..8,
        ),
    ) {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(&prefix).unwrap();
        temp_file.flush().unwrap();

        let writer = Appender::open(temp_file.path()).unwrap();
        for (name, (data, compress)) in &entries {
            writer.append_bytes(name, data, *compress).unwrap();
        }
        writer.close().unwrap();

        let reader = Extractor::open(temp_file.path()).unwrap();
        let names: Vec<String> = entries.keys().cloned().collect();
        prop_assert_eq!(reader.available_names(), names);

        let mut stored: BTreeMap<u64, u64> = BTreeMap::new();
        for (name, (data, compress)) in &entries {
            prop_assert_eq!(&reader.read_entry(name).unwrap(), data);
            let rec = reader.entry(name).unwrap();
            prop_assert_eq!(rec.codec.is_compressed(), *compress);
            prop_assert!(rec.start_offset >= prefix.len() as u64);
            stored.insert(rec.start_offset, rec.end_offset());
        }
        let index_offset = reader.trailer().index_offset;
        let mut prev_end = prefix.len() as u64;
        for (start, end) in stored {
            prop_assert!(start >= prev_end);
            prop_assert!(end <= index_offset);
            prev_end = end;
        }
    }
}
