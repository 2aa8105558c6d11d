mod common;

use common::{build, dir, is_directory, key, text};
use dbpf::{
    qfs, Compression, CompressionPolicy, Container, DbpfError, Header, IndexEntry, IndexVersion,
    Record, ResourceKey, SaveOptions,
};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Cursor;
use tempfile::{tempdir, NamedTempFile};

type Tuples = BTreeSet<(ResourceKey, Vec<u8>)>;

fn tuples<R: std::io::Read + std::io::Seek>(dbpf: &mut Container<R>) -> Tuples {
    let mut out = BTreeSet::new();
    dbpf.visit(|e, data| {
        out.insert((e.key, data));
    })
    .unwrap();
    out
}

fn sample(version: IndexVersion) -> Vec<u8> {
    let k = |i| {
        let k = key(0x6534_284A, 0x1000, i);
        if version == IndexVersion::V7_1 { k.with_instance2(i * 2) } else { k }
    };
    build(
        version,
        &[
            (k(1), b"plain payload".to_vec()),
            (k(2), qfs::compress(&text(500)).unwrap()),
            (k(3), vec![0xAB; 40]),
            (k(4), qfs::compress(&text(2000)).unwrap()),
        ],
        &[dir(k(2), 500), dir(k(4), 2000)],
    )
}

#[test]
fn test_save_then_reopen_preserves_payloads() {
    for version in [IndexVersion::V7_0, IndexVersion::V7_1] {
        let mut original = Container::open(Cursor::new(sample(version))).unwrap();
        let expected = tuples(&mut original);

        let out = NamedTempFile::new().unwrap();
        let summary = original.save(out.path(), &SaveOptions::default()).unwrap();
        assert_eq!(summary.entries, 4);
        assert_eq!(summary.compressed, 2);
        assert_eq!(summary.bytes, std::fs::metadata(out.path()).unwrap().len());

        let mut reopened = Container::open_path(out.path()).unwrap();
        assert_eq!(reopened.index_version(), version);
        assert_eq!(tuples(&mut reopened), expected);
        let flags: Vec<bool> = reopened.entries().iter().map(|e| e.compressed).collect();
        assert_eq!(flags, [false, true, false, true]);
    }
}

#[test]
fn test_saved_layout_is_top_down() {
    let mut dbpf = Container::open(Cursor::new(sample(IndexVersion::V7_0))).unwrap();
    let mut bytes = Vec::new();
    dbpf.write_to(&mut bytes, &SaveOptions::default()).unwrap();

    let header = Header::from_bytes(&bytes, ()).unwrap();
    assert_eq!(header.index_offset, 96);
    assert_eq!(header.index_count, 5);
    assert_eq!(header.index_size, 5 * 20);
    assert_eq!((header.hole_count, header.hole_offset, header.hole_size), (0, 0, 0));

    let index: Vec<IndexEntry> = (0..5)
        .map(|i| IndexEntry::from_bytes(&bytes[96 + i * 20..], IndexVersion::V7_0).unwrap())
        .collect();
    let mut expected_location = 96 + 100;
    for entry in &index[..4] {
        assert_eq!(entry.location, expected_location);
        expected_location += entry.size;
    }

    let sentinel = &index[4];
    assert!(is_directory(sentinel));
    assert_eq!(sentinel.key, ResourceKey::new(0xE86B_1EEF, 0xE86B_1EEF, 0x286B_1F03));
    assert_eq!(sentinel.location, expected_location);
    assert_eq!(sentinel.size, 2 * 16);
    assert_eq!(bytes.len() as u32, sentinel.location + sentinel.size);

    let tail = &bytes[sentinel.location as usize..];
    let first = dbpf::DirectoryEntry::from_bytes(tail, IndexVersion::V7_0).unwrap();
    assert_eq!(first.key, index[1].key);
    assert_eq!(first.size, 500);
}

#[test]
fn test_directory_sentinel_for_71_carries_second_instance() {
    let mut dbpf = Container::open(Cursor::new(sample(IndexVersion::V7_1))).unwrap();
    let mut bytes = Vec::new();
    dbpf.write_to(&mut bytes, &SaveOptions::default()).unwrap();

    let sentinel = IndexEntry::from_bytes(&bytes[96 + 4 * 24..], IndexVersion::V7_1).unwrap();
    assert_eq!(sentinel.key.instance2_id, Some(0x286B_1F03));
    assert_eq!(sentinel.size, 2 * 20);
}

#[test]
fn test_no_compressed_entries_means_no_directory() {
    let bytes = build(IndexVersion::V7_0, &[(key(1, 2, 3), b"abc".to_vec())], &[]);
    let mut dbpf = Container::open(Cursor::new(bytes)).unwrap();
    let mut out = Vec::new();
    dbpf.write_to(&mut out, &SaveOptions::default()).unwrap();

    let reopened = Container::open(Cursor::new(out)).unwrap();
    assert_eq!(reopened.header().index_count, 1);
    assert!(reopened.directory_entry().is_none());
}

#[test]
fn test_compression_policies() {
    let mut dbpf = Container::open(Cursor::new(sample(IndexVersion::V7_0))).unwrap();
    let expected = tuples(&mut dbpf);

    let mut all = Vec::new();
    let opts = SaveOptions { compression: CompressionPolicy::CompressAll };
    let summary = dbpf.write_to(&mut all, &opts).unwrap();
    // the 13-byte payload cannot shrink; the run of 0xAB can
    assert_eq!(summary.compressed, 3);
    let mut reopened = Container::open(Cursor::new(all)).unwrap();
    assert_eq!(tuples(&mut reopened), expected);

    let mut none = Vec::new();
    let opts = SaveOptions { compression: CompressionPolicy::DecompressAll };
    assert_eq!(dbpf.write_to(&mut none, &opts).unwrap().compressed, 0);
    let mut reopened = Container::open(Cursor::new(none)).unwrap();
    assert!(reopened.directory_entry().is_none());
    assert_eq!(tuples(&mut reopened), expected);
}

#[test]
fn test_pack_new_container_from_scratch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("new.dat");

    let mut dbpf: Container<File> = Container::new(IndexVersion::V7_1);
    let big = dbpf.insert(key(0x8877_7601, 1, 1), text(4096), Compression::Qfs).unwrap().clone();
    assert!(big.compressed);
    assert_eq!(big.key.instance2_id, Some(0));
    let small = dbpf.insert(key(0x8877_7601, 1, 2), b"<a/>".to_vec(), Compression::Qfs).unwrap().clone();
    assert!(!small.compressed);
    assert_eq!(dbpf.payload(&big).unwrap(), text(4096));

    dbpf.save(&path, &SaveOptions::default()).unwrap();

    let mut reopened = Container::open_path(&path).unwrap();
    let entries = reopened.entries().to_vec();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].compressed);
    assert_eq!(reopened.payload(&entries[0]).unwrap(), text(4096));
    assert_eq!(reopened.payload(&entries[1]).unwrap(), b"<a/>");
}

#[test]
fn test_insert_replaces_and_remove_drops() {
    let mut dbpf = Container::open(Cursor::new(sample(IndexVersion::V7_0))).unwrap();
    let target = dbpf.entries()[1].key;

    dbpf.insert(target, b"replacement".to_vec(), Compression::Stored).unwrap();
    assert_eq!(dbpf.entries().len(), 4);
    let replaced = dbpf.entries()[1].clone();
    assert!(!replaced.compressed);
    assert_eq!(dbpf.payload(&replaced).unwrap(), b"replacement");

    let gone = dbpf.entries()[0].key;
    assert!(dbpf.remove(&gone).is_some());
    assert!(dbpf.find(&gone).is_none());

    let mut out = Vec::new();
    dbpf.write_to(&mut out, &SaveOptions::default()).unwrap();
    let mut reopened = Container::open(Cursor::new(out)).unwrap();
    assert_eq!(reopened.entries().len(), 3);
    let first = reopened.entries()[0].clone();
    assert_eq!(reopened.payload(&first).unwrap(), b"replacement");
}

#[test]
fn test_insert_rejects_unrepresentable_keys() {
    let mut dbpf: Container<File> = Container::new(IndexVersion::V7_0);
    assert!(matches!(
        dbpf.insert(key(1, 2, 3).with_instance2(9), vec![1], Compression::Stored),
        Err(DbpfError::KeyShape { .. })
    ));
    assert!(matches!(
        dbpf.insert(ResourceKey::directory(IndexVersion::V7_0), vec![1], Compression::Stored),
        Err(DbpfError::ReservedKey(_))
    ));
}

#[test]
fn test_failed_save_leaves_destination_untouched() {
    // Index entry pointing past the end of the file.
    let mut bytes = build(IndexVersion::V7_0, &[(key(1, 2, 3), b"abc".to_vec())], &[]);
    let index_at = 96 + 3;
    bytes[index_at + 12..index_at + 16].copy_from_slice(&10_000u32.to_le_bytes());
    let mut dbpf = Container::open(Cursor::new(bytes)).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("existing.dat");
    std::fs::write(&path, b"keep me").unwrap();

    assert!(dbpf.save(&path, &SaveOptions::default()).is_err());
    assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_save_always_writes_a_readable_container_version() {
    let mut dbpf: Container<File> = Container::new(IndexVersion::V7_0);
    dbpf.insert(key(1, 2, 3), b"payload".to_vec(), Compression::Stored).unwrap();
    dbpf.header_mut().set_version("2.0").unwrap();
    dbpf.header_mut().set_user_version("3.4").unwrap();

    let mut out = Vec::new();
    dbpf.write_to(&mut out, &SaveOptions::default()).unwrap();

    let mut reopened = Container::open(Cursor::new(out)).unwrap();
    assert_eq!(reopened.header().version(), "1.0");
    assert_eq!(reopened.header().user_version(), "3.4");
    let entry = reopened.entries()[0].clone();
    assert_eq!(reopened.payload(&entry).unwrap(), b"payload");
}
