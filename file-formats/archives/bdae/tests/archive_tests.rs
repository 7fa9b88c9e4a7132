//! Container indexing and extraction tests

mod common;

use bdae::{Archive, ArchiveKind, ArchiveOptions, Error, MemoryStream, ResStream};
use common::EntrySpec;
use pretty_assertions::assert_eq;
use std::io::Seek;

fn open_zip(bytes: Vec<u8>, options: ArchiveOptions) -> Archive {
    let stream = MemoryStream::new("test.zip", bytes);
    Archive::open(Box::new(stream), ArchiveKind::Zip, options).expect("archive should open")
}

fn open_pack(bytes: Vec<u8>, options: ArchiveOptions) -> Archive {
    let stream = MemoryStream::new("test.pak", bytes);
    Archive::open(Box::new(stream), ArchiveKind::Pack, options).expect("archive should open")
}

#[test]
fn stored_entry_is_byte_identical() {
    let payload = b"raw stored payload \x00\x01\x02";
    let bytes = common::build_archive(&[EntrySpec::stored("file.bin", payload)], true);
    let mut archive = open_zip(bytes, ArchiveOptions::default());

    let index = archive.find_entry("file.bin").expect("entry indexed");
    let entry_size = archive.entry(index).unwrap().uncompressed_size;
    let opened = archive.open_entry(index).unwrap();

    assert_eq!(opened.as_slice(), payload);
    assert_eq!(opened.size(), u64::from(entry_size));
}

#[test]
fn deflated_entry_round_trips() {
    let payload: Vec<u8> = (0..4096u32).map(|i| (i % 199) as u8).collect();
    let bytes = common::build_archive(&[EntrySpec::deflated("mesh.bdae", &payload)], true);
    let mut archive = open_zip(bytes, ArchiveOptions::default());

    let opened = archive.open_file("mesh.bdae").unwrap();
    assert_eq!(opened.as_slice(), &payload[..]);
}

#[test]
fn lookup_is_case_insensitive() {
    let bytes = common::build_archive(&[EntrySpec::stored("Models/Hero.BDAE", b"data")], true);
    let archive = open_zip(bytes, ArchiveOptions::default());

    let a = archive.find_entry("models/hero.bdae");
    let b = archive.find_entry("MODELS/HERO.BDAE");
    assert!(a.is_some());
    assert_eq!(a, b);
}

#[test]
fn lookup_ignores_paths_when_asked() {
    let bytes = common::build_archive(&[EntrySpec::stored("a/b.txt", b"data")], true);
    let archive = open_zip(bytes, ArchiveOptions { ignore_paths: true });

    let by_path = archive.find_entry("A/B.txt");
    let by_name = archive.find_entry("b.TXT");
    assert!(by_path.is_some());
    assert_eq!(by_path, by_name);

    // with paths honored, the bare name no longer matches
    let bytes = common::build_archive(&[EntrySpec::stored("a/b.txt", b"data")], true);
    let strict = open_zip(bytes, ArchiveOptions::default());
    assert!(strict.find_entry("b.txt").is_none());
    assert!(strict.find_entry("a/b.txt").is_some());
}

#[test]
fn leading_dot_slash_is_stripped_from_queries() {
    let bytes = common::build_archive(&[EntrySpec::stored("dir/file.txt", b"x")], true);
    let archive = open_zip(bytes, ArchiveOptions::default());
    assert!(archive.find_entry("./dir/file.txt").is_some());
}

#[test]
fn central_directory_and_sequential_scan_agree() {
    let entries = [
        EntrySpec::stored("one.txt", b"first"),
        EntrySpec::deflated("two.txt", b"second second second second"),
        EntrySpec::stored("three.txt", b"third"),
    ];

    let with_dir = common::build_archive(&entries, true);
    let without_dir = common::build_archive(&entries, false);

    let mut fast = open_zip(with_dir, ArchiveOptions::default());
    let mut fallback = open_zip(without_dir, ArchiveOptions::default());

    assert_eq!(fast.len(), fallback.len());
    for spec in &entries {
        let a = fast.open_file(spec.name).unwrap();
        let b = fallback.open_file(spec.name).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
        assert_eq!(a.as_slice(), spec.data);
    }
}

#[test]
fn pack_flavor_reads_entries_both_ways() {
    let entries = [
        EntrySpec::stored("a.bin", b"alpha"),
        EntrySpec::deflated("b.bin", b"beta beta beta beta beta"),
    ];

    // central-directory path fills metadata eagerly
    let mut eager = open_pack(common::build_archive(&entries, true), ArchiveOptions::default());
    // fallback path defers it to first open
    let mut lazy = open_pack(common::build_archive(&entries, false), ArchiveOptions::default());

    for spec in &entries {
        assert_eq!(eager.open_file(spec.name).unwrap().as_slice(), spec.data);
        assert_eq!(lazy.open_file(spec.name).unwrap().as_slice(), spec.data);
    }
}

#[test]
fn hash_collisions_resolve_to_the_right_entry() {
    // "xa" and "wn" hash identically under the simple multiplicative hash
    assert_eq!(
        bdae::path::simple_hash("xa"),
        bdae::path::simple_hash("wn")
    );

    let bytes = common::build_archive(
        &[
            EntrySpec::stored("xa", b"first colliding entry"),
            EntrySpec::stored("wn", b"second colliding entry"),
        ],
        true,
    );
    let mut archive = open_zip(bytes, ArchiveOptions::default());

    assert_eq!(
        archive.open_file("xa").unwrap().as_slice(),
        b"first colliding entry"
    );
    assert_eq!(
        archive.open_file("wn").unwrap().as_slice(),
        b"second colliding entry"
    );
}

#[test]
fn missing_entry_reports_not_found() {
    let bytes = common::build_archive(&[EntrySpec::stored("present.txt", b"x")], true);
    let mut archive = open_zip(bytes, ArchiveOptions::default());

    let err = archive.open_file("absent.txt").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn unsupported_method_is_rejected() {
    let bytes = common::build_archive(
        &[EntrySpec {
            name: "imploded.bin",
            data: b"pretend this is imploded",
            method: 6,
        }],
        true,
    );
    let mut archive = open_zip(bytes, ArchiveOptions::default());

    let err = archive.open_file("imploded.bin").unwrap_err();
    assert!(matches!(err, Error::UnsupportedCompression(6)));
}

#[test]
fn probe_recognizes_archives() {
    let bytes = common::build_archive(&[EntrySpec::stored("x", b"y")], true);
    let mut stream = MemoryStream::new("probe", bytes);
    assert!(Archive::probe(&mut stream).unwrap());
    // position restored
    assert_eq!(stream.stream_position().unwrap(), 0);

    let mut garbage = MemoryStream::new("garbage", vec![0xDE, 0xAD, 0xBE, 0xEF, 0]);
    assert!(!Archive::probe(&mut garbage).unwrap());

    let mut tiny = MemoryStream::new("tiny", vec![1, 2]);
    assert!(!Archive::probe(&mut tiny).unwrap());
}

#[test]
fn flavor_probes_distinguish_signatures() {
    let bytes = common::build_archive(&[EntrySpec::stored("x", b"y")], true);
    let mut stream = MemoryStream::new("probe", bytes);
    assert!(bdae::archive::zip::is_archive(&mut stream).unwrap());
    assert!(bdae::archive::pack::is_archive(&mut stream).unwrap());

    let mut garbage = MemoryStream::new("garbage", vec![0; 8]);
    assert!(!bdae::archive::zip::is_archive(&mut garbage).unwrap());
    assert!(!bdae::archive::pack::is_archive(&mut garbage).unwrap());
}

#[test]
fn crc_mismatch_is_not_fatal() {
    // sequential-scan build: the CRC comes from the local header at offset 14
    let mut bytes = common::build_archive(&[EntrySpec::stored("file.bin", b"payload")], false);
    bytes[14] ^= 0xFF;

    let mut archive = open_zip(bytes, ArchiveOptions::default());
    // extraction logs the mismatch but still returns the bytes
    let opened = archive.open_file("file.bin").unwrap();
    assert_eq!(opened.as_slice(), b"payload");
}

#[test]
fn archives_open_from_disk_streams() {
    let bytes = common::build_archive(&[EntrySpec::stored("disk.txt", b"from disk")], true);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.pak");
    std::fs::write(&path, &bytes).unwrap();

    let stream = bdae::FileStream::open(&path).unwrap();
    let mut archive =
        Archive::open(Box::new(stream), ArchiveKind::Pack, ArchiveOptions::default()).unwrap();

    assert_eq!(archive.open_file("disk.txt").unwrap().as_slice(), b"from disk");
}

#[test]
fn empty_archive_has_no_entries() {
    let bytes = common::build_archive(&[], true);
    let archive = open_zip(bytes, ArchiveOptions::default());
    assert!(archive.is_empty());
    assert!(archive.find_entry("anything").is_none());
}
