//! ZIP-flavor container scan
//!
//! Prefers the end-of-central-directory record: the central directory holds
//! every entry's metadata, so the index is built in one pass without
//! touching the local headers (their sizes are computed lazily on first
//! open). Archives without a valid trailing record fall back to a
//! sequential local-header scan, which fills all metadata eagerly.

use super::wire::{self, CentralDirHeader};
use super::{ArchiveEntry, ArchiveOptions};
use crate::io::ResStream;
use crate::Result;
use std::io::{Cursor, Read, Seek, SeekFrom};

/// Check whether a stream starts with the standard ZIP local signature
///
/// The stream position is restored afterwards.
pub fn is_archive(stream: &mut dyn ResStream) -> Result<bool> {
    let pos = stream.stream_position()?;
    let mut magic = [0u8; 4];
    let valid = match stream.read_exact(&mut magic) {
        Ok(()) => u32::from_le_bytes(magic) == wire::LOCAL_SIG,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(e.into()),
    };
    stream.seek(SeekFrom::Start(pos))?;
    Ok(valid)
}

/// Scan a ZIP-flavor stream into an (unsorted) entry list
pub(crate) fn scan(
    stream: &mut dyn ResStream,
    options: &ArchiveOptions,
) -> Result<Vec<ArchiveEntry>> {
    if let Some(entries) = scan_central_directory(stream, options)? {
        return Ok(entries);
    }
    log::debug!(
        "no end-of-central-directory record in {}, scanning local headers",
        stream.name()
    );
    scan_local_headers(stream, options)
}

/// One-pass index from the central directory
///
/// Returns `Ok(None)` when the trailing record is missing or the directory
/// is inconsistent, so the caller can fall back to the sequential scan.
fn scan_central_directory(
    stream: &mut dyn ResStream,
    options: &ArchiveOptions,
) -> Result<Option<Vec<ArchiveEntry>>> {
    let Some(record) = wire::read_end_of_central_dir(stream)? else {
        return Ok(None);
    };

    stream.seek(SeekFrom::Start(u64::from(record.dir_offset)))?;
    let mut directory = vec![0u8; record.dir_size as usize];
    if stream.read_exact(&mut directory).is_err() {
        return Ok(None);
    }
    let mut cursor = Cursor::new(&directory[..]);

    let total = usize::from(record.entries_total);
    let mut entries = Vec::with_capacity(total);

    for _ in 0..total {
        let header = match CentralDirHeader::read(&mut cursor) {
            Ok(header) if header.signature == wire::CENTRAL_SIG => header,
            _ => return Ok(None),
        };

        let mut name_bytes = vec![0u8; header.name_len as usize];
        if cursor.read_exact(&mut name_bytes).is_err() {
            return Ok(None);
        }
        let name = String::from_utf8_lossy(&name_bytes).into_owned();

        cursor.seek(SeekFrom::Current(
            i64::from(header.extra_len) + i64::from(header.comment_len),
        ))?;

        let mut entry =
            ArchiveEntry::new(name, options, u64::from(header.local_header_offset));
        entry.method = header.method;
        entry.crc32 = header.crc32;
        entry.compressed_size = header.compressed_size;
        entry.uncompressed_size = header.uncompressed_size;
        entries.push(entry);
    }

    Ok(Some(entries))
}

/// Sequential local-header scan, stopping at the first unrecognized signature
fn scan_local_headers(
    stream: &mut dyn ResStream,
    options: &ArchiveOptions,
) -> Result<Vec<ArchiveEntry>> {
    stream.seek(SeekFrom::Start(0))?;
    let mut entries = Vec::new();

    while let Some(scanned) = wire::read_local_entry(stream)? {
        let mut entry = ArchiveEntry::new(scanned.name.clone(), options, scanned.header_pos);
        entry.fill_from_scanned(&scanned);
        entries.push(entry);

        stream.seek(SeekFrom::Current(i64::from(scanned.compressed_size)))?;
    }

    Ok(entries)
}
