//! PACK-flavor container scan
//!
//! The PACK index is the memory-optimized variant: entries keep only a name
//! hash, a position, and the handful of fields needed to open them. The
//! preferred path reads the end-of-central-directory record and then
//! re-reads each entry's local header to recover the compression metadata
//! the condensed central directory walk would otherwise leave behind. The
//! fallback is a linear local-header scan that records only position and
//! name; metadata is filled lazily on first open.

use super::wire::{self, CentralDirHeader};
use super::{ArchiveEntry, ArchiveOptions};
use crate::io::ResStream;
use crate::Result;
use std::io::{Cursor, Read, Seek, SeekFrom};

/// Check whether a stream starts with either accepted local signature
///
/// The stream position is restored afterwards.
pub fn is_archive(stream: &mut dyn ResStream) -> Result<bool> {
    let pos = stream.stream_position()?;
    let mut magic = [0u8; 4];
    let valid = match stream.read_exact(&mut magic) {
        Ok(()) => {
            let sig = u32::from_le_bytes(magic);
            sig == wire::LOCAL_SIG || sig == wire::LOCAL_SIG_ALT
        }
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(e.into()),
    };
    stream.seek(SeekFrom::Start(pos))?;
    Ok(valid)
}

/// Scan a PACK-flavor stream into an (unsorted) entry list
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

/// Central-directory walk with per-entry local header re-reads
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

        let header_pos = u64::from(header.local_header_offset);
        let mut entry = ArchiveEntry::new(name, options, header_pos);

        // slow per entry, but accelerates dynamic loading later: the local
        // header already carries everything first open would have to fetch
        stream.seek(SeekFrom::Start(header_pos))?;
        let Some(scanned) = wire::read_local_entry(stream)? else {
            return Ok(None);
        };
        entry.fill_from_scanned(&scanned);
        entries.push(entry);
    }

    Ok(Some(entries))
}

/// Linear fallback: record position and name only, defer metadata
fn scan_local_headers(
    stream: &mut dyn ResStream,
    options: &ArchiveOptions,
) -> Result<Vec<ArchiveEntry>> {
    stream.seek(SeekFrom::Start(0))?;
    let mut entries = Vec::new();

    while let Some(scanned) = wire::read_local_entry(stream)? {
        entries.push(ArchiveEntry::new(
            scanned.name.clone(),
            options,
            scanned.header_pos,
        ));
        stream.seek(SeekFrom::Current(i64::from(scanned.compressed_size)))?;
    }

    Ok(entries)
}
