//! Archive index and entry extraction
//!
//! An [`Archive`] scans a ZIP- or PACK-flavor container once at open time
//! and keeps a compact entry index sorted by name hash. Lookups binary
//! search the hash, then verify the normalized name so hash collisions can
//! never surface the wrong file. Entry data is decompressed on demand into
//! an owned [`MemoryStream`].
//!
//! The underlying stream is shared mutable state (its cursor moves on every
//! read), so every seek+read pair runs under the archive's mutex. The index
//! itself is immutable after construction except for patch-overlay merges.

use crate::io::{MemoryStream, ResStream};
use crate::{Error, Result, compression, path};
use parking_lot::Mutex;
use std::io::{Read, Seek, SeekFrom};

pub mod pack;
pub mod wire;
pub mod zip;

mod patch;

pub use patch::PatchArchive;

/// Container flavor of an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// ZIP-style: full metadata kept per entry
    Zip,
    /// PACK-style: condensed index, metadata re-read from local headers
    Pack,
}

/// Options controlling name normalization of the index
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveOptions {
    /// Strip directory paths from entry names before hashing and lookup
    pub ignore_paths: bool,
}

/// Where an entry's bytes live
///
/// The engine's containers packed this into the 32-bit data-position field:
/// bit 31 flagged a redirect, bits 16-30 held the patch-archive index and
/// bits 0-15 the local index. The explicit form below removes the silent
/// overflow at those widths; [`PatchArchive::add_patch`] validates the
/// limits instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryLocation {
    /// Entry data lives in this archive, behind its local header
    Local {
        /// Offset of the entry's local file header
        header_pos: u64,
    },
    /// Entry data lives in a merged patch archive
    Redirected {
        /// Index of the patch archive
        patch: u16,
        /// Entry index within that patch archive
        index: u16,
    },
}

/// One indexed archive entry
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Entry name as stored in the container
    pub name: String,
    /// Normalized lookup key (case-folded, optionally path-stripped)
    pub(crate) key: String,
    /// Hash of the lookup key
    pub hash: u32,
    /// Where the entry's bytes live
    pub location: EntryLocation,
    /// Compression method
    pub method: u16,
    /// CRC-32 of the uncompressed data (0 when unknown)
    pub crc32: u32,
    /// Compressed size in bytes
    pub compressed_size: u32,
    /// Uncompressed size in bytes
    pub uncompressed_size: u32,
    /// Size of the local header in front of the data; `None` until read
    pub(crate) local_header_size: Option<u32>,
}

impl ArchiveEntry {
    pub(crate) fn new(name: String, options: &ArchiveOptions, header_pos: u64) -> Self {
        let key = path::normalize_name(&name, options.ignore_paths);
        let hash = path::simple_hash(&key);
        Self {
            name,
            key,
            hash,
            location: EntryLocation::Local { header_pos },
            method: 0,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            local_header_size: None,
        }
    }

    pub(crate) fn fill_from_scanned(&mut self, scanned: &wire::ScannedLocal) {
        self.method = scanned.method;
        self.crc32 = scanned.crc32;
        self.compressed_size = scanned.compressed_size;
        self.uncompressed_size = scanned.uncompressed_size;
        self.local_header_size = Some(scanned.local_header_size);
    }
}

/// A scanned archive with its entry index
pub struct Archive {
    name: String,
    kind: ArchiveKind,
    options: ArchiveOptions,
    stream: Mutex<Box<dyn ResStream>>,
    entries: Vec<ArchiveEntry>,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Archive {
    /// Scan a stream and build the sorted entry index
    pub fn open(
        mut stream: Box<dyn ResStream>,
        kind: ArchiveKind,
        options: ArchiveOptions,
    ) -> Result<Self> {
        let name = stream.name().to_string();
        let mut entries = match kind {
            ArchiveKind::Zip => zip::scan(stream.as_mut(), &options)?,
            ArchiveKind::Pack => pack::scan(stream.as_mut(), &options)?,
        };
        sort_entries(&mut entries);
        log::debug!("indexed {} entries from {name}", entries.len());

        Ok(Self {
            name,
            kind,
            options,
            stream: Mutex::new(stream),
            entries,
        })
    }

    /// Check whether a stream starts with a recognized local header signature
    ///
    /// The stream position is restored afterwards. Accepts both flavors;
    /// use [`zip::is_archive`] or [`pack::is_archive`] for a specific one.
    pub fn probe(stream: &mut dyn ResStream) -> Result<bool> {
        pack::is_archive(stream)
    }

    /// Archive name (the underlying stream's name)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Container flavor
    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    /// Name-normalization options the index was built with
    pub fn options(&self) -> ArchiveOptions {
        self.options
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry metadata by index
    pub fn entry(&self, index: usize) -> Option<&ArchiveEntry> {
        self.entries.get(index)
    }

    /// Iterate over all indexed entries
    pub fn entries(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter()
    }

    /// Find an entry by name
    ///
    /// The query is normalized the same way indexed names were (case fold,
    /// optional path strip, leading `./` removed), hashed, and binary
    /// searched; entries with equal hashes are verified by name.
    pub fn find_entry(&self, name: &str) -> Option<usize> {
        let key = path::normalize_name(name, self.options.ignore_paths);
        self.find_entry_key(&key)
    }

    pub(crate) fn find_entry_key(&self, key: &str) -> Option<usize> {
        let hash = path::simple_hash(key);
        let start = self.entries.partition_point(|e| e.hash < hash);
        self.entries[start..]
            .iter()
            .take_while(|e| e.hash == hash)
            .position(|e| e.key == key)
            .map(|offset| start + offset)
    }

    /// Open an entry by name, decompressing its data
    pub fn open_file(&mut self, name: &str) -> Result<MemoryStream> {
        let index = self
            .find_entry(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        self.open_entry(index)
    }

    /// Open an entry by index, decompressing its data
    pub fn open_entry(&mut self, index: usize) -> Result<MemoryStream> {
        if index >= self.entries.len() {
            return Err(Error::NotFound(format!("entry index {index} out of range")));
        }
        if matches!(self.entries[index].location, EntryLocation::Redirected { .. }) {
            return Err(Error::invalid_format(
                "redirected entry must be opened through its patch archive",
            ));
        }

        self.ensure_local_meta(index)?;
        let entry = &self.entries[index];
        let EntryLocation::Local { header_pos } = entry.location else {
            return Err(Error::invalid_format("entry location changed during open"));
        };
        let local_header_size = entry
            .local_header_size
            .ok_or_else(|| Error::invalid_format("local header metadata missing"))?;
        let data_pos = header_pos + u64::from(local_header_size);

        let read_size = match compression::CompressionMethod::from_raw(entry.method) {
            Some(compression::CompressionMethod::Stored) => entry.uncompressed_size,
            Some(compression::CompressionMethod::Deflate) => entry.compressed_size,
            None => return Err(Error::UnsupportedCompression(entry.method)),
        };

        let mut raw = vec![0u8; read_size as usize];
        {
            let mut stream = self.stream.lock();
            stream.seek(SeekFrom::Start(data_pos))?;
            stream.read_exact(&mut raw).map_err(|_| {
                Error::truncated(format!("entry data for {} ends early", entry.name))
            })?;
        }

        let data = compression::decompress(entry.method, &raw, entry.uncompressed_size as usize)?;

        if entry.crc32 != 0 {
            let actual = crc32fast::hash(&data);
            if actual != entry.crc32 {
                log::warn!(
                    "CRC mismatch for {}: expected {:08x}, got {actual:08x}",
                    entry.name,
                    entry.crc32
                );
            }
        }

        Ok(MemoryStream::new(entry.name.clone(), data))
    }

    /// Read the entry's local header if its metadata has not been filled yet
    fn ensure_local_meta(&mut self, index: usize) -> Result<()> {
        if self.entries[index].local_header_size.is_some() {
            return Ok(());
        }
        let EntryLocation::Local { header_pos } = self.entries[index].location else {
            return Err(Error::invalid_format("redirected entry has no local header"));
        };

        let scanned = {
            let mut stream = self.stream.lock();
            stream.seek(SeekFrom::Start(header_pos))?;
            wire::read_local_entry(stream.as_mut())?
        }
        .ok_or_else(|| {
            Error::invalid_signature(format!(
                "bad local header for entry {} in {}",
                self.entries[index].name, self.name
            ))
        })?;

        self.entries[index].fill_from_scanned(&scanned);
        Ok(())
    }

    // Patch-overlay support: the overlay mutates only entry locations and
    // appends entries copied from patch indices.

    pub(crate) fn set_location(&mut self, index: usize, location: EntryLocation) {
        self.entries[index].location = location;
    }

    pub(crate) fn push_entry(&mut self, entry: ArchiveEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn resort(&mut self) {
        sort_entries(&mut self.entries);
    }
}

fn sort_entries(entries: &mut [ArchiveEntry]) {
    entries.sort_by(|a, b| a.hash.cmp(&b.hash).then_with(|| a.key.cmp(&b.key)));
}
