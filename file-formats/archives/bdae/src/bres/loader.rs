//! BRES section loader
//!
//! Reads a blob in file order (header, offset table, optional string
//! table, unremovable payload, removable chunks), then hands the pieces to
//! the resolver. The resulting [`ResFile`] owns every buffer; references
//! produced by resolution are indices and offsets into them.

use super::header::{FileHeader, HEADER_SIZE, OFFSET_SLOT_SIZE};
use super::resolver::{self, ChunkInfo, OffsetSource, ResolveContext, ResolvedRef, ResolvedTable};
use super::strings::StringStorage;
use crate::io::ResStream;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

/// Related-file name lengths above this are logged as suspicious
const RELATED_NAME_SANE_LIMIT: u32 = 256;

/// Options controlling how a blob is loaded
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Extract the string table into owned storage while resolving
    pub extract_strings: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            extract_strings: true,
        }
    }
}

/// Removable chunk payloads
///
/// Either one allocation per chunk, or a single contiguous block with
/// per-chunk sub-ranges derived from the cumulative offsets.
#[derive(Debug)]
pub enum RemovableSet {
    /// One buffer per chunk
    Separated(Vec<Vec<u8>>),
    /// One block; chunks are `(start, len)` ranges into it
    Single {
        /// The contiguous chunk data
        block: Vec<u8>,
        /// Per-chunk ranges, in file order
        bounds: Vec<(usize, usize)>,
    },
}

impl RemovableSet {
    /// A set with no chunks
    pub fn empty() -> Self {
        RemovableSet::Separated(Vec::new())
    }

    /// Build the separated-allocation form
    pub fn separated(chunks: Vec<Vec<u8>>) -> Self {
        RemovableSet::Separated(chunks)
    }

    /// Build the single-block form
    pub fn single(block: Vec<u8>, bounds: Vec<(usize, usize)>) -> Self {
        RemovableSet::Single { block, bounds }
    }

    /// Number of chunks
    pub fn count(&self) -> usize {
        match self {
            RemovableSet::Separated(chunks) => chunks.len(),
            RemovableSet::Single { bounds, .. } => bounds.len(),
        }
    }

    /// Whether the set holds no chunks
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Borrow one chunk's bytes
    pub fn chunk(&self, index: usize) -> Option<&[u8]> {
        match self {
            RemovableSet::Separated(chunks) => chunks.get(index).map(Vec::as_slice),
            RemovableSet::Single { block, bounds } => {
                let &(start, len) = bounds.get(index)?;
                block.get(start..start + len)
            }
        }
    }
}

/// What a resolved reference points at
#[derive(Debug)]
pub enum Target<'a> {
    /// The file header
    Header(&'a FileHeader),
    /// Bytes in the main buffer or a removable chunk, from the target on
    Bytes(&'a [u8]),
    /// An extracted string
    Str(&'a str),
    /// Another resolved slot
    Slot(&'a ResolvedRef),
}

/// A loaded, resolved BRES file
#[derive(Debug)]
pub struct ResFile {
    header: FileHeader,
    /// Header bytes plus the unremovable payload
    main: Vec<u8>,
    strings: StringStorage,
    removable: RemovableSet,
    table: ResolvedTable,
    related_file: Option<String>,
    /// Bytes of the offset and string tables pulled out of the main buffer
    size_tables: u32,
}

impl ResFile {
    /// Load and resolve a blob from a stream with default options
    pub fn load(stream: &mut dyn ResStream, ctx: &mut ResolveContext) -> Result<Self> {
        Self::load_with_options(stream, ctx, LoadOptions::default())
    }

    /// Load and resolve a blob from a stream
    pub fn load_with_options(
        stream: &mut dyn ResStream,
        ctx: &mut ResolveContext,
        options: LoadOptions,
    ) -> Result<Self> {
        let mut header = FileHeader::read(stream)?;
        log::debug!(
            "loading {}: {} bytes declared, {} offsets, origin {:#x}",
            stream.name(),
            header.size_of_file,
            header.num_offsets,
            header.origin
        );

        // self-contained files may name a related split file
        let related_file = if header.origin == 0 {
            probe_related_file(stream, &header)?
        } else {
            None
        };

        let size_offset_table = header
            .num_offsets
            .checked_mul(OFFSET_SLOT_SIZE)
            .ok_or_else(|| Error::invalid_format("offset count overflows the table size"))?;
        let size_string_table = if options.extract_strings {
            header
                .data_pos
                .checked_sub(header.string_data_pos)
                .ok_or_else(|| Error::invalid_format("string data begins after the data section"))?
        } else {
            0
        };
        let size_tables = size_offset_table + size_string_table;

        let size_unremovable = header
            .size_of_file
            .checked_sub(size_tables)
            .and_then(|s| s.checked_sub(header.size_of_removable_chunk))
            .and_then(|s| s.checked_sub(header.size_of_dynamic_chunk))
            .ok_or_else(|| Error::truncated("declared sections larger than the file"))?;
        if (size_unremovable as usize) < HEADER_SIZE {
            return Err(Error::truncated("unremovable region smaller than the header"));
        }

        // read the file in order: offset table, string table, payload
        stream.seek(SeekFrom::Start(HEADER_SIZE as u64))?;

        let mut offsets = vec![0u32; header.num_offsets as usize];
        stream
            .read_u32_into::<LittleEndian>(&mut offsets)
            .map_err(|_| Error::truncated("offset table"))?;

        let string_table = if size_string_table > 0 {
            let mut buf = vec![0u8; size_string_table as usize];
            stream
                .read_exact(&mut buf)
                .map_err(|_| Error::truncated("string table"))?;
            Some(buf)
        } else {
            None
        };

        let mut main = vec![0u8; size_unremovable as usize];
        main[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        stream
            .read_exact(&mut main[HEADER_SIZE..])
            .map_err(|_| Error::truncated("unremovable payload"))?;

        let (chunk_info, removable) = read_removable(stream, &header)?;

        let resolution = resolver::resolve(
            &mut header,
            OffsetSource::Extracted(&offsets),
            string_table.as_deref(),
            &chunk_info,
            &removable,
            ctx,
        )?;

        // the temporary table buffers and chunk info are fully folded into
        // the resolved table now; keep the header bytes in sync
        main[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

        Ok(Self {
            header,
            main,
            strings: resolution.strings,
            removable,
            table: resolution.table,
            related_file,
            size_tables,
        })
    }

    /// Resolve a blob whose full image is already in memory
    ///
    /// The offset table stays in place inside the image; no string
    /// extraction happens in this mode.
    pub fn from_image(image: Vec<u8>, ctx: &mut ResolveContext) -> Result<Self> {
        let mut header = FileHeader::from_bytes(&image)?;
        let resolution = resolver::resolve(
            &mut header,
            OffsetSource::InPlace(&image),
            None,
            &[],
            &RemovableSet::empty(),
            ctx,
        )?;

        let mut main = image;
        main[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

        Ok(Self {
            header,
            main,
            strings: resolution.strings,
            removable: RemovableSet::empty(),
            table: resolution.table,
            related_file: None,
            size_tables: 0,
        })
    }

    /// The parsed header
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// The resolved offset table
    pub fn table(&self) -> &ResolvedTable {
        &self.table
    }

    /// Strings extracted during resolution
    pub fn strings(&self) -> &StringStorage {
        &self.strings
    }

    /// Removable chunk payloads
    pub fn removable(&self) -> &RemovableSet {
        &self.removable
    }

    /// Name of the related split file, when the header declares one
    pub fn related_file(&self) -> Option<&str> {
        self.related_file.as_deref()
    }

    /// Declared file size
    pub fn size(&self) -> u32 {
        self.header.size_of_file
    }

    /// Whether the file carries a trailing dynamic chunk
    pub fn has_dynamic_content(&self) -> bool {
        self.header.size_of_dynamic_chunk != 0
    }

    /// Resident payload size: declared size minus the dynamic chunk and the
    /// discarded table buffers
    pub fn memory_usage(&self) -> u32 {
        self.header
            .size_of_file
            .saturating_sub(self.header.size_of_dynamic_chunk)
            .saturating_sub(self.size_tables)
    }

    /// Follow a resolved reference to its target
    pub fn deref(&self, reference: &ResolvedRef) -> Option<Target<'_>> {
        match *reference {
            ResolvedRef::Header => Some(Target::Header(&self.header)),
            ResolvedRef::Main(offset) => self.main.get(offset as usize..).map(Target::Bytes),
            ResolvedRef::Slot(slot) => self.table.get(slot).map(Target::Slot),
            ResolvedRef::Str(index) => self.strings.get(index).map(Target::Str),
            ResolvedRef::Removable { chunk, offset } => self
                .removable
                .chunk(chunk as usize)
                .and_then(|bytes| bytes.get(offset as usize..))
                .map(Target::Bytes),
            ResolvedRef::External { .. } | ResolvedRef::Ambiguous(_) => None,
        }
    }

    /// Convert a file-relative offset into this file's offset table to a
    /// slot index
    ///
    /// Lets the owner of a related pair finish resolving an
    /// [`ResolvedRef::External`] reference produced by the other file.
    pub fn slot_for_offset(&self, offset: u32) -> Option<u32> {
        let header_size = self.header.size_of_header;
        let table_end = header_size + self.header.num_offsets * OFFSET_SLOT_SIZE;
        if offset >= header_size && offset < table_end && (offset - header_size) % OFFSET_SLOT_SIZE == 0
        {
            Some((offset - header_size) / OFFSET_SLOT_SIZE)
        } else {
            None
        }
    }
}

/// Probe for a related-file name at the position the header designates
fn probe_related_file(stream: &mut dyn ResStream, header: &FileHeader) -> Result<Option<String>> {
    let begin = header.related_files_pos.wrapping_sub(header.origin);
    if u64::from(begin) + 4 > stream.size() {
        log::warn!("related-files record at {begin:#x} lies past the end of the stream");
        return Ok(None);
    }

    stream.seek(SeekFrom::Start(u64::from(begin)))?;
    let name_size = stream.read_u32::<LittleEndian>()?;

    // a size of one or less means no related file
    if name_size <= 1 {
        return Ok(None);
    }
    if name_size > RELATED_NAME_SANE_LIMIT {
        log::warn!("related-file name size {name_size} exceeds the expected limit");
    }

    // names are stored 4-byte aligned
    let mut buf = vec![0u8; align4(name_size) as usize];
    if stream.read_exact(&mut buf).is_err() {
        log::warn!("related-file name ends past the end of the stream");
        return Ok(None);
    }

    let name_bytes = &buf[..name_size as usize];
    let trimmed: &[u8] = match name_bytes.iter().position(|&b| b == 0) {
        Some(nul) => &name_bytes[..nul],
        None => name_bytes,
    };
    let name = String::from_utf8_lossy(trimmed).into_owned();
    log::debug!("related file: {name}");
    Ok(Some(name))
}

/// Read the removable-chunk info pairs and payloads
fn read_removable(
    stream: &mut dyn ResStream,
    header: &FileHeader,
) -> Result<(Vec<ChunkInfo>, RemovableSet)> {
    if header.size_of_removable_chunk == 0 {
        return Ok((Vec::new(), RemovableSet::empty()));
    }

    let count = header.nb_removable_chunks as usize;
    let mut pairs = vec![0u32; count * 2];
    stream
        .read_u32_into::<LittleEndian>(&mut pairs)
        .map_err(|_| Error::truncated("removable chunk info"))?;
    let chunk_info: Vec<ChunkInfo> = pairs
        .chunks_exact(2)
        .map(|pair| ChunkInfo {
            size: pair[0],
            cumulative_offset: pair[1],
        })
        .collect();

    let removable = if header.separated_allocation() {
        let mut chunks = Vec::with_capacity(count);
        for info in &chunk_info {
            let mut chunk = vec![0u8; info.size as usize];
            stream
                .read_exact(&mut chunk)
                .map_err(|_| Error::truncated("removable chunk data"))?;
            chunks.push(chunk);
        }
        RemovableSet::separated(chunks)
    } else {
        let info_bytes = (count * 2 * 4) as u32;
        let total = header
            .size_of_removable_chunk
            .checked_sub(info_bytes)
            .ok_or_else(|| Error::truncated("removable section smaller than its info table"))?;
        let mut block = vec![0u8; total as usize];
        stream
            .read_exact(&mut block)
            .map_err(|_| Error::truncated("removable chunk data"))?;

        let base = chunk_info.first().map_or(0, |info| info.cumulative_offset);
        let bounds = chunk_info
            .iter()
            .map(|info| {
                (
                    info.cumulative_offset.wrapping_sub(base) as usize,
                    info.size as usize,
                )
            })
            .collect();
        RemovableSet::single(block, bounds)
    };

    Ok((chunk_info, removable))
}

fn align4(value: u32) -> u32 {
    (value + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align4() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(5), 8);
        assert_eq!(align4(13), 16);
    }

    #[test]
    fn test_removable_set_separated() {
        let set = RemovableSet::separated(vec![vec![1, 2, 3], vec![4, 5]]);
        assert_eq!(set.count(), 2);
        assert_eq!(set.chunk(0), Some(&[1u8, 2, 3][..]));
        assert_eq!(set.chunk(1), Some(&[4u8, 5][..]));
        assert_eq!(set.chunk(2), None);
    }

    #[test]
    fn test_removable_set_single_block() {
        let block = vec![1u8, 2, 3, 4, 5, 6];
        let set = RemovableSet::single(block, vec![(0, 2), (2, 4)]);
        assert_eq!(set.count(), 2);
        assert_eq!(set.chunk(0), Some(&[1u8, 2][..]));
        assert_eq!(set.chunk(1), Some(&[3u8, 4, 5, 6][..]));
    }

    #[test]
    fn test_removable_set_empty() {
        let set = RemovableSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.chunk(0), None);
    }
}
