//! Offset resolution: rewriting the offset table into typed references
//!
//! Every slot of a BRES offset table stores a relative offset. Resolution
//! subtracts the file's origin and classifies the result against the region
//! boundaries of the file (header, offset table, string table, unremovable
//! data, removable chunks), producing a [`ResolvedRef`] per slot. Offsets
//! that land beyond the file's own size refer to a related external file
//! and are resolved against the [`ResolveContext`] the caller owns.
//!
//! Classification never fails the load: a slot that cannot be placed
//! cleanly is recorded on the table's ambiguous list and logged, matching
//! the format's never-refuse-to-load heritage while keeping the fallback
//! observable.

use super::header::{FileHeader, BRES_SIGNATURE, OFFSET_SLOT_SIZE};
use super::loader::RemovableSet;
use super::strings::StringStorage;
use crate::{Error, Result};

/// Per-chunk info pair from the removable section: size and cumulative
/// offset, in file order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    /// Chunk payload size in bytes
    pub size: u32,
    /// Cumulative offset of the chunk, in the same space as resolved offsets
    pub cumulative_offset: u32,
}

/// A fully classified offset-table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedRef {
    /// The file header itself (slot 0 by convention)
    Header,
    /// Byte offset into the main buffer (header plus unremovable data)
    Main(u32),
    /// Another offset-table slot
    Slot(u32),
    /// Extracted string, by index into the file's string storage
    Str(u32),
    /// Offset within a removable chunk
    Removable {
        /// Owning chunk index
        chunk: u32,
        /// Byte offset within that chunk
        offset: u32,
    },
    /// Reference into a related external file
    External {
        /// External-file slot the reference selects
        slot: u8,
        /// File-relative offset within that file
        offset: u32,
    },
    /// Classification fell through; the raw file-relative offset is kept
    Ambiguous(u32),
}

/// One resolution applied one indirection level deeper than its slot
///
/// Slots may chain: a slot resolves into a removable chunk whose word at the
/// target is itself an offset needing removable correction. The chain result
/// is recorded here rather than patched into the chunk bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndirectFixup {
    /// Slot whose target holds the chained offset
    pub slot: u32,
    /// Classification of the chained offset
    pub target: ResolvedRef,
}

/// The resolved offset table
#[derive(Debug, Default)]
pub struct ResolvedTable {
    refs: Vec<ResolvedRef>,
    ambiguous: Vec<u32>,
    indirect: Vec<IndirectFixup>,
}

impl ResolvedTable {
    /// Classified reference for a slot
    pub fn get(&self, slot: u32) -> Option<&ResolvedRef> {
        self.refs.get(slot as usize)
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Whether the table has no slots
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Iterate over all classified references
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedRef> {
        self.refs.iter()
    }

    /// Slots whose classification used the best-effort fallback
    pub fn ambiguous_slots(&self) -> &[u32] {
        &self.ambiguous
    }

    /// Whether a slot's classification used the fallback
    pub fn is_ambiguous(&self, slot: u32) -> bool {
        self.ambiguous.contains(&slot)
    }

    /// Chained one-level-deeper resolutions
    pub fn indirect_fixups(&self) -> &[IndirectFixup] {
        &self.indirect
    }

    fn push(&mut self, r: ResolvedRef) {
        self.refs.push(r);
    }

    fn mark_ambiguous(&mut self, slot: u32) {
        self.ambiguous.push(slot);
    }
}

/// Binding of one resolved file to an external-file slot
#[derive(Debug, Clone, Copy)]
pub struct SlotBinding {
    /// The bound file's origin value
    pub origin: u32,
    /// The bound file's declared size
    pub file_size: u32,
    /// End of its offset-table region
    pub offset_table_end: u32,
    /// End of its string-table region
    pub string_table_end: u32,
}

/// Caller-owned context for resolving cross-file references
///
/// Holds the two external-file slot bindings selected by the origin top
/// bit. A pair of related files shares one context: the self-contained file
/// resolves first and binds its slot, then the split file resolves its
/// external references against that binding. Independent pairs use
/// independent contexts and can load concurrently.
#[derive(Debug, Default)]
pub struct ResolveContext {
    slots: [Option<SlotBinding>; 2],
}

impl ResolveContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Binding for a slot, if a file has been resolved into it
    pub fn binding(&self, slot: usize) -> Option<&SlotBinding> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    fn bind(&mut self, slot: usize, binding: SlotBinding) {
        self.slots[slot] = Some(binding);
    }
}

/// Where the raw offset table lives
#[derive(Debug)]
pub enum OffsetSource<'a> {
    /// Slots were read into their own buffer; string extraction is allowed
    Extracted(&'a [u32]),
    /// Slots live inside the file's full byte image; every slot converts
    /// directly without region classification
    InPlace(&'a [u8]),
}

/// Outcome of a resolution pass
#[derive(Debug)]
pub struct Resolution {
    /// The classified offset table
    pub table: ResolvedTable,
    /// Strings extracted while resolving
    pub strings: StringStorage,
    /// True when the header was already marked resolved and nothing ran
    pub skipped: bool,
}

/// Resolve a file's offset table
///
/// Re-validates the signature, honors the version resolved-flag
/// (resolution is idempotent), classifies every slot, then binds the file's
/// bounds into the context slot selected by its origin top bit.
pub fn resolve(
    header: &mut FileHeader,
    offsets: OffsetSource<'_>,
    string_table: Option<&[u8]>,
    chunk_info: &[ChunkInfo],
    removable: &RemovableSet,
    ctx: &mut ResolveContext,
) -> Result<Resolution> {
    if header.signature != BRES_SIGNATURE {
        return Err(Error::invalid_signature("BRES signature lost before resolution"));
    }

    if header.is_resolved() {
        log::debug!("offset table already resolved, skipping");
        return Ok(Resolution {
            table: ResolvedTable::default(),
            strings: StringStorage::new(),
            skipped: true,
        });
    }

    let resolution = match offsets {
        OffsetSource::Extracted(slots) => {
            resolve_extracted(header, slots, string_table, chunk_info, removable, ctx)?
        }
        OffsetSource::InPlace(image) => {
            if string_table.is_some() {
                return Err(Error::invalid_format(
                    "string table must be absent when the offset table is resolved in place",
                ));
            }
            resolve_in_place(header, image)?
        }
    };

    header.mark_resolved();
    Ok(resolution)
}

fn resolve_extracted(
    header: &FileHeader,
    slots: &[u32],
    string_table: Option<&[u8]>,
    chunk_info: &[ChunkInfo],
    removable: &RemovableSet,
    ctx: &mut ResolveContext,
) -> Result<Resolution> {
    let header_size = header.size_of_header;
    let file_size = header.size_of_file;
    let origin = header.origin;

    let offset_table_end = header_size + header.num_offsets * OFFSET_SLOT_SIZE;
    let string_table_end = match string_table {
        Some(table) => offset_table_end + table.len() as u32,
        None => offset_table_end,
    };
    // file offset where the removable section begins
    let removable_boundary = file_size
        .checked_sub(header.size_of_removable_chunk + header.size_of_dynamic_chunk)
        .ok_or_else(|| Error::truncated("removable section larger than the file"))?;
    // bytes pulled out of the main buffer (offset table + extracted strings)
    let table_bytes = string_table_end - header_size;

    // bind before the pass so the other file of a related pair can already
    // see this file's bounds
    ctx.bind(
        header.external_slot(),
        SlotBinding {
            origin,
            file_size,
            offset_table_end,
            string_table_end,
        },
    );

    let mut table = ResolvedTable::default();
    let mut strings = StringStorage::new();

    for (index, &raw) in slots.iter().enumerate() {
        let slot = index as u32;
        let offptr = raw.wrapping_sub(origin);

        // beyond this file entirely: a reference into the related file
        if offptr > file_size {
            let ext_slot = (offptr >> 31) as usize;
            let ext_offset = raw.wrapping_sub((ext_slot as u32) << 31);
            if ctx.binding(ext_slot).is_some() {
                table.push(ResolvedRef::External {
                    slot: ext_slot as u8,
                    offset: ext_offset,
                });
            } else {
                log::warn!(
                    "slot {slot} references unbound external file slot {ext_slot} (offset {ext_offset:#x})"
                );
                table.mark_ambiguous(slot);
                table.push(ResolvedRef::Ambiguous(offptr));
            }
            continue;
        }

        let resolved = if offptr >= offset_table_end {
            if offptr < string_table_end && string_table.is_some() {
                extract_string(
                    slot,
                    offptr - offset_table_end,
                    string_table.unwrap_or(&[]),
                    &mut strings,
                    &mut table,
                )
            } else if offptr > removable_boundary {
                let r = classify_removable(slot, offptr, removable_boundary, chunk_info, &mut table);
                chain_removable(slot, &r, origin, removable_boundary, chunk_info, removable, &mut table);
                r
            } else {
                // plain data: the tables were pulled out of the main buffer,
                // so the in-buffer position shifts down by their size
                let main_offset = offptr - table_bytes;
                ResolvedRef::Main(main_offset)
            }
        } else if offptr == 0 {
            ResolvedRef::Header
        } else if offptr < header_size {
            ResolvedRef::Main(offptr)
        } else if (offptr - header_size) % OFFSET_SLOT_SIZE == 0 {
            ResolvedRef::Slot((offptr - header_size) / OFFSET_SLOT_SIZE)
        } else {
            log::warn!("slot {slot} points between offset-table slots ({offptr:#x})");
            table.mark_ambiguous(slot);
            ResolvedRef::Ambiguous(offptr)
        };

        table.push(resolved);
    }

    Ok(Resolution {
        table,
        strings,
        skipped: false,
    })
}

/// Extract the length-prefixed string the offset points at
fn extract_string(
    slot: u32,
    string_offset: u32,
    string_table: &[u8],
    strings: &mut StringStorage,
    table: &mut ResolvedTable,
) -> ResolvedRef {
    let at = string_offset as usize;
    if at < 4 || at > string_table.len() {
        log::warn!("slot {slot} points before the first string length prefix");
        table.mark_ambiguous(slot);
        return ResolvedRef::Ambiguous(string_offset);
    }

    let len_bytes: [u8; 4] = match string_table[at - 4..at].try_into() {
        Ok(bytes) => bytes,
        Err(_) => {
            table.mark_ambiguous(slot);
            return ResolvedRef::Ambiguous(string_offset);
        }
    };
    let len = u32::from_le_bytes(len_bytes) as usize;

    match string_table.get(at..at + len) {
        Some(bytes) => ResolvedRef::Str(strings.push(bytes)),
        None => {
            log::warn!(
                "slot {slot} declares a {len}-byte string past the string table end"
            );
            table.mark_ambiguous(slot);
            ResolvedRef::Ambiguous(string_offset)
        }
    }
}

/// Place an offset inside its owning removable chunk
///
/// The candidate index comes from the format's recovery arithmetic; when it
/// names a real chunk whose recorded span contains the offset it is used
/// directly, otherwise the spans are scanned linearly and the slot is
/// recorded as ambiguous.
fn classify_removable(
    slot: u32,
    offptr: u32,
    removable_boundary: u32,
    chunk_info: &[ChunkInfo],
    table: &mut ResolvedTable,
) -> ResolvedRef {
    if chunk_info.is_empty() {
        log::warn!("slot {slot} points past the unremovable data but no chunks exist");
        table.mark_ambiguous(slot);
        return ResolvedRef::Ambiguous(offptr);
    }

    let rel = offptr - removable_boundary;
    let candidate = rel.wrapping_sub(4) / 8;

    if let Some(info) = chunk_info.get(candidate as usize) {
        if span_contains(chunk_info, candidate as usize, offptr) {
            return ResolvedRef::Removable {
                chunk: candidate,
                offset: offptr.wrapping_sub(info.cumulative_offset),
            };
        }
    }

    let chunk = scan_spans(chunk_info, offptr);
    log::warn!(
        "slot {slot} required a span scan to place offset {offptr:#x} (candidate {candidate}, chose chunk {chunk})"
    );
    table.mark_ambiguous(slot);
    ResolvedRef::Removable {
        chunk: chunk as u32,
        offset: offptr.wrapping_sub(chunk_info[chunk].cumulative_offset),
    }
}

/// Apply the removable correction one indirection level deeper
///
/// When the word stored at a removable target is itself an offset into the
/// removable region, its classification is recorded as an indirect fixup.
fn chain_removable(
    slot: u32,
    resolved: &ResolvedRef,
    origin: u32,
    removable_boundary: u32,
    chunk_info: &[ChunkInfo],
    removable: &RemovableSet,
    table: &mut ResolvedTable,
) {
    let ResolvedRef::Removable { chunk, offset } = *resolved else {
        return;
    };
    let Some(bytes) = removable.chunk(chunk as usize) else {
        return;
    };
    let at = offset as usize;
    let Some(word) = bytes.get(at..at + 4) else {
        return;
    };
    let word: [u8; 4] = match word.try_into() {
        Ok(word) => word,
        Err(_) => return,
    };

    let chained = u32::from_le_bytes(word).wrapping_sub(origin);
    if chained > removable_boundary && !chunk_info.is_empty() {
        let target_chunk = scan_spans(chunk_info, chained);
        table.indirect.push(IndirectFixup {
            slot,
            target: ResolvedRef::Removable {
                chunk: target_chunk as u32,
                offset: chained.wrapping_sub(chunk_info[target_chunk].cumulative_offset),
            },
        });
    }
}

/// Whether chunk `index`'s recorded span contains the offset
fn span_contains(chunk_info: &[ChunkInfo], index: usize, offptr: u32) -> bool {
    let start = chunk_info[index].cumulative_offset;
    let end = match chunk_info.get(index + 1) {
        Some(next) => next.cumulative_offset,
        None => start.saturating_add(chunk_info[index].size),
    };
    offptr > start && offptr <= end
}

/// Linear span scan; defaults to the last chunk when nothing matches
fn scan_spans(chunk_info: &[ChunkInfo], offptr: u32) -> usize {
    let mut chunk = 0;
    while chunk < chunk_info.len() - 1 {
        if offptr > chunk_info[chunk].cumulative_offset
            && offptr < chunk_info[chunk + 1].cumulative_offset
        {
            break;
        }
        chunk += 1;
    }
    chunk
}

/// In-place resolution: the offset table still lives inside the file image
///
/// No region classification runs; every slot (and, beyond slot 0, the word
/// at its target) converts directly into a position relative to the header.
fn resolve_in_place(header: &FileHeader, image: &[u8]) -> Result<Resolution> {
    let header_size = header.size_of_header as usize;
    let mut table = ResolvedTable::default();

    for index in 0..header.num_offsets {
        let slot = index;
        let at = header_size + (index as usize) * OFFSET_SLOT_SIZE as usize;
        let Some(word) = image.get(at..at + 4) else {
            return Err(Error::truncated("offset table ends past the file image"));
        };
        let raw = u32::from_le_bytes(word.try_into().unwrap_or([0; 4]));

        if raw == 0 {
            table.push(ResolvedRef::Header);
            continue;
        }
        if (raw as usize) >= image.len() {
            log::warn!("slot {slot} points past the file image ({raw:#x})");
            table.mark_ambiguous(slot);
            table.push(ResolvedRef::Ambiguous(raw));
            continue;
        }
        table.push(ResolvedRef::Main(raw));

        // beyond slot 0 the target itself holds one more offset to convert
        if index > 0 {
            if let Some(word) = image.get(raw as usize..raw as usize + 4) {
                let deeper = u32::from_le_bytes(word.try_into().unwrap_or([0; 4]));
                table.indirect.push(IndirectFixup {
                    slot,
                    target: ResolvedRef::Main(deeper),
                });
            }
        }
    }

    Ok(Resolution {
        table,
        strings: StringStorage::new(),
        skipped: false,
    })
}
