//! Shared builders for handcrafted archive and BRES fixtures
#![allow(dead_code)]

use flate2::{Compress, Compression, FlushCompress};

pub const METHOD_STORED: u16 = 0;
pub const METHOD_DEFLATE: u16 = 8;

/// Route log output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const LOCAL_SIG: u32 = 0x0403_4b50;
const CENTRAL_SIG: u32 = 0x0201_4b50;
const END_CENTRAL_SIG: u32 = 0x0605_4b50;

/// One entry to place in a built archive
pub struct EntrySpec<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
    pub method: u16,
}

impl<'a> EntrySpec<'a> {
    pub fn stored(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            method: METHOD_STORED,
        }
    }

    pub fn deflated(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            method: METHOD_DEFLATE,
        }
    }
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Compress with raw deflate (no zlib header), as archive entries are stored
pub fn deflate_raw(data: &[u8]) -> Vec<u8> {
    let mut deflater = Compress::new(Compression::default(), false);
    let mut out = Vec::with_capacity(data.len() + 64);
    deflater
        .compress_vec(data, &mut out, FlushCompress::Finish)
        .expect("deflate of test fixture failed");
    out
}

/// Build archive bytes: local records, optionally followed by a central
/// directory and end-of-central-directory record
pub fn build_archive(entries: &[EntrySpec<'_>], with_central_dir: bool) -> Vec<u8> {
    let mut out = Vec::new();
    let mut placed: Vec<(u32, u32, u32, &EntrySpec<'_>)> = Vec::new();

    for entry in entries {
        let header_pos = out.len() as u32;
        let payload = match entry.method {
            METHOD_DEFLATE => deflate_raw(entry.data),
            _ => entry.data.to_vec(),
        };
        let crc = crc32fast::hash(entry.data);

        push_u32(&mut out, LOCAL_SIG);
        push_u16(&mut out, 20); // version to extract
        push_u16(&mut out, 0); // flags
        push_u16(&mut out, entry.method);
        push_u16(&mut out, 0); // time
        push_u16(&mut out, 0); // date
        push_u32(&mut out, crc);
        push_u32(&mut out, payload.len() as u32);
        push_u32(&mut out, entry.data.len() as u32);
        push_u16(&mut out, entry.name.len() as u16);
        push_u16(&mut out, 0); // extra
        out.extend_from_slice(entry.name.as_bytes());
        out.extend_from_slice(&payload);

        placed.push((header_pos, crc, payload.len() as u32, entry));
    }

    if with_central_dir {
        let dir_offset = out.len() as u32;
        for &(header_pos, crc, compressed_len, entry) in &placed {
            push_u32(&mut out, CENTRAL_SIG);
            push_u16(&mut out, 20); // version made by
            push_u16(&mut out, 20); // version to extract
            push_u16(&mut out, 0); // flags
            push_u16(&mut out, entry.method);
            push_u16(&mut out, 0); // time
            push_u16(&mut out, 0); // date
            push_u32(&mut out, crc);
            push_u32(&mut out, compressed_len);
            push_u32(&mut out, entry.data.len() as u32);
            push_u16(&mut out, entry.name.len() as u16);
            push_u16(&mut out, 0); // extra
            push_u16(&mut out, 0); // comment
            push_u16(&mut out, 0); // disk start
            push_u16(&mut out, 0); // internal attrs
            push_u32(&mut out, 0); // external attrs
            push_u32(&mut out, header_pos);
            out.extend_from_slice(entry.name.as_bytes());
        }
        let dir_size = out.len() as u32 - dir_offset;

        push_u32(&mut out, END_CENTRAL_SIG);
        push_u16(&mut out, 0);
        push_u16(&mut out, 0);
        push_u16(&mut out, placed.len() as u16);
        push_u16(&mut out, placed.len() as u16);
        push_u32(&mut out, dir_size);
        push_u32(&mut out, dir_offset);
        push_u16(&mut out, 0);
    }

    out
}

/// Shape of a BRES blob to build
#[derive(Default)]
pub struct BresSpec {
    pub num_slots: usize,
    /// Strings written to the string table, in order
    pub strings: Vec<Vec<u8>>,
    /// Payload placed after the related-files record
    pub data: Vec<u8>,
    /// Removable chunk payloads
    pub chunks: Vec<Vec<u8>>,
    /// One allocation per chunk instead of a single block
    pub separated: bool,
    /// Name placed in the related-files record
    pub related_file: Option<String>,
}

/// Offsets of a laid-out BRES blob, for constructing slot values
pub struct BresLayout {
    pub offset_table_end: u32,
    /// File-relative target offset of each string (right after its prefix)
    pub string_targets: Vec<u32>,
    /// File-relative offset of the caller's data payload
    pub data_start: u32,
    /// File offset where the removable section begins
    pub removable_boundary: u32,
    /// Cumulative offset recorded for each chunk
    pub chunk_cum: Vec<u32>,
    pub size_of_file: u32,
}

const HEADER_SIZE: u32 = 60;

fn align4(value: u32) -> u32 {
    (value + 3) & !3
}

fn related_record(spec: &BresSpec) -> Vec<u8> {
    let mut record = Vec::new();
    match &spec.related_file {
        None => push_u32(&mut record, 0),
        Some(name) => {
            // size counts the terminator; the name is stored 4-byte aligned
            let size = name.len() as u32 + 1;
            push_u32(&mut record, size);
            record.extend_from_slice(name.as_bytes());
            record.push(0);
            while record.len() % 4 != 0 {
                record.push(0);
            }
        }
    }
    record
}

fn string_table(spec: &BresSpec) -> (Vec<u8>, Vec<u32>) {
    let mut table = Vec::new();
    let mut targets = Vec::new();
    for s in &spec.strings {
        push_u32(&mut table, s.len() as u32);
        targets.push(table.len() as u32);
        table.extend_from_slice(s);
    }
    (table, targets)
}

/// Compute the layout of a blob without building it
pub fn bres_layout(spec: &BresSpec) -> BresLayout {
    let offset_table_end = HEADER_SIZE + spec.num_slots as u32 * 4;
    let (table, raw_targets) = string_table(spec);
    let string_targets = raw_targets
        .iter()
        .map(|t| offset_table_end + t)
        .collect();

    let related = related_record(spec);
    let data_pos = offset_table_end + table.len() as u32;
    let data_start = data_pos + related.len() as u32;
    let data_end = data_start + spec.data.len() as u32;

    let removable_size = if spec.chunks.is_empty() {
        0
    } else {
        spec.chunks.len() as u32 * 8 + spec.chunks.iter().map(|c| c.len() as u32).sum::<u32>()
    };
    let size_of_file = data_end + removable_size;
    let removable_boundary = data_end;

    let mut chunk_cum = Vec::new();
    let mut cum = removable_boundary + spec.chunks.len() as u32 * 8;
    for chunk in &spec.chunks {
        chunk_cum.push(cum);
        cum += chunk.len() as u32;
    }

    BresLayout {
        offset_table_end,
        string_targets,
        data_start,
        removable_boundary,
        chunk_cum,
        size_of_file,
    }
}

/// Build blob bytes with the given slot values
pub fn build_bres(spec: &BresSpec, slots: &[u32]) -> Vec<u8> {
    assert_eq!(slots.len(), spec.num_slots, "slot count mismatch");
    let layout = bres_layout(spec);
    let (table, _) = string_table(spec);
    let related = related_record(spec);

    let data_pos = layout.offset_table_end + table.len() as u32;
    let removable_pos = layout.removable_boundary;
    let removable_size = layout.size_of_file - layout.removable_boundary;

    let mut out = Vec::with_capacity(layout.size_of_file as usize);

    // header
    out.extend_from_slice(b"BRES");
    push_u16(&mut out, 1); // endian check
    push_u16(&mut out, 1); // version
    push_u32(&mut out, HEADER_SIZE);
    push_u32(&mut out, layout.size_of_file);
    push_u32(&mut out, spec.num_slots as u32);
    push_u32(&mut out, 0); // origin
    push_u32(&mut out, HEADER_SIZE); // offset table
    push_u32(&mut out, layout.offset_table_end); // string data
    push_u32(&mut out, data_pos);
    push_u32(&mut out, data_pos); // related files record leads the data
    push_u32(&mut out, removable_pos);
    push_u32(&mut out, removable_size);
    push_u32(&mut out, spec.chunks.len() as u32);
    push_u32(&mut out, u32::from(spec.separated));
    push_u32(&mut out, 0); // dynamic chunk
    assert_eq!(out.len(), HEADER_SIZE as usize);

    for &slot in slots {
        push_u32(&mut out, slot);
    }
    out.extend_from_slice(&table);
    out.extend_from_slice(&related);
    out.extend_from_slice(&spec.data);

    if !spec.chunks.is_empty() {
        for (chunk, &cum) in spec.chunks.iter().zip(&layout.chunk_cum) {
            push_u32(&mut out, chunk.len() as u32);
            push_u32(&mut out, cum);
        }
        for chunk in &spec.chunks {
            out.extend_from_slice(chunk);
        }
    }

    assert_eq!(out.len(), layout.size_of_file as usize);
    out
}

/// Minimal well-formed blob: one slot referring to the header itself
pub fn minimal_bres() -> Vec<u8> {
    let spec = BresSpec {
        num_slots: 1,
        ..Default::default()
    };
    build_bres(&spec, &[0])
}
