//! BRES file header parsing

use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

/// BRES blob signature (`"BRES"`)
pub const BRES_SIGNATURE: [u8; 4] = *b"BRES";

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 60;

/// Size of one offset-table slot in bytes
pub const OFFSET_SLOT_SIZE: u32 = 4;

/// Top bit of the version field: set once the offset table has been resolved
pub const VERSION_RESOLVED: u16 = 0x8000;

/// Fixed-size BRES header
///
/// All section positions are stored relative to the file's `origin`; the
/// origin's top bit selects which external-file slot the file binds when
/// cross-file references are resolved.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// 4-byte signature, `"BRES"` for valid files
    pub signature: [u8; 4],
    /// Endianness marker written by the exporter
    pub endian_check: u16,
    /// Format version; the top bit doubles as the resolved flag
    pub version: u16,
    /// Declared header size
    pub size_of_header: u32,
    /// Declared total file size
    pub size_of_file: u32,
    /// Number of offset-table slots
    pub num_offsets: u32,
    /// Base value for converting stored offsets to file-relative ones
    pub origin: u32,
    /// Position of the offset table
    pub offsets_pos: u32,
    /// Position of the string data
    pub string_data_pos: u32,
    /// Position of the data section
    pub data_pos: u32,
    /// Position of the related-files record
    pub related_files_pos: u32,
    /// Position of the removable-chunk info
    pub removable_pos: u32,
    /// Total size of the removable section (info pairs plus chunk data)
    pub size_of_removable_chunk: u32,
    /// Number of removable chunks
    pub nb_removable_chunks: u32,
    /// Nonzero when each removable chunk gets its own allocation
    pub use_separated_allocation: u32,
    /// Size of the trailing dynamic chunk
    pub size_of_dynamic_chunk: u32,
}

impl FileHeader {
    /// Read and validate a header from the given reader
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut signature = [0u8; 4];
        reader
            .read_exact(&mut signature)
            .map_err(|_| Error::truncated("BRES header"))?;
        if signature != BRES_SIGNATURE {
            return Err(Error::invalid_signature(format!(
                "expected BRES, found {:02x?}",
                signature
            )));
        }

        Ok(Self {
            signature,
            endian_check: reader.read_u16::<LittleEndian>()?,
            version: reader.read_u16::<LittleEndian>()?,
            size_of_header: reader.read_u32::<LittleEndian>()?,
            size_of_file: reader.read_u32::<LittleEndian>()?,
            num_offsets: reader.read_u32::<LittleEndian>()?,
            origin: reader.read_u32::<LittleEndian>()?,
            offsets_pos: reader.read_u32::<LittleEndian>()?,
            string_data_pos: reader.read_u32::<LittleEndian>()?,
            data_pos: reader.read_u32::<LittleEndian>()?,
            related_files_pos: reader.read_u32::<LittleEndian>()?,
            removable_pos: reader.read_u32::<LittleEndian>()?,
            size_of_removable_chunk: reader.read_u32::<LittleEndian>()?,
            nb_removable_chunks: reader.read_u32::<LittleEndian>()?,
            use_separated_allocation: reader.read_u32::<LittleEndian>()?,
            size_of_dynamic_chunk: reader.read_u32::<LittleEndian>()?,
        })
    }

    /// Parse a header from the start of a byte slice
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::truncated("BRES header"));
        }
        Self::read(&mut &bytes[..HEADER_SIZE])
    }

    /// Serialize the header back into its wire form
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.signature);
        out[4..6].copy_from_slice(&self.endian_check.to_le_bytes());
        out[6..8].copy_from_slice(&self.version.to_le_bytes());
        let words = [
            self.size_of_header,
            self.size_of_file,
            self.num_offsets,
            self.origin,
            self.offsets_pos,
            self.string_data_pos,
            self.data_pos,
            self.related_files_pos,
            self.removable_pos,
            self.size_of_removable_chunk,
            self.nb_removable_chunks,
            self.use_separated_allocation,
            self.size_of_dynamic_chunk,
        ];
        for (i, word) in words.iter().enumerate() {
            let at = 8 + i * 4;
            out[at..at + 4].copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Whether the offset table has already been resolved
    pub fn is_resolved(&self) -> bool {
        self.version & VERSION_RESOLVED != 0
    }

    /// Mark the offset table as resolved
    pub fn mark_resolved(&mut self) {
        self.version |= VERSION_RESOLVED;
    }

    /// External-file slot this file binds (top bit of the origin)
    pub fn external_slot(&self) -> usize {
        (self.origin >> 31) as usize
    }

    /// Whether removable chunks use one allocation each
    pub fn separated_allocation(&self) -> bool {
        self.use_separated_allocation > 0
    }
}
