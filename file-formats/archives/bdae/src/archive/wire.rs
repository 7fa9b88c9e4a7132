//! ZIP wire structures shared by the container scanners
//!
//! Both archive flavors use the standard ZIP record layout: local file
//! headers in front of each entry's data, an optional central directory, and
//! a trailing end-of-central-directory record. Local headers additionally
//! accept a proprietary alternate signature. When bit 3 of the general
//! purpose flag is set, a 12-byte data descriptor sits between the local
//! header's variable fields and the entry data, and carries the authoritative
//! CRC and sizes.

use crate::io::ResStream;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

/// Standard local file header signature (`PK\x03\x04`)
pub const LOCAL_SIG: u32 = 0x0403_4b50;

/// Proprietary alternate local header signature (`GBMP`)
pub const LOCAL_SIG_ALT: u32 = 0x504d_4247;

/// Central directory file header signature (`PK\x01\x02`)
pub const CENTRAL_SIG: u32 = 0x0201_4b50;

/// End of central directory signature (`PK\x05\x06`)
pub const END_CENTRAL_SIG: u32 = 0x0605_4b50;

/// General purpose flag bit 3: sizes live in a data descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Fixed portion of a local file header, in bytes
pub const LOCAL_HEADER_LEN: u32 = 30;

/// Fixed portion of a central directory header, in bytes
pub const CENTRAL_HEADER_LEN: usize = 46;

/// End of central directory record length, in bytes
pub const END_CENTRAL_LEN: u64 = 22;

/// Data descriptor length (CRC + compressed + uncompressed), in bytes
pub const DATA_DESCRIPTOR_LEN: u32 = 12;

/// Local file header (fixed fields)
#[derive(Debug, Clone, Copy)]
pub struct LocalFileHeader {
    /// Header signature
    pub signature: u32,
    /// Minimum version needed to extract
    pub version_to_extract: u16,
    /// General purpose bit flag
    pub flags: u16,
    /// Compression method
    pub method: u16,
    /// Last modification time (DOS format)
    pub mod_time: u16,
    /// Last modification date (DOS format)
    pub mod_date: u16,
    /// CRC-32 of the uncompressed data
    pub crc32: u32,
    /// Compressed data size
    pub compressed_size: u32,
    /// Uncompressed data size
    pub uncompressed_size: u32,
    /// File name length
    pub name_len: u16,
    /// Extra field length
    pub extra_len: u16,
}

impl LocalFileHeader {
    /// Read the fixed fields from the current position
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            signature: reader.read_u32::<LittleEndian>()?,
            version_to_extract: reader.read_u16::<LittleEndian>()?,
            flags: reader.read_u16::<LittleEndian>()?,
            method: reader.read_u16::<LittleEndian>()?,
            mod_time: reader.read_u16::<LittleEndian>()?,
            mod_date: reader.read_u16::<LittleEndian>()?,
            crc32: reader.read_u32::<LittleEndian>()?,
            compressed_size: reader.read_u32::<LittleEndian>()?,
            uncompressed_size: reader.read_u32::<LittleEndian>()?,
            name_len: reader.read_u16::<LittleEndian>()?,
            extra_len: reader.read_u16::<LittleEndian>()?,
        })
    }

    /// Check the signature against both accepted local header magics
    pub fn has_valid_signature(&self) -> bool {
        self.signature == LOCAL_SIG || self.signature == LOCAL_SIG_ALT
    }

    /// Whether a data descriptor follows the variable fields
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }
}

/// Central directory file header (fixed fields)
#[derive(Debug, Clone, Copy)]
pub struct CentralDirHeader {
    /// Header signature
    pub signature: u32,
    /// Version that produced the entry
    pub version_made_by: u16,
    /// Minimum version needed to extract
    pub version_to_extract: u16,
    /// General purpose bit flag
    pub flags: u16,
    /// Compression method
    pub method: u16,
    /// Last modification time (DOS format)
    pub mod_time: u16,
    /// Last modification date (DOS format)
    pub mod_date: u16,
    /// CRC-32 of the uncompressed data
    pub crc32: u32,
    /// Compressed data size
    pub compressed_size: u32,
    /// Uncompressed data size
    pub uncompressed_size: u32,
    /// File name length
    pub name_len: u16,
    /// Extra field length
    pub extra_len: u16,
    /// File comment length
    pub comment_len: u16,
    /// Disk number where the entry starts
    pub disk_start: u16,
    /// Internal file attributes
    pub internal_attrs: u16,
    /// External file attributes
    pub external_attrs: u32,
    /// Offset of the entry's local header from the start of the archive
    pub local_header_offset: u32,
}

impl CentralDirHeader {
    /// Read the fixed fields from the current position
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            signature: reader.read_u32::<LittleEndian>()?,
            version_made_by: reader.read_u16::<LittleEndian>()?,
            version_to_extract: reader.read_u16::<LittleEndian>()?,
            flags: reader.read_u16::<LittleEndian>()?,
            method: reader.read_u16::<LittleEndian>()?,
            mod_time: reader.read_u16::<LittleEndian>()?,
            mod_date: reader.read_u16::<LittleEndian>()?,
            crc32: reader.read_u32::<LittleEndian>()?,
            compressed_size: reader.read_u32::<LittleEndian>()?,
            uncompressed_size: reader.read_u32::<LittleEndian>()?,
            name_len: reader.read_u16::<LittleEndian>()?,
            extra_len: reader.read_u16::<LittleEndian>()?,
            comment_len: reader.read_u16::<LittleEndian>()?,
            disk_start: reader.read_u16::<LittleEndian>()?,
            internal_attrs: reader.read_u16::<LittleEndian>()?,
            external_attrs: reader.read_u32::<LittleEndian>()?,
            local_header_offset: reader.read_u32::<LittleEndian>()?,
        })
    }
}

/// End of central directory record
#[derive(Debug, Clone, Copy)]
pub struct EndOfCentralDir {
    /// Record signature
    pub signature: u32,
    /// Number of this disk
    pub this_disk: u16,
    /// Disk where the central directory starts
    pub start_disk: u16,
    /// Central directory entries on this disk
    pub entries_this_disk: u16,
    /// Total central directory entries
    pub entries_total: u16,
    /// Central directory size in bytes
    pub dir_size: u32,
    /// Central directory offset from the start of the archive
    pub dir_offset: u32,
    /// Archive comment length
    pub comment_len: u16,
}

impl EndOfCentralDir {
    /// Read the record from the current position
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            signature: reader.read_u32::<LittleEndian>()?,
            this_disk: reader.read_u16::<LittleEndian>()?,
            start_disk: reader.read_u16::<LittleEndian>()?,
            entries_this_disk: reader.read_u16::<LittleEndian>()?,
            entries_total: reader.read_u16::<LittleEndian>()?,
            dir_size: reader.read_u32::<LittleEndian>()?,
            dir_offset: reader.read_u32::<LittleEndian>()?,
            comment_len: reader.read_u16::<LittleEndian>()?,
        })
    }
}

/// One local record scanned from the stream
///
/// `local_header_size` covers the fixed header, name, extra field, and the
/// data descriptor when present; the entry data starts at
/// `header_pos + local_header_size`.
#[derive(Debug, Clone)]
pub(crate) struct ScannedLocal {
    pub header_pos: u64,
    pub local_header_size: u32,
    pub method: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name: String,
}

/// Read one local record at the stream's current position
///
/// Returns `Ok(None)` when the signature does not match (end of the local
/// header run). On success the stream is left at the start of the entry
/// data.
pub(crate) fn read_local_entry(stream: &mut dyn ResStream) -> Result<Option<ScannedLocal>> {
    let header_pos = stream.stream_position()?;

    let mut fixed = [0u8; LOCAL_HEADER_LEN as usize];
    match stream.read_exact(&mut fixed) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let mut header = LocalFileHeader::read(&mut &fixed[..])?;
    if !header.has_valid_signature() {
        return Ok(None);
    }

    let mut name_bytes = vec![0u8; header.name_len as usize];
    stream.read_exact(&mut name_bytes)?;
    let name = String::from_utf8_lossy(&name_bytes).into_owned();

    if header.extra_len > 0 {
        stream.seek(SeekFrom::Current(i64::from(header.extra_len)))?;
    }

    let mut local_header_size =
        LOCAL_HEADER_LEN + u32::from(header.name_len) + u32::from(header.extra_len);

    // bit 3: the descriptor preceding the data holds the real sizes
    if header.has_data_descriptor() {
        header.crc32 = stream.read_u32::<LittleEndian>()?;
        header.compressed_size = stream.read_u32::<LittleEndian>()?;
        header.uncompressed_size = stream.read_u32::<LittleEndian>()?;
        local_header_size += DATA_DESCRIPTOR_LEN;
    }

    Ok(Some(ScannedLocal {
        header_pos,
        local_header_size,
        method: header.method,
        crc32: header.crc32,
        compressed_size: header.compressed_size,
        uncompressed_size: header.uncompressed_size,
        name,
    }))
}

/// Read the end-of-central-directory record, if present
///
/// Looks at the fixed trailing position; archives with a trailing comment
/// fall back to the sequential scan instead.
pub(crate) fn read_end_of_central_dir(stream: &mut dyn ResStream) -> Result<Option<EndOfCentralDir>> {
    let size = stream.size();
    if size < END_CENTRAL_LEN {
        return Ok(None);
    }
    stream.seek(SeekFrom::Start(size - END_CENTRAL_LEN))?;
    let record = EndOfCentralDir::read(stream)?;
    if record.signature != END_CENTRAL_SIG {
        return Ok(None);
    }
    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStream;

    fn local_header_bytes(method: u16, flags: u16, data: &[u8], name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&LOCAL_SIG.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes()); // version
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&method.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // time
        out.extend_from_slice(&0u16.to_le_bytes()); // date
        out.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra
        out.extend_from_slice(name.as_bytes());
        out
    }

    #[test]
    fn test_read_local_entry() {
        let mut bytes = local_header_bytes(0, 0, b"hello", "a.txt");
        bytes.extend_from_slice(b"hello");
        let mut stream = MemoryStream::new("t", bytes);

        let scanned = read_local_entry(&mut stream).unwrap().unwrap();
        assert_eq!(scanned.header_pos, 0);
        assert_eq!(scanned.name, "a.txt");
        assert_eq!(scanned.method, 0);
        assert_eq!(scanned.uncompressed_size, 5);
        assert_eq!(scanned.local_header_size, LOCAL_HEADER_LEN + 5);

        // stream now sits on the entry data
        assert_eq!(stream.stream_position().unwrap(), u64::from(scanned.local_header_size));
    }

    #[test]
    fn test_read_local_entry_bad_signature() {
        let mut stream = MemoryStream::new("t", vec![0u8; 64]);
        assert!(read_local_entry(&mut stream).unwrap().is_none());
    }

    #[test]
    fn test_end_of_central_dir_absent() {
        let mut stream = MemoryStream::new("t", vec![0u8; 64]);
        assert!(read_end_of_central_dir(&mut stream).unwrap().is_none());
    }
}
