//! Stream abstractions consumed by the archive reader and BDAE loader
//!
//! The core only needs a seekable byte source with a name and a known size.
//! Three implementations are provided: a buffered disk file, an owned memory
//! buffer (what entry extraction returns), and a constrained window over an
//! already opened stream.

use crate::Result;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// Byte source consumed by the archive reader and the BDAE loader
pub trait ResStream: Read + Seek + Send {
    /// Name of the underlying resource (file name or entry name)
    fn name(&self) -> &str;

    /// Total size of the stream in bytes
    fn size(&self) -> u64;
}

/// Buffered read-only view of a file on disk
#[derive(Debug)]
pub struct FileStream {
    name: String,
    size: u64,
    inner: BufReader<File>,
}

impl FileStream {
    /// Open a file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            name: path.to_string_lossy().into_owned(),
            size,
            inner: BufReader::new(file),
        })
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl ResStream for FileStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Owned in-memory byte buffer exposed as a stream
///
/// Entry extraction hands decompressed bytes back through this type, so the
/// BDAE loader can consume archive entries and loose files the same way.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    name: String,
    cursor: Cursor<Vec<u8>>,
}

impl MemoryStream {
    /// Wrap an owned buffer
    pub fn new<S: Into<String>>(name: S, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            cursor: Cursor::new(data),
        }
    }

    /// Borrow the underlying bytes
    pub fn as_slice(&self) -> &[u8] {
        self.cursor.get_ref()
    }

    /// Consume the stream, returning the underlying buffer
    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryStream {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl ResStream for MemoryStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }
}

/// Constrained view of an already opened stream
///
/// The window starts at the inner stream's position at construction time and
/// spans `len` bytes. Useful for handing out one region of a container
/// without copying it.
#[derive(Debug)]
pub struct WindowStream<S> {
    name: String,
    inner: S,
    start: u64,
    len: u64,
    pos: u64,
}

impl<S: ResStream> WindowStream<S> {
    /// Create a window over `inner` beginning at its current position
    pub fn new<N: Into<String>>(mut inner: S, len: u64, name: N) -> Result<Self> {
        let start = inner.stream_position()?;
        Ok(Self {
            name: name.into(),
            inner,
            start,
            len,
            pos: 0,
        })
    }
}

impl<S: ResStream> Read for WindowStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(remaining) as usize;
        self.inner.seek(SeekFrom::Start(self.start + self.pos))?;
        let n = self.inner.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<S: ResStream> Seek for WindowStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(d) => self.pos as i64 + d,
            SeekFrom::End(d) => self.len as i64 + d,
        };
        if target < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of window",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

impl<S: ResStream> ResStream for WindowStream<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.len
    }
}
