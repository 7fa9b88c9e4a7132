//! # bdae - BDAE Resource Archive Library
//!
//! A safe Rust reader for the BDAE asset pipeline: ZIP/PACK resource
//! containers with dynamic patch overlays, and the BRES offset-resolution
//! engine that turns a loaded blob into a typed, navigable object graph.
//!
//! ## Features
//!
//! - ZIP- and PACK-flavor container indexing (central-directory fast path
//!   with a sequential local-header fallback)
//! - Hash-indexed, collision-safe entry lookup with case- and
//!   path-insensitive names
//! - Patch overlays: merge update archives into a shipped container without
//!   rewriting it
//! - Stored and raw-deflate entry decompression
//! - BRES offset resolution: strings, removable chunks, and cross-file
//!   references classified into typed, relocatable references
//!
//! ## Examples
//!
//! ### Reading a model out of a patched container
//!
//! ```no_run
//! use bdae::{ArchiveKind, ArchiveOptions, FileStream, PatchArchive};
//! use bdae::{ResFile, ResolveContext};
//!
//! # fn main() -> Result<(), bdae::Error> {
//! let base = FileStream::open("data.pak")?;
//! let mut archive = PatchArchive::open(
//!     Box::new(base),
//!     ArchiveKind::Pack,
//!     ArchiveOptions::default(),
//! )?;
//!
//! // updates override entries in the base container
//! let update = FileStream::open("update.pak")?;
//! archive.add_patch(Box::new(update))?;
//!
//! // extract an entry and resolve it
//! let mut entry = archive.open_file("models/hero.bdae")?;
//! let mut ctx = ResolveContext::new();
//! let model = ResFile::load(&mut entry, &mut ctx)?;
//!
//! for name in model.strings().iter() {
//!     println!("{name}");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod archive;
pub mod bres;
pub mod compression;
pub mod error;
pub mod io;
pub mod path;

// Re-export commonly used types
pub use archive::{
    Archive, ArchiveEntry, ArchiveKind, ArchiveOptions, EntryLocation, PatchArchive,
};
pub use bres::{
    FileHeader, ResFile, ResolveContext, ResolvedRef, ResolvedTable, StringStorage,
};
pub use compression::CompressionMethod;
pub use error::{Error, Result};
pub use io::{FileStream, MemoryStream, ResStream, WindowStream};

/// Signature constants of the container and blob formats
pub mod signatures {
    /// Standard ZIP local file header signature (`PK\x03\x04`)
    pub const ZIP_LOCAL: u32 = crate::archive::wire::LOCAL_SIG;

    /// Proprietary alternate local header signature (`GBMP`)
    pub const PACK_LOCAL: u32 = crate::archive::wire::LOCAL_SIG_ALT;

    /// ZIP central directory header signature (`PK\x01\x02`)
    pub const ZIP_CENTRAL: u32 = crate::archive::wire::CENTRAL_SIG;

    /// ZIP end-of-central-directory signature (`PK\x05\x06`)
    pub const ZIP_END_CENTRAL: u32 = crate::archive::wire::END_CENTRAL_SIG;

    /// BRES blob signature (`"BRES"`)
    pub const BRES: [u8; 4] = crate::bres::BRES_SIGNATURE;
}
