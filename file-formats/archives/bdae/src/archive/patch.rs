//! Patch overlay: merge update archives into a primary index
//!
//! A [`PatchArchive`] wraps a primary [`Archive`] and any number of patch
//! archives of the same flavor. Merging a patch walks its entries: names
//! absent from the primary are appended; names already present have only
//! their location redirected: the primary copy's name, sizes, and method
//! stay as they were, while its bytes now come from the patch. This updates
//! a shipped container in place without rewriting it.

use super::{Archive, ArchiveKind, ArchiveOptions, ArchiveEntry, EntryLocation};
use crate::io::{MemoryStream, ResStream};
use crate::{Error, Result};

/// Most patch archives addressable by one overlay
pub const MAX_PATCH_ARCHIVES: usize = 0x7FFF;

/// Most entries addressable within one patch archive
pub const MAX_PATCH_ENTRIES: usize = 0xFFFF;

/// A primary archive with merged patch overlays
#[derive(Debug)]
pub struct PatchArchive {
    primary: Archive,
    patches: Vec<Archive>,
}

impl PatchArchive {
    /// Open the primary archive
    pub fn open(
        stream: Box<dyn ResStream>,
        kind: ArchiveKind,
        options: ArchiveOptions,
    ) -> Result<Self> {
        Ok(Self {
            primary: Archive::open(stream, kind, options)?,
            patches: Vec::new(),
        })
    }

    /// Merge a patch archive into the primary index
    ///
    /// The patch is opened with the primary's flavor and normalization
    /// options so its lookup keys line up with the primary index.
    pub fn add_patch(&mut self, stream: Box<dyn ResStream>) -> Result<()> {
        if self.patches.len() >= MAX_PATCH_ARCHIVES {
            return Err(Error::CapacityExceeded(format!(
                "patch archive limit of {MAX_PATCH_ARCHIVES} reached"
            )));
        }

        let patch = Archive::open(stream, self.primary.kind(), self.primary.options())?;
        if patch.len() > MAX_PATCH_ENTRIES {
            return Err(Error::CapacityExceeded(format!(
                "patch archive {} has {} entries, more than the addressable {MAX_PATCH_ENTRIES}",
                patch.name(),
                patch.len()
            )));
        }

        let patch_no = self.patches.len() as u16;
        let mut need_sort = false;

        for local_index in 0..patch.len() {
            let Some(info) = patch.entry(local_index) else {
                continue;
            };
            let location = EntryLocation::Redirected {
                patch: patch_no,
                index: local_index as u16,
            };
            match self.primary.find_entry_key(&info.key) {
                Some(existing) => self.primary.set_location(existing, location),
                None => {
                    need_sort = true;
                    let mut entry: ArchiveEntry = info.clone();
                    entry.location = location;
                    self.primary.push_entry(entry);
                }
            }
        }

        if need_sort {
            self.primary.resort();
        }

        log::debug!(
            "merged patch {} ({} entries) as overlay {patch_no}",
            patch.name(),
            patch.len()
        );
        self.patches.push(patch);
        Ok(())
    }

    /// Open an entry by name from wherever its bytes live
    pub fn open_file(&mut self, name: &str) -> Result<MemoryStream> {
        let index = self
            .primary
            .find_entry(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        match self.primary.entry(index).map(|e| e.location) {
            Some(EntryLocation::Local { .. }) => self.primary.open_entry(index),
            Some(EntryLocation::Redirected { patch, index }) => self
                .patches
                .get_mut(patch as usize)
                .ok_or_else(|| {
                    Error::invalid_format(format!("redirect to unknown patch archive {patch}"))
                })?
                .open_entry(index as usize),
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    /// Find an entry by name in the merged index
    pub fn find_entry(&self, name: &str) -> Option<usize> {
        self.primary.find_entry(name)
    }

    /// Whether the merged index contains an entry
    pub fn contains(&self, name: &str) -> bool {
        self.primary.find_entry(name).is_some()
    }

    /// The primary archive and its merged index
    pub fn primary(&self) -> &Archive {
        &self.primary
    }

    /// Number of merged patch archives
    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }
}
