//! The metaroot file: two alternating slots recording committed phases.
//!
//! # Slot Layout
//!
//! Each slot is one raw page (no page header, so that flipping the valid
//! flag is a single small write):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | magic `0xa5e7f2e1` |
//! | 4 | 4 | format version |
//! | 8 | 4 | valid flag (0 or 1) |
//! | 12 | 4 | phase number |
//! | 16 | 96 | six (root page `u64`, statement count `u64`) records |
//!
//! Index roots are stored in SPOG, POSG, OSPG, GSPO, GPOS, GOSP order.

use crate::statement::phase::{IndexRoot, PhaseRoots};
use crate::storage::io::{Storage, StorageError};
use crate::storage::page::Page;

/// Magic number at the start of each slot.
pub const METAROOT_MAGIC: u32 = 0xa5e7_f2e1;

/// Current metaroot format version.
pub const METAROOT_VERSION: u32 = 1;

/// Number of slots (and pages) in a metaroot file.
pub const SLOT_COUNT: usize = 2;

const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 4;
const VALID_OFFSET: usize = 8;
const PHASE_NUMBER_OFFSET: usize = 12;
const ROOTS_OFFSET: usize = 16;
const ROOT_RECORD_SIZE: usize = 16;

/// Contents of one metaroot slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetarootSlot {
    pub valid: bool,
    pub phase_number: u32,
    pub roots: PhaseRoots,
}

impl MetarootSlot {
    fn from_page(page: &Page) -> Self {
        let mut roots = PhaseRoots::default();
        for (i, root) in roots.0.iter_mut().enumerate() {
            let offset = ROOTS_OFFSET + i * ROOT_RECORD_SIZE;
            *root = IndexRoot {
                root: page.read_u64(offset),
                count: page.read_u64(offset + 8),
            };
        }
        Self {
            valid: page.read_u32(VALID_OFFSET) != 0,
            phase_number: page.read_u32(PHASE_NUMBER_OFFSET),
            roots,
        }
    }

    fn to_page(&self) -> Page {
        let mut page = Page::new();
        page.write_u32(MAGIC_OFFSET, METAROOT_MAGIC);
        page.write_u32(VERSION_OFFSET, METAROOT_VERSION);
        page.write_u32(VALID_OFFSET, u32::from(self.valid));
        page.write_u32(PHASE_NUMBER_OFFSET, self.phase_number);
        for (i, root) in self.roots.0.iter().enumerate() {
            let offset = ROOTS_OFFSET + i * ROOT_RECORD_SIZE;
            page.write_u64(offset, root.root);
            page.write_u64(offset + 8, root.count);
        }
        page
    }
}

/// What was found in a metaroot file when it was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetarootStatus {
    /// Empty or the wrong length; needs [`Metaroot::initialize`].
    Uninitialized,
    /// Written by this format version.
    Compatible,
    /// Written by something else. Must not be read.
    Incompatible,
}

/// The metaroot file of one store.
pub struct Metaroot {
    storage: Box<dyn Storage>,
}

impl Metaroot {
    #[must_use]
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Check the file length and the header of the first slot.
    pub fn status(&mut self) -> Result<MetarootStatus, MetarootError> {
        if self.storage.total_pages() != SLOT_COUNT as u64 {
            return Ok(MetarootStatus::Uninitialized);
        }
        match self.check_header(0) {
            Ok(()) => Ok(MetarootStatus::Compatible),
            Err(MetarootError::InvalidMagic(_) | MetarootError::UnsupportedVersion(_)) => {
                Ok(MetarootStatus::Incompatible)
            }
            Err(e) => Err(e),
        }
    }

    /// Reset the file to two invalid slots.
    pub fn initialize(&mut self) -> Result<(), MetarootError> {
        self.storage.truncate(0)?;
        self.storage.allocate_pages(SLOT_COUNT as u64)?;
        let empty = MetarootSlot::default().to_page();
        for slot in 0..SLOT_COUNT {
            self.storage.write_page(slot as u64, &empty)?;
        }
        self.storage.sync()?;
        Ok(())
    }

    /// Read a slot, checking its magic and version.
    pub fn read_slot(&mut self, slot: usize) -> Result<MetarootSlot, MetarootError> {
        let page = self.read_page(slot)?;
        check_page_header(&page)?;
        Ok(MetarootSlot::from_page(&page))
    }

    /// Write a whole slot. Not durable until [`Self::force`].
    pub fn write_slot(&mut self, slot: usize, contents: &MetarootSlot) -> Result<(), MetarootError> {
        Self::check_slot(slot)?;
        self.storage.write_page(slot as u64, &contents.to_page())?;
        Ok(())
    }

    /// Set or clear the valid flag of a slot, keeping the rest.
    pub fn set_valid(&mut self, slot: usize, valid: bool) -> Result<(), MetarootError> {
        let mut page = self.read_page(slot)?;
        page.write_u32(MAGIC_OFFSET, METAROOT_MAGIC);
        page.write_u32(VERSION_OFFSET, METAROOT_VERSION);
        page.write_u32(VALID_OFFSET, u32::from(valid));
        self.storage.write_page(slot as u64, &page)?;
        Ok(())
    }

    /// Make all slot writes durable.
    pub fn force(&mut self) -> Result<(), MetarootError> {
        self.storage.sync()?;
        Ok(())
    }

    fn check_header(&mut self, slot: usize) -> Result<(), MetarootError> {
        let page = self.read_page(slot)?;
        check_page_header(&page)
    }

    fn read_page(&mut self, slot: usize) -> Result<Page, MetarootError> {
        Self::check_slot(slot)?;
        Ok(self.storage.read_page(slot as u64)?)
    }

    const fn check_slot(slot: usize) -> Result<(), MetarootError> {
        if slot >= SLOT_COUNT {
            return Err(MetarootError::InvalidSlot(slot));
        }
        Ok(())
    }
}

fn check_page_header(page: &Page) -> Result<(), MetarootError> {
    let magic = page.read_u32(MAGIC_OFFSET);
    if magic != METAROOT_MAGIC {
        return Err(MetarootError::InvalidMagic(magic));
    }
    let version = page.read_u32(VERSION_OFFSET);
    if version != METAROOT_VERSION {
        return Err(MetarootError::UnsupportedVersion(version));
    }
    Ok(())
}

/// Errors reading or writing the metaroot.
#[derive(Debug)]
pub enum MetarootError {
    InvalidMagic(u32),
    UnsupportedVersion(u32),
    InvalidSlot(usize),
    Storage(StorageError),
}

impl std::fmt::Display for MetarootError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMagic(magic) => write!(f, "invalid metaroot magic: {magic:#010x}"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported metaroot version: {v}"),
            Self::InvalidSlot(slot) => write!(f, "invalid metaroot slot: {slot}"),
            Self::Storage(e) => write!(f, "metaroot storage error: {e}"),
        }
    }
}

impl std::error::Error for MetarootError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for MetarootError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::FileStorage;
    use tempfile::tempdir;

    fn open(dir: &std::path::Path) -> Metaroot {
        Metaroot::new(Box::new(
            FileStorage::open(&dir.join("xa.g")).expect("open metaroot"),
        ))
    }

    #[test]
    fn test_fresh_file_needs_initialization() {
        let dir = tempdir().expect("create temp dir");
        let mut metaroot = open(dir.path());
        assert_eq!(metaroot.status().expect("status"), MetarootStatus::Uninitialized);

        metaroot.initialize().expect("initialize");
        assert_eq!(metaroot.status().expect("status"), MetarootStatus::Compatible);
        assert!(!metaroot.read_slot(0).expect("slot 0").valid);
        assert!(!metaroot.read_slot(1).expect("slot 1").valid);
    }

    #[test]
    fn test_slot_round_trip_survives_reopen() {
        let dir = tempdir().expect("create temp dir");
        let mut roots = PhaseRoots::default();
        roots.0[4] = IndexRoot { root: 17, count: 3 };
        let slot = MetarootSlot {
            valid: false,
            phase_number: 42,
            roots,
        };
        {
            let mut metaroot = open(dir.path());
            metaroot.initialize().expect("initialize");
            metaroot.write_slot(1, &slot).expect("write");
            metaroot.set_valid(1, true).expect("validate");
            metaroot.force().expect("force");
        }

        let mut metaroot = open(dir.path());
        let read = metaroot.read_slot(1).expect("read");
        assert!(read.valid);
        assert_eq!(read.phase_number, 42);
        assert_eq!(read.roots, roots);
    }

    #[test]
    fn test_foreign_file_is_incompatible() {
        let dir = tempdir().expect("create temp dir");
        let mut storage = FileStorage::open(&dir.path().join("xa.g")).expect("open");
        storage.allocate_pages(2).expect("allocate");
        let mut page = Page::new();
        page.write_u32(MAGIC_OFFSET, 0xdead_beef);
        storage.write_page(0, &page).expect("write");

        let mut metaroot = Metaroot::new(Box::new(storage));
        assert_eq!(metaroot.status().expect("status"), MetarootStatus::Incompatible);
        assert!(matches!(
            metaroot.read_slot(0),
            Err(MetarootError::InvalidMagic(0xdead_beef))
        ));
        assert!(matches!(
            metaroot.read_slot(2),
            Err(MetarootError::InvalidSlot(2))
        ));
    }
}
