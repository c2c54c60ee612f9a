//! Page storage abstraction.
//!
//! Every file the store owns (the metaroot and the six index files) is
//! accessed through the [`Storage`] trait, obtained from a
//! [`StorageProvider`]. Production code uses files on disk; tests use the
//! simulated disk, which can inject faults and lose unsynced writes.
//!
//! Implementations must ensure:
//! - `read_page` returns the last written content for a page
//! - `sync` makes all previous writes durable
//! - `allocate_pages` extends the file and returns the first new page id

use std::path::PathBuf;

use crate::storage::page::{Page, PageId};

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// Page out of bounds.
    PageOutOfBounds { page_id: PageId, total_pages: u64 },
    /// Injected fault for simulation.
    InjectedFault(String),
    /// Corruption detected.
    Corruption(String),
    /// The store's files are in use by another instance.
    Locked(PathBuf),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::PageOutOfBounds {
                page_id,
                total_pages,
            } => write!(
                f,
                "page {page_id} out of bounds (total pages: {total_pages})"
            ),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
            Self::Corruption(msg) => write!(f, "corruption: {msg}"),
            Self::Locked(path) => write!(f, "store is locked: {}", path.display()),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Page-granular access to one file.
pub trait Storage: Send {
    /// Name of the file within its store, e.g. `xa.g_0123`.
    fn name(&self) -> &str;

    /// Read a page.
    ///
    /// Pages that were allocated but never written read as zeroes.
    fn read_page(&mut self, page_id: PageId) -> Result<Page, StorageError>;

    /// Write a page. The write may be buffered until `sync` is called.
    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<(), StorageError>;

    /// Make all previous writes durable.
    fn sync(&mut self) -> Result<(), StorageError>;

    /// Extend the file by `count` pages, returning the first new page id.
    fn allocate_pages(&mut self, count: u64) -> Result<PageId, StorageError>;

    /// Current length of the file in pages.
    fn total_pages(&self) -> u64;

    /// Shrink or grow the file to exactly `total_pages` pages.
    fn truncate(&mut self, total_pages: u64) -> Result<(), StorageError>;
}

/// Exclusive claim on a store's files, released on drop.
pub struct StoreLock {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl StoreLock {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for StoreLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLock")
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// Opens the files that make up a store.
pub trait StorageProvider: Send + Sync {
    /// Open a file, creating it empty if it does not exist.
    fn open(&self, file_name: &str) -> Result<Box<dyn Storage>, StorageError>;

    /// Remove a file. Removing a missing file is not an error.
    fn remove(&self, file_name: &str) -> Result<(), StorageError>;

    /// Take the exclusive lock named `file_name`.
    ///
    /// Fails with [`StorageError::Locked`] if it is already held.
    fn lock(&self, file_name: &str) -> Result<StoreLock, StorageError>;
}
