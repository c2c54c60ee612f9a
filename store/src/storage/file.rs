//! File-backed page storage.
//!
//! All files of one store live in a single directory and share a base name:
//! `<name>.g` is the metaroot, `<name>.g_<permutation>` are the six index
//! files and `<name>.g.lock` marks the store as open.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::storage::io::{Storage, StorageError, StorageProvider, StoreLock};
use crate::storage::page::{PAGE_SIZE_U64, Page, PageId};

/// A single page file on disk.
pub struct FileStorage {
    file: File,
    name: String,
    total_pages: u64,
}

impl FileStorage {
    /// Open a file, creating it if missing.
    ///
    /// A trailing partial page (from a torn extension) is ignored.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let total_pages = file.metadata()?.len() / PAGE_SIZE_U64;
        let name = path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());

        Ok(Self {
            file,
            name,
            total_pages,
        })
    }

    fn check_bounds(&self, page_id: PageId) -> Result<(), StorageError> {
        if page_id >= self.total_pages {
            return Err(StorageError::PageOutOfBounds {
                page_id,
                total_pages: self.total_pages,
            });
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_page(&mut self, page_id: PageId) -> Result<Page, StorageError> {
        self.check_bounds(page_id)?;

        let mut page = Page::new();
        self.file.seek(SeekFrom::Start(page_id * PAGE_SIZE_U64))?;
        self.file.read_exact(page.as_bytes_mut())?;
        Ok(page)
    }

    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<(), StorageError> {
        self.check_bounds(page_id)?;

        self.file.seek(SeekFrom::Start(page_id * PAGE_SIZE_U64))?;
        self.file.write_all(page.as_bytes())?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.file.sync_all()?;
        Ok(())
    }

    fn allocate_pages(&mut self, count: u64) -> Result<PageId, StorageError> {
        let first_new_page = self.total_pages;
        let new_total = first_new_page + count;
        self.file.set_len(new_total * PAGE_SIZE_U64)?;
        self.total_pages = new_total;
        Ok(first_new_page)
    }

    fn total_pages(&self) -> u64 {
        self.total_pages
    }

    fn truncate(&mut self, total_pages: u64) -> Result<(), StorageError> {
        self.file.set_len(total_pages * PAGE_SIZE_U64)?;
        self.total_pages = total_pages;
        Ok(())
    }
}

/// Provides the files of stores kept in one directory.
#[derive(Debug, Clone)]
pub struct FileProvider {
    directory: PathBuf,
}

impl FileProvider {
    /// Use `directory`, creating it if needed.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path(&self, file_name: &str) -> PathBuf {
        self.directory.join(file_name)
    }
}

impl StorageProvider for FileProvider {
    fn open(&self, file_name: &str) -> Result<Box<dyn Storage>, StorageError> {
        Ok(Box::new(FileStorage::open(&self.path(file_name))?))
    }

    fn remove(&self, file_name: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path(file_name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn lock(&self, file_name: &str) -> Result<StoreLock, StorageError> {
        let path = self.path(file_name);
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::Locked(path));
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "acquired store lock");

        Ok(StoreLock::new(move || {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove store lock");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_storage_allocate_write_read() {
        let dir = tempdir().expect("create temp dir");
        let mut storage = FileStorage::open(&dir.path().join("test.g_0123")).expect("open");
        assert_eq!(storage.total_pages(), 0);
        assert_eq!(storage.name(), "test.g_0123");

        let first = storage.allocate_pages(3).expect("allocate");
        assert_eq!(first, 0);
        assert_eq!(storage.total_pages(), 3);

        let mut page = Page::new();
        page.write_u64(16, 0xFEED);
        storage.write_page(2, &page).expect("write");
        storage.sync().expect("sync");

        let read = storage.read_page(2).expect("read");
        assert_eq!(read.read_u64(16), 0xFEED);
        assert!(matches!(
            storage.read_page(3),
            Err(StorageError::PageOutOfBounds { page_id: 3, .. })
        ));
    }

    #[test]
    fn test_file_storage_reopen_keeps_length() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("reopen.g");
        {
            let mut storage = FileStorage::open(&path).expect("open");
            storage.allocate_pages(2).expect("allocate");
            storage.sync().expect("sync");
        }
        let mut storage = FileStorage::open(&path).expect("reopen");
        assert_eq!(storage.total_pages(), 2);

        storage.truncate(0).expect("truncate");
        assert_eq!(storage.total_pages(), 0);
    }

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let dir = tempdir().expect("create temp dir");
        let provider = FileProvider::new(dir.path()).expect("provider");

        let lock = provider.lock("xa.g.lock").expect("first lock");
        assert!(matches!(
            provider.lock("xa.g.lock"),
            Err(StorageError::Locked(_))
        ));

        drop(lock);
        let _relocked = provider.lock("xa.g.lock").expect("lock after release");
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let dir = tempdir().expect("create temp dir");
        let provider = FileProvider::new(dir.path()).expect("provider");
        provider.remove("never-created.g").expect("remove");
    }
}
