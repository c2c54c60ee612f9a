//! Storage engine for the statement store.
//!
//! # File Format
//!
//! A store named `xa` is kept in seven files of 8KB pages:
//!
//! - `xa.g`: the metaroot, two slots recording committed phases
//! - `xa.g_0123` ... `xa.g_3201`: one index file per ordering, each holding
//!   a copy-on-write B-tree per live phase
//! - `xa.g.lock`: present while the store is open
//!
//! # Usage
//!
//! ```ignore
//! use quadstore::storage::{FileProvider, StorageProvider};
//!
//! let provider = FileProvider::new("/var/lib/quads")?;
//! let mut storage = provider.open("xa.g_0123")?;
//! let first = storage.allocate_pages(1)?;
//! storage.sync()?;
//! ```

pub(crate) mod allocator;
pub mod btree;
pub(crate) mod file;
pub mod index_file;
pub(crate) mod io;
pub mod metaroot;
pub(crate) mod page;

pub use allocator::PageAllocator;
pub use file::{FileProvider, FileStorage};
pub use index_file::IndexFile;
pub use io::{Storage, StorageError, StorageProvider, StoreLock};
pub use metaroot::{Metaroot, MetarootError, MetarootSlot, MetarootStatus};
pub use page::{PAGE_SIZE, PAGE_SIZE_U64, Page, PageError, PageHeader, PageId, PageType};
