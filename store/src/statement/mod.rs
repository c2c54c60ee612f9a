//! The statement store: quads kept in six index orderings, read and written
//! through phases.

pub(crate) mod error;
pub(crate) mod ordering;
pub(crate) mod phase;
pub(crate) mod read_only;
pub(crate) mod source;
pub(crate) mod store;
pub(crate) mod tuples;

pub use error::{ErrorCategory, IoSource, StoreError};
pub use ordering::{
    IndexOrder, MASK_ALL, MASK_GRAPH, MASK_OBJECT, MASK_PREDICATE, MASK_SUBJECT, Mask, mask_for,
    mask_of,
};
pub use phase::{Generation, IndexRoot, PhaseRegistry, PhaseRoots, PhaseToken};
pub use read_only::ReadOnlyStatementStore;
pub use source::StatementSource;
pub use store::{StatementStore, StoreOptions, index_file_name};
pub use tuples::{StoreTuples, Tuples, collect_rows};
