//! Error type for the statement store.
//!
//! Every public operation fails with one of four categories. Validation and
//! state errors are the caller's to fix; I/O errors leave the store usable
//! after a rollback; fatal errors mean the store has been or must be closed.

use crate::storage::btree::TreeError;
use crate::storage::io::StorageError;
use crate::storage::metaroot::MetarootError;

/// The category of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    State,
    Io,
    Fatal,
}

/// The low-level failure behind [`StoreError::Io`].
#[derive(Debug)]
pub enum IoSource {
    Storage(StorageError),
    Tree(TreeError),
    Metaroot(MetarootError),
}

impl std::fmt::Display for IoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "{e}"),
            Self::Tree(e) => write!(f, "{e}"),
            Self::Metaroot(e) => write!(f, "{e}"),
        }
    }
}

impl From<StorageError> for IoSource {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<TreeError> for IoSource {
    fn from(e: TreeError) -> Self {
        Self::Tree(e)
    }
}

impl From<MetarootError> for IoSource {
    fn from(e: MetarootError) -> Self {
        Self::Metaroot(e)
    }
}

/// Errors returned by the statement store and its evaluators.
#[derive(Debug)]
pub enum StoreError {
    /// Bad input: node id range, mask, prefix length, column count.
    Validation(String),
    /// Call made in the wrong state: uninitialized store, double prepare,
    /// unknown phase number.
    State(String),
    /// I/O failure, with the operation that was running.
    Io { operation: String, source: IoSource },
    /// Internal inconsistency or a failed commit. The store is closed.
    Fatal(String),
}

impl StoreError {
    /// Wrap a low-level failure with the operation that hit it.
    ///
    /// A poisoned index file lock is fatal rather than an I/O failure.
    pub fn io(operation: impl Into<String>, source: impl Into<IoSource>) -> Self {
        let operation = operation.into();
        match source.into() {
            IoSource::Tree(TreeError::Poisoned) => {
                Self::Fatal(format!("{operation}: index file lock poisoned"))
            }
            source => Self::Io { operation, source },
        }
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::State(_) => ErrorCategory::State,
            Self::Io { .. } => ErrorCategory::Io,
            Self::Fatal(_) => ErrorCategory::Fatal,
        }
    }

    pub(crate) fn poisoned() -> Self {
        Self::Fatal("statement store lock poisoned".to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "invalid argument: {msg}"),
            Self::State(msg) => write!(f, "illegal state: {msg}"),
            Self::Io { operation, source } => write!(f, "I/O error during {operation}: {source}"),
            Self::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => match source {
                IoSource::Storage(e) => Some(e),
                IoSource::Tree(e) => Some(e),
                IoSource::Metaroot(e) => Some(e),
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_io_error_keeps_operation_and_source() {
        let e = StoreError::io(
            "insert (1 2 3 4) into SPOG",
            StorageError::InjectedFault("disk full".to_string()),
        );
        assert_eq!(e.category(), ErrorCategory::Io);
        let message = e.to_string();
        assert!(message.contains("insert (1 2 3 4) into SPOG"));
        assert!(message.contains("disk full"));
        assert!(e.source().is_some());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            StoreError::Validation("x".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(StoreError::State("x".into()).category(), ErrorCategory::State);
        assert_eq!(StoreError::poisoned().category(), ErrorCategory::Fatal);
    }

    #[test]
    fn test_poisoned_index_file_is_fatal() {
        let e = StoreError::io("insert (1 2 3 4) into SPOG", TreeError::Poisoned);
        assert_eq!(e.category(), ErrorCategory::Fatal);
        assert!(e.to_string().contains("insert (1 2 3 4) into SPOG"));
    }
}
