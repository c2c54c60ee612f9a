//! Sessions: the unit of work an XA resource prepares and commits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::statement::{ReadOnlyStatementStore, StatementStore, StoreError};

/// The work behind a transaction branch.
pub trait ResolverSession: Send + Sync {
    /// Move read-only views to the latest committed phase.
    fn refresh(&self) -> Result<(), StoreError>;

    fn prepare(&self) -> Result<(), StoreError>;

    fn commit(&self) -> Result<(), StoreError>;

    fn rollback(&self) -> Result<(), StoreError>;

    /// Let go of every phase held for reading.
    fn release(&self) -> Result<(), StoreError>;

    /// Phase numbers that could be selected after a restart.
    fn recover(&self) -> Result<Vec<u32>, StoreError>;
}

/// A session over one writable store and the read-only views handed out
/// from it.
pub struct StoreSession {
    store: StatementStore,
    views: Mutex<Vec<Arc<ReadOnlyStatementStore>>>,
}

impl StoreSession {
    #[must_use]
    pub fn new(store: StatementStore) -> Self {
        Self {
            store,
            views: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &StatementStore {
        &self.store
    }

    /// A view of the committed phase, refreshed with the session.
    pub fn read_only(&self) -> Result<Arc<ReadOnlyStatementStore>, StoreError> {
        let view = Arc::new(self.store.new_read_only()?);
        self.views
            .lock()
            .map_err(|_| StoreError::poisoned())?
            .push(Arc::clone(&view));
        Ok(view)
    }

    fn views(&self) -> Result<Vec<Arc<ReadOnlyStatementStore>>, StoreError> {
        Ok(self.views.lock().map_err(|_| StoreError::poisoned())?.clone())
    }
}

impl ResolverSession for StoreSession {
    fn refresh(&self) -> Result<(), StoreError> {
        let views = self.views()?;
        debug!(views = views.len(), "refreshing session");
        for view in views {
            view.refresh()?;
        }
        Ok(())
    }

    fn prepare(&self) -> Result<(), StoreError> {
        self.store.prepare()
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.store.commit()
    }

    fn rollback(&self) -> Result<(), StoreError> {
        self.store.rollback()
    }

    fn release(&self) -> Result<(), StoreError> {
        for view in self.views()? {
            if let Err(e) = view.release() {
                warn!(error = %e, "failed to release read-only view");
            }
        }
        Ok(())
    }

    fn recover(&self) -> Result<Vec<u32>, StoreError> {
        self.store.recover()
    }
}

/// A shared session plus the mark that coalesces prepares across the
/// branches using it.
///
/// Clones share the session and the mark.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<dyn ResolverSession>,
    preparing: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn new(session: Arc<dyn ResolverSession>) -> Self {
        Self {
            session,
            preparing: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn session(&self) -> &dyn ResolverSession {
        self.session.as_ref()
    }

    /// Set the preparing mark. False if another branch already set it.
    pub(crate) fn begin_prepare(&self) -> bool {
        !self.preparing.swap(true, Ordering::AcqRel)
    }

    /// Clear the preparing mark. True if this call cleared it.
    pub(crate) fn end_prepare(&self) -> bool {
        self.preparing.swap(false, Ordering::AcqRel)
    }

    /// True if both handles share one session.
    #[must_use]
    pub fn same_session(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.preparing, &other.preparing)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("preparing", &self.preparing.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
