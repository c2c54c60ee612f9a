//! The XA resource a transaction manager drives to commit a store session.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error, warn};

use crate::xa::session::SessionHandle;
use crate::xa::xid::{XaError, XaFlags, Xid};

/// Where this resource is in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XaState {
    Unstarted,
    Started,
    Prepared,
    Committed,
    RolledBack,
}

#[derive(Debug)]
struct ResourceState {
    xid: Option<Xid>,
    rollback_only: bool,
    state: XaState,
    timeout_seconds: u32,
}

/// Adapts a [`SessionHandle`] to the XA resource protocol.
///
/// Several resources may share one session; the session is prepared once
/// and committed once however many branches take part.
#[derive(Debug)]
pub struct StatementStoreXaResource {
    session: SessionHandle,
    inner: Mutex<ResourceState>,
}

impl StatementStoreXaResource {
    #[must_use]
    pub fn new(timeout_seconds: u32, session: SessionHandle) -> Self {
        debug!(timeout_seconds, "creating statement store XA resource");
        Self {
            session,
            inner: Mutex::new(ResourceState {
                xid: None,
                rollback_only: false,
                state: XaState::Unstarted,
                timeout_seconds,
            }),
        }
    }

    fn inner(&self) -> Result<MutexGuard<'_, ResourceState>, XaError> {
        self.inner
            .lock()
            .map_err(|_| XaError::ResourceManagerFailure)
    }

    fn set_state(&self, state: XaState) -> Result<(), XaError> {
        let mut inner = self.inner()?;
        debug!(from = ?inner.state, to = ?state, "XA state change");
        inner.state = state;
        Ok(())
    }

    pub fn state(&self) -> Result<XaState, XaError> {
        Ok(self.inner()?.state)
    }

    /// Associate a transaction branch with this resource.
    pub fn start(&self, xid: &Xid, flags: XaFlags) -> Result<(), XaError> {
        debug!(xid = %xid, flags = %flags, "start");
        let mut inner = self.inner()?;
        match flags {
            XaFlags::NO_FLAGS => {
                if let Some(active) = &inner.xid
                    && active != xid
                    && matches!(inner.state, XaState::Started | XaState::Prepared)
                {
                    error!(xid = %xid, active = %active, "start while another transaction is active");
                    return Err(XaError::Protocol);
                }
                self.session.session().refresh().map_err(|e| {
                    error!(error = %e, "failed to obtain phases");
                    XaError::ResourceManagerFailure
                })?;
                inner.xid = Some(xid.clone());
                inner.rollback_only = false;
                inner.state = XaState::Started;
                Ok(())
            }
            XaFlags::JOIN | XaFlags::RESUME => {
                if inner.xid.as_ref() != Some(xid) {
                    error!(xid = %xid, flags = %flags, "join or resume with wrong transaction");
                    return Err(XaError::Invalid);
                }
                Ok(())
            }
            _ => {
                inner.rollback_only = true;
                warn!(xid = %xid, flags = %flags, "unrecognised flags in start");
                Err(XaError::Invalid)
            }
        }
    }

    /// Dissociate a branch. The session keeps its state.
    pub fn end(&self, xid: &Xid, flags: XaFlags) -> Result<(), XaError> {
        debug!(xid = %xid, flags = %flags, "end");
        Ok(())
    }

    /// Fail unless the branch is live and `xid` is the active transaction.
    fn check_active(&self, xid: &Xid, operation: &str) -> Result<(), XaError> {
        let inner = self.inner()?;
        if inner.rollback_only {
            error!(xid = %xid, operation, "transaction is rollback-only");
            return Err(XaError::RollbackOnly);
        }
        if inner.xid.as_ref() != Some(xid) {
            error!(xid = %xid, operation, "unknown transaction");
            return Err(XaError::NotA);
        }
        Ok(())
    }

    pub fn prepare(&self, xid: &Xid) -> Result<(), XaError> {
        debug!(xid = %xid, "prepare");
        self.check_active(xid, "prepare")?;

        if !self.session.begin_prepare() {
            debug!(xid = %xid, "session already prepared in this transaction");
            return self.set_state(XaState::Prepared);
        }
        if let Err(e) = self.session.session().prepare() {
            warn!(xid = %xid, error = %e, "prepare of store failed");
            self.session.end_prepare();
            return Err(XaError::RollbackOnly);
        }
        self.set_state(XaState::Prepared)
    }

    pub fn commit(&self, xid: &Xid, one_phase: bool) -> Result<(), XaError> {
        debug!(xid = %xid, one_phase, "commit");
        if !one_phase {
            let inner = self.inner()?;
            if inner.xid.as_ref() == Some(xid) && inner.state != XaState::Prepared {
                error!(xid = %xid, state = ?inner.state, "commit without a previous prepare");
                return Err(XaError::Protocol);
            }
        }
        let result = self.commit_branch(xid, one_phase);
        if result.is_err() {
            self.session.end_prepare();
        }
        result
    }

    fn commit_branch(&self, xid: &Xid, one_phase: bool) -> Result<(), XaError> {
        self.check_active(xid, "commit")?;

        if one_phase && let Err(e) = self.prepare(xid) {
            self.inner()?.rollback_only = true;
            error!(xid = %xid, error = %e, "prepare in one-phase commit failed");
            return Err(XaError::RollbackOnly);
        }

        if !self.session.end_prepare() {
            debug!(xid = %xid, "session already committed in this transaction");
            return self.set_state(XaState::Committed);
        }
        if let Err(e) = self.session.session().commit() {
            error!(xid = %xid, error = %e, "failed to commit session");
            return Err(XaError::ResourceManagerError);
        }
        self.set_state(XaState::Committed)
    }

    pub fn rollback(&self, xid: &Xid) -> Result<(), XaError> {
        debug!(xid = %xid, "rollback");
        let mut failed = false;
        {
            let inner = self.inner()?;
            if inner.xid.as_ref() != Some(xid) {
                error!(xid = %xid, "rollback of unknown transaction");
                failed = true;
            }
        }
        if let Err(e) = self.session.session().rollback() {
            error!(xid = %xid, error = %e, "failed to roll back session");
            failed = true;
        }
        self.session.end_prepare();
        if failed {
            return Err(XaError::ResourceManagerError);
        }
        self.set_state(XaState::RolledBack)
    }

    /// Forget a heuristically completed branch, releasing the session.
    pub fn forget(&self, xid: &Xid) -> Result<(), XaError> {
        debug!(xid = %xid, "forget");
        if let Err(e) = self.session.session().release() {
            debug!(error = %e, "release of session failed");
        }
        Ok(())
    }

    /// Phase numbers the session could resume from.
    pub fn recover(&self, flags: XaFlags) -> Result<Vec<u32>, XaError> {
        debug!(flags = %flags, "recover");
        self.session.session().recover().map_err(|e| {
            error!(error = %e, "recover failed");
            XaError::ResourceManagerError
        })
    }

    pub fn transaction_timeout(&self) -> Result<u32, XaError> {
        Ok(self.inner()?.timeout_seconds)
    }

    pub fn set_transaction_timeout(&self, seconds: u32) -> Result<bool, XaError> {
        debug!(seconds, "set transaction timeout");
        self.inner()?.timeout_seconds = seconds;
        Ok(true)
    }

    /// Resource managers are the same only if they are the same resource.
    #[must_use]
    pub fn is_same_rm(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}
