//! Two-phase commit of statement store sessions through the XA protocol.

mod resource;
mod session;
mod xid;

pub use resource::{StatementStoreXaResource, XaState};
pub use session::{ResolverSession, SessionHandle, StoreSession};
pub use xid::{XaError, XaFlags, Xid};
