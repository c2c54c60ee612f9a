//! Test the store driven through the XA protocol.

use std::sync::Arc;

use crate::simulation::SimulatedDisk;
use crate::testing::open_simulated_store;
use crate::xa::{SessionHandle, StatementStoreXaResource, StoreSession, XaError, XaFlags, XaState, Xid};

fn xid(branch: &[u8]) -> Xid {
    Xid::new(0x1234, b"e2e".to_vec(), branch.to_vec())
}

#[test]
fn test_branches_sharing_a_session_commit_once_and_views_refresh() {
    let disk = SimulatedDisk::new(41);
    let store = open_simulated_store(&disk, 8);
    store.clear_default().expect("clear");
    let session = Arc::new(StoreSession::new(store.clone()));
    let view = session.read_only().expect("view");
    let handle = SessionHandle::new(session);

    let first = StatementStoreXaResource::new(10, handle.clone());
    let second = StatementStoreXaResource::new(10, handle);
    let branch = xid(b"a");

    first.start(&branch, XaFlags::NO_FLAGS).expect("start first");
    second.start(&branch, XaFlags::NO_FLAGS).expect("start second");
    for subject in 1..=5 {
        store.add_triple(subject, 1, 1, 1).expect("add");
    }
    first.end(&branch, XaFlags::SUCCESS).expect("end first");
    second.end(&branch, XaFlags::SUCCESS).expect("end second");

    first.prepare(&branch).expect("prepare first");
    second.prepare(&branch).expect("prepare second");
    first.commit(&branch, false).expect("commit first");
    second.commit(&branch, false).expect("commit second");
    assert_eq!(store.phase_number().expect("phase"), 1);
    assert_eq!(view.nr_triples().expect("stale view"), 0);

    // The next transaction refreshes the session's views.
    let next = xid(b"b");
    first.start(&next, XaFlags::NO_FLAGS).expect("start next");
    assert_eq!(view.nr_triples().expect("fresh view"), 5);
}

#[test]
fn test_failed_prepare_rolls_back_cleanly() {
    let disk = SimulatedDisk::new(42);
    let store = open_simulated_store(&disk, 8);
    store.clear_default().expect("clear");
    store.add_triple(1, 1, 1, 1).expect("add");
    store.prepare().expect("prepare");
    store.commit().expect("commit");

    let resource = StatementStoreXaResource::new(
        10,
        SessionHandle::new(Arc::new(StoreSession::new(store.clone()))),
    );
    let branch = xid(b"fail");
    resource.start(&branch, XaFlags::NO_FLAGS).expect("start");
    store.add_triple(2, 2, 2, 2).expect("add");

    disk.fail_nth_write("xa.g", 1).expect("arm fault");
    assert_eq!(resource.prepare(&branch), Err(XaError::RollbackOnly));
    resource.rollback(&branch).expect("rollback");
    assert_eq!(resource.state().expect("state"), XaState::RolledBack);

    assert_eq!(store.nr_triples().expect("count"), 1);
    assert_eq!(store.recover().expect("recover"), Vec::<u32>::new());

    // A fresh branch prepares and commits on the same session.
    let retry = xid(b"retry");
    resource.start(&retry, XaFlags::NO_FLAGS).expect("start retry");
    store.add_triple(3, 3, 3, 3).expect("add");
    resource.commit(&retry, true).expect("one-phase commit");
    assert_eq!(store.phase_number().expect("phase"), 2);
    assert_eq!(store.check_integrity().expect("integrity"), 2);
}
