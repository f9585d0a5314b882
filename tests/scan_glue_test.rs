use anyhow::Result;

use opaldb::access::{
    acquire_scan_lock, acquire_write_lock, record_index_delete, record_index_insert,
    release_scan_lock, LockingScan,
};
use opaldb::common::types::Rid;
use opaldb::transaction::{IndexWriteOp, IsolationLevel};

mod common;
use common::{begin, create_test_lock_manager};

#[test]
fn test_read_uncommitted_scans_lock_free() -> Result<()> {
    let (txn_manager, lock_manager, _wal) = create_test_lock_manager()?;
    let txn = begin(&txn_manager, IsolationLevel::ReadUncommitted);
    let rid = Rid::new(1, 0);

    assert!(acquire_scan_lock(&lock_manager, &txn, rid));
    assert!(!txn.is_shared_locked(rid));
    Ok(())
}

#[test]
fn test_repeatable_read_scan_holds_all_locks() -> Result<()> {
    let (txn_manager, lock_manager, _wal) = create_test_lock_manager()?;
    let txn = begin(&txn_manager, IsolationLevel::RepeatableRead);
    let rids: Vec<Rid> = (0..3).map(|slot| Rid::new(2, slot)).collect();

    let scanned: Vec<Rid> =
        LockingScan::new(&lock_manager, &txn, rids.iter().copied()).collect();
    assert_eq!(scanned, rids);
    for &rid in &rids {
        assert!(txn.is_shared_locked(rid));
    }
    Ok(())
}

// READ_COMMITTED holds the shared lock only while the row is current: it
// is released as the scan moves on.
#[test]
fn test_read_committed_scan_releases_behind_itself() -> Result<()> {
    let (txn_manager, lock_manager, _wal) = create_test_lock_manager()?;
    let txn = begin(&txn_manager, IsolationLevel::ReadCommitted);
    let rids: Vec<Rid> = (0..3).map(|slot| Rid::new(3, slot)).collect();

    let mut scan = LockingScan::new(&lock_manager, &txn, rids.iter().copied());

    assert_eq!(scan.next(), Some(rids[0]));
    assert!(txn.is_shared_locked(rids[0]));

    assert_eq!(scan.next(), Some(rids[1]));
    assert!(!txn.is_shared_locked(rids[0]));
    assert!(txn.is_shared_locked(rids[1]));

    assert_eq!(scan.next(), Some(rids[2]));
    assert_eq!(scan.next(), None);
    assert!(!txn.is_shared_locked(rids[2]));
    Ok(())
}

// A row the transaction also wrote keeps its exclusive lock through the
// scan's early release.
#[test]
fn test_read_committed_keeps_exclusive_rows() -> Result<()> {
    let (txn_manager, lock_manager, _wal) = create_test_lock_manager()?;
    let txn = begin(&txn_manager, IsolationLevel::ReadCommitted);
    let rid = Rid::new(4, 0);

    assert!(acquire_write_lock(&lock_manager, &txn, rid));
    assert!(acquire_scan_lock(&lock_manager, &txn, rid));
    assert!(release_scan_lock(&lock_manager, &txn, rid));
    assert!(txn.is_exclusive_locked(rid));
    Ok(())
}

#[test]
fn test_write_lock_upgrades_under_repeatable_read() -> Result<()> {
    let (txn_manager, lock_manager, _wal) = create_test_lock_manager()?;
    let txn = begin(&txn_manager, IsolationLevel::RepeatableRead);
    let rid = Rid::new(5, 0);

    assert!(acquire_scan_lock(&lock_manager, &txn, rid));
    assert!(txn.is_shared_locked(rid));

    assert!(acquire_write_lock(&lock_manager, &txn, rid));
    assert!(txn.is_exclusive_locked(rid));
    assert!(!txn.is_shared_locked(rid));
    Ok(())
}

#[test]
fn test_index_writes_recorded_for_abort() -> Result<()> {
    let (txn_manager, _lock_manager, _wal) = create_test_lock_manager()?;
    let txn = begin(&txn_manager, IsolationLevel::RepeatableRead);

    record_index_insert(&txn, Rid::new(6, 0), &42i32);
    record_index_delete(&txn, Rid::new(6, 1), &43i32);

    let writes = txn.index_writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].op, IndexWriteOp::Insert);
    assert_eq!(writes[0].rid, Rid::new(6, 0));
    assert_eq!(writes[0].key, 42i32.to_le_bytes().to_vec());
    assert_eq!(writes[1].op, IndexWriteOp::Delete);
    Ok(())
}
