// The locking contracts executors follow when they walk tables and mutate
// indexes. Table heaps and the executor tree live outside this crate; these
// helpers are the seam they call through so the isolation-level rules stay
// in one place.

use crate::common::types::Rid;
use crate::storage::page::SlotCodec;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{
    IndexWriteOp, IndexWriteRecord, IsolationLevel, Transaction,
};

/// Lock a row for reading during a scan. REPEATABLE_READ and READ_COMMITTED
/// take a shared lock; READ_UNCOMMITTED reads without one.
pub fn acquire_scan_lock(lock_manager: &LockManager, txn: &Transaction, rid: Rid) -> bool {
    match txn.isolation_level() {
        IsolationLevel::ReadUncommitted => true,
        IsolationLevel::ReadCommitted | IsolationLevel::RepeatableRead => {
            lock_manager.lock_shared(txn, rid)
        }
    }
}

/// Release a scan lock once the tuple has been consumed. Only
/// READ_COMMITTED releases early, and never a lock the transaction also
/// holds exclusively (it would lose its write lock).
pub fn release_scan_lock(lock_manager: &LockManager, txn: &Transaction, rid: Rid) -> bool {
    if txn.isolation_level() == IsolationLevel::ReadCommitted && !txn.is_exclusive_locked(rid) {
        return lock_manager.unlock(txn, rid);
    }
    true
}

/// Lock a row for mutation. A REPEATABLE_READ transaction that already read
/// the row upgrades its shared lock; everyone else takes an exclusive lock
/// outright.
pub fn acquire_write_lock(lock_manager: &LockManager, txn: &Transaction, rid: Rid) -> bool {
    if txn.is_exclusive_locked(rid) {
        return true;
    }
    if txn.is_shared_locked(rid) && txn.isolation_level() == IsolationLevel::RepeatableRead {
        return lock_manager.lock_upgrade(txn, rid);
    }
    lock_manager.lock_exclusive(txn, rid)
}

/// Record an index insert in the transaction's write set so external abort
/// logic can rewind it.
pub fn record_index_insert<K: SlotCodec>(txn: &Transaction, rid: Rid, key: &K) {
    txn.append_index_write(IndexWriteRecord {
        op: IndexWriteOp::Insert,
        rid,
        key: encode_key(key),
    });
}

/// Record an index delete in the transaction's write set.
pub fn record_index_delete<K: SlotCodec>(txn: &Transaction, rid: Rid, key: &K) {
    txn.append_index_write(IndexWriteRecord {
        op: IndexWriteOp::Delete,
        rid,
        key: encode_key(key),
    });
}

fn encode_key<K: SlotCodec>(key: &K) -> Vec<u8> {
    let mut bytes = vec![0u8; K::ENCODED_SIZE];
    key.encode(&mut bytes);
    bytes
}

/// Iterator adapter a sequential scan drives: locks each row before
/// yielding it and, under READ_COMMITTED, releases the previous row's
/// shared lock as the scan advances past it. Yields `None` early if the
/// transaction is wounded while acquiring a lock.
pub struct LockingScan<'a, I> {
    lock_manager: &'a LockManager,
    txn: &'a Transaction,
    rids: I,
    previous: Option<Rid>,
}

impl<'a, I> LockingScan<'a, I>
where
    I: Iterator<Item = Rid>,
{
    pub fn new(lock_manager: &'a LockManager, txn: &'a Transaction, rids: I) -> Self {
        Self {
            lock_manager,
            txn,
            rids,
            previous: None,
        }
    }
}

impl<I> Iterator for LockingScan<'_, I>
where
    I: Iterator<Item = Rid>,
{
    type Item = Rid;

    fn next(&mut self) -> Option<Rid> {
        if let Some(previous) = self.previous.take() {
            release_scan_lock(self.lock_manager, self.txn, previous);
        }
        let rid = self.rids.next()?;
        if !acquire_scan_lock(self.lock_manager, self.txn, rid) {
            return None;
        }
        self.previous = Some(rid);
        Some(rid)
    }
}
