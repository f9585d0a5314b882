use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use parking_lot::{Condvar, Mutex};
use log::warn;

use crate::common::types::{Rid, TxnId};
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionState,
};
use crate::transaction::concurrency::transaction_manager::TransactionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

impl LockRequest {
    fn new(txn_id: TxnId, mode: LockMode) -> Self {
        Self {
            txn_id,
            mode,
            granted: false,
        }
    }
}

struct LockRequestQueue {
    queue: VecDeque<LockRequest>,
    /// Waiters on this RID; always paired with the table mutex.
    cv: Arc<Condvar>,
    /// At most one transaction may be upgrading S -> X at a time.
    upgrading: Option<TxnId>,
}

impl Default for LockRequestQueue {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            cv: Arc::new(Condvar::new()),
            upgrading: None,
        }
    }
}

type LockTable = HashMap<Rid, LockRequestQueue>;

/// Row-granularity two-phase lock manager with wound-wait deadlock
/// prevention.
///
/// Transaction ids double as timestamps: a smaller id is an older
/// transaction and wins every conflict. When an older transaction enqueues
/// a conflicting request, every younger conflicting transaction is aborted
/// on the spot, so a wait-for cycle can never form.
///
/// Every failure leaves the calling transaction ABORTED and returns false;
/// waiters re-check their own abort flag on every wakeup.
pub struct LockManager {
    lock_table: Mutex<LockTable>,
    txn_manager: Arc<TransactionManager>,
}

impl LockManager {
    pub fn new(txn_manager: Arc<TransactionManager>) -> Self {
        Self {
            lock_table: Mutex::new(HashMap::new()),
            txn_manager,
        }
    }

    /// A shared request is grantable when no exclusive request sits ahead
    /// of it in the queue.
    fn grant_shared(table: &LockTable, rid: Rid, txn_id: TxnId) -> bool {
        let Some(queue) = table.get(&rid) else {
            return true;
        };
        for request in &queue.queue {
            if request.txn_id == txn_id {
                return true;
            }
            if request.mode == LockMode::Exclusive {
                return false;
            }
        }
        // Our request is gone: we were wounded. Leave the wait loop; the
        // abort check decides the outcome.
        true
    }

    /// An exclusive request is grantable only at the head of the queue.
    fn grant_exclusive(table: &LockTable, rid: Rid, txn_id: TxnId) -> bool {
        table
            .get(&rid)
            .and_then(|queue| queue.queue.front())
            .map_or(true, |request| request.txn_id == txn_id)
    }

    /// Abort every younger transaction in the queue that the predicate
    /// selects, dropping its request and its claim on this RID. Requests
    /// from transactions no longer registered are stale and dropped too.
    fn wound_younger(
        txn_manager: &TransactionManager,
        queue: &mut LockRequestQueue,
        rid: Rid,
        my_id: TxnId,
        exclusive_only: bool,
    ) {
        queue.queue.retain(|request| {
            if request.txn_id <= my_id {
                return true;
            }
            if exclusive_only && request.mode != LockMode::Exclusive {
                return true;
            }
            let Some(victim) = txn_manager.get_transaction(request.txn_id) else {
                return false;
            };
            if victim.state() == TransactionState::Aborted {
                return true;
            }
            victim.set_state(TransactionState::Aborted);
            victim.remove_shared_lock(rid);
            victim.remove_exclusive_lock(rid);
            false
        });
    }

    /// Acquire a shared lock on `rid`, blocking until granted or wounded.
    pub fn lock_shared(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.lock_table.lock();
        match txn.state() {
            TransactionState::Aborted | TransactionState::Committed => return false,
            TransactionState::Shrinking => {
                txn.set_state(TransactionState::Aborted);
                return false;
            }
            TransactionState::Growing => {}
        }
        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            // Dirty reads take no locks; asking for one is a protocol error.
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.is_exclusive_locked(rid) || txn.is_shared_locked(rid) {
            return true;
        }

        let my_id = txn.id();
        let entry = table.entry(rid).or_default();
        entry.queue.push_back(LockRequest::new(my_id, LockMode::Shared));
        Self::wound_younger(&self.txn_manager, entry, rid, my_id, true);
        let cv = entry.cv.clone();
        cv.notify_all();

        while txn.state() != TransactionState::Aborted
            && !Self::grant_shared(&table, rid, my_id)
        {
            cv.wait(&mut table);
        }
        if txn.state() == TransactionState::Aborted {
            return false;
        }

        if let Some(queue) = table.get_mut(&rid) {
            if let Some(request) = queue.queue.iter_mut().find(|r| r.txn_id == my_id) {
                request.granted = true;
            }
        }
        txn.add_shared_lock(rid);
        true
    }

    /// Acquire an exclusive lock on `rid`, blocking until granted or
    /// wounded. A held shared lock is silently replaced by the new request.
    pub fn lock_exclusive(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.lock_table.lock();
        match txn.state() {
            TransactionState::Aborted | TransactionState::Committed => return false,
            TransactionState::Shrinking => {
                txn.set_state(TransactionState::Aborted);
                return false;
            }
            TransactionState::Growing => {}
        }
        if txn.is_exclusive_locked(rid) {
            return true;
        }

        let my_id = txn.id();
        if txn.is_shared_locked(rid) {
            if let Some(queue) = table.get_mut(&rid) {
                if let Some(pos) = queue.queue.iter().position(|r| r.txn_id == my_id) {
                    queue.queue.remove(pos);
                }
            }
            txn.remove_shared_lock(rid);
        }

        let entry = table.entry(rid).or_default();
        entry
            .queue
            .push_back(LockRequest::new(my_id, LockMode::Exclusive));
        Self::wound_younger(&self.txn_manager, entry, rid, my_id, false);
        let cv = entry.cv.clone();
        cv.notify_all();

        while txn.state() != TransactionState::Aborted
            && !Self::grant_exclusive(&table, rid, my_id)
        {
            cv.wait(&mut table);
        }
        if txn.state() == TransactionState::Aborted {
            return false;
        }

        if let Some(queue) = table.get_mut(&rid) {
            if let Some(request) = queue.queue.iter_mut().find(|r| r.txn_id == my_id) {
                request.granted = true;
            }
        }
        txn.add_exclusive_lock(rid);
        true
    }

    /// Upgrade a held shared lock to exclusive. Only one upgrade may be in
    /// flight per RID, and only under REPEATABLE_READ.
    pub fn lock_upgrade(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.lock_table.lock();
        if txn.state() == TransactionState::Aborted {
            return false;
        }
        if txn.is_exclusive_locked(rid) {
            return true;
        }

        let upgrade_busy = table.get(&rid).is_some_and(|q| q.upgrading.is_some());
        if upgrade_busy || txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if txn.isolation_level() != IsolationLevel::RepeatableRead {
            txn.set_state(TransactionState::Aborted);
            return false;
        }
        if !txn.is_shared_locked(rid) {
            txn.set_state(TransactionState::Aborted);
            return false;
        }

        let my_id = txn.id();
        if let Some(queue) = table.get_mut(&rid) {
            if let Some(pos) = queue.queue.iter().position(|r| r.txn_id == my_id) {
                queue.queue.remove(pos);
            }
        }
        txn.remove_shared_lock(rid);

        let entry = table.entry(rid).or_default();
        entry
            .queue
            .push_back(LockRequest::new(my_id, LockMode::Exclusive));
        entry.upgrading = Some(my_id);
        Self::wound_younger(&self.txn_manager, entry, rid, my_id, false);
        let cv = entry.cv.clone();
        cv.notify_all();

        while txn.state() != TransactionState::Aborted
            && !Self::grant_exclusive(&table, rid, my_id)
        {
            cv.wait(&mut table);
        }

        // The marker is cleared on both outcomes.
        if let Some(queue) = table.get_mut(&rid) {
            if queue.upgrading == Some(my_id) {
                queue.upgrading = None;
            }
        }
        if txn.state() == TransactionState::Aborted {
            return false;
        }

        if let Some(queue) = table.get_mut(&rid) {
            if let Some(request) = queue.queue.iter_mut().find(|r| r.txn_id == my_id) {
                request.granted = true;
            }
        }
        txn.add_exclusive_lock(rid);
        true
    }

    /// Release a lock. Under REPEATABLE_READ, or whenever the released lock
    /// was exclusive, the first unlock moves the transaction to its
    /// shrinking phase. Releasing a lock that is not held aborts the
    /// transaction.
    pub fn unlock(&self, txn: &Transaction, rid: Rid) -> bool {
        let mut table = self.lock_table.lock();
        let my_id = txn.id();

        let Some(queue) = table.get_mut(&rid) else {
            warn!("txn {} released lock it does not hold on {:?}", my_id, rid);
            txn.set_state(TransactionState::Aborted);
            return false;
        };
        let Some(pos) = queue.queue.iter().position(|r| r.txn_id == my_id) else {
            warn!("txn {} released lock it does not hold on {:?}", my_id, rid);
            txn.set_state(TransactionState::Aborted);
            return false;
        };

        let mode = queue.queue[pos].mode;
        if txn.state() == TransactionState::Growing
            && (txn.isolation_level() == IsolationLevel::RepeatableRead
                || mode == LockMode::Exclusive)
        {
            txn.set_state(TransactionState::Shrinking);
        }
        queue.queue.remove(pos);
        txn.remove_shared_lock(rid);
        txn.remove_exclusive_lock(rid);
        queue.cv.notify_all();
        true
    }

    /// Release everything the transaction still holds. Used by commit and
    /// abort paths; tolerates wounded transactions whose entries are gone.
    pub fn unlock_all(&self, txn: &Transaction) {
        let mut rids = txn.shared_lock_rids();
        rids.extend(txn.exclusive_lock_rids());
        rids.sort();
        rids.dedup();
        for rid in rids {
            self.unlock(txn, rid);
        }
    }
}
