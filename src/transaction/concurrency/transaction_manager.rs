use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionError, TransactionState,
};
use crate::transaction::wal::log_manager::LogManager;
use crate::transaction::wal::log_record::LogRecordType;

/// Transaction manager - assigns ids and tracks active transactions.
///
/// The registry is how the lock manager reaches a transaction it has to
/// wound: ids order transactions by age, and every active transaction stays
/// registered until it commits or aborts.
pub struct TransactionManager {
    /// Next transaction ID to assign
    next_txn_id: AtomicU32,

    /// Log manager reference
    log_manager: Arc<LogManager>,

    /// Active transactions map (txn_id -> Transaction)
    active_transactions: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(log_manager: Arc<LogManager>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(1),
            log_manager,
            active_transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Begin a new transaction and write its BEGIN record.
    pub fn begin_transaction(
        &self,
        isolation_level: IsolationLevel,
    ) -> Result<Arc<Transaction>, TransactionError> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));

        let lsn = self
            .log_manager
            .append_log_record(txn_id, 0, LogRecordType::Begin, Vec::new())
            .map_err(|e| TransactionError::LogError(e.to_string()))?;
        txn.set_prev_lsn(lsn);

        self.active_transactions.lock().insert(txn_id, txn.clone());
        Ok(txn)
    }

    /// Commit a transaction. The caller is expected to have released its
    /// locks first (`LockManager::unlock_all`).
    pub fn commit_transaction(&self, txn_id: TxnId) -> Result<(), TransactionError> {
        let txn = self
            .active_transactions
            .lock()
            .remove(&txn_id)
            .ok_or(TransactionError::NotFound(txn_id))?;

        if txn.state() == TransactionState::Aborted || txn.state() == TransactionState::Committed {
            return Err(TransactionError::InvalidState(txn_id));
        }

        let lsn = self
            .log_manager
            .append_log_record(txn_id, txn.prev_lsn(), LogRecordType::Commit, Vec::new())
            .map_err(|e| TransactionError::LogError(e.to_string()))?;
        txn.set_prev_lsn(lsn);
        txn.set_state(TransactionState::Committed);

        Ok(())
    }

    /// Abort a transaction. Also the path a wounded transaction takes once
    /// its thread observes the abort; the state may already be Aborted.
    pub fn abort_transaction(&self, txn_id: TxnId) -> Result<(), TransactionError> {
        let txn = self
            .active_transactions
            .lock()
            .remove(&txn_id)
            .ok_or(TransactionError::NotFound(txn_id))?;

        if txn.state() == TransactionState::Committed {
            return Err(TransactionError::InvalidState(txn_id));
        }

        let lsn = self
            .log_manager
            .append_log_record(txn_id, txn.prev_lsn(), LogRecordType::Abort, Vec::new())
            .map_err(|e| TransactionError::LogError(e.to_string()))?;
        txn.set_prev_lsn(lsn);
        txn.set_state(TransactionState::Aborted);

        Ok(())
    }

    /// Look up an active transaction by id.
    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active_transactions.lock().get(&txn_id).cloned()
    }

    pub fn transaction_exists(&self, txn_id: TxnId) -> bool {
        self.active_transactions.lock().contains_key(&txn_id)
    }

    pub fn active_transaction_ids(&self) -> Vec<TxnId> {
        self.active_transactions.lock().keys().copied().collect()
    }
}
