// Represents an active database transaction. The record is shared between
// the owning thread and the lock manager (which may wound it from another
// thread), so every mutable field is behind an atomic or a mutex.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Lsn, Rid, TxnId};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Transaction states under two-phase locking. A transaction grows until
/// its first unlock, shrinks afterwards, and ends committed or aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    Growing = 0,
    Shrinking = 1,
    Committed = 2,
    Aborted = 3,
}

impl TransactionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TransactionState::Growing,
            1 => TransactionState::Shrinking,
            2 => TransactionState::Committed,
            _ => TransactionState::Aborted,
        }
    }
}

/// Errors that can occur during transaction processing
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} is already committed or aborted")]
    InvalidState(TxnId),

    #[error("Transaction {0} not found")]
    NotFound(TxnId),

    #[error("Failed to write to WAL: {0}")]
    LogError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWriteOp {
    Insert,
    Delete,
}

/// One index mutation performed on behalf of a transaction. Abort logic
/// (external to this crate) walks these records backwards to rewind the
/// index.
#[derive(Debug, Clone)]
pub struct IndexWriteRecord {
    pub op: IndexWriteOp,
    pub rid: Rid,
    pub key: Vec<u8>,
}

/// Transaction - represents an active database transaction
pub struct Transaction {
    /// Transaction ID; also the wound-wait timestamp (smaller = older)
    id: TxnId,

    /// Current transaction state
    state: AtomicU8,

    /// Isolation level for this transaction
    isolation_level: IsolationLevel,

    /// RIDs this transaction holds shared locks on
    shared_lock_set: Mutex<HashSet<Rid>>,

    /// RIDs this transaction holds exclusive locks on
    exclusive_lock_set: Mutex<HashSet<Rid>>,

    /// Index mutations performed so far, in order
    index_write_set: Mutex<Vec<IndexWriteRecord>>,

    /// Last LSN this transaction appended
    prev_lsn: AtomicU64,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            state: AtomicU8::new(TransactionState::Growing as u8),
            isolation_level,
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
            index_write_set: Mutex::new(Vec::new()),
            prev_lsn: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: TransactionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn is_shared_locked(&self, rid: Rid) -> bool {
        self.shared_lock_set.lock().contains(&rid)
    }

    pub fn is_exclusive_locked(&self, rid: Rid) -> bool {
        self.exclusive_lock_set.lock().contains(&rid)
    }

    pub fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub fn remove_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().remove(&rid);
    }

    pub fn add_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub fn remove_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().remove(&rid);
    }

    pub fn shared_lock_rids(&self) -> Vec<Rid> {
        self.shared_lock_set.lock().iter().copied().collect()
    }

    pub fn exclusive_lock_rids(&self) -> Vec<Rid> {
        self.exclusive_lock_set.lock().iter().copied().collect()
    }

    pub fn append_index_write(&self, record: IndexWriteRecord) {
        self.index_write_set.lock().push(record);
    }

    pub fn index_writes(&self) -> Vec<IndexWriteRecord> {
        self.index_write_set.lock().clone()
    }

    pub fn prev_lsn(&self) -> Lsn {
        self.prev_lsn.load(Ordering::SeqCst)
    }

    pub fn set_prev_lsn(&self, lsn: Lsn) {
        self.prev_lsn.store(lsn, Ordering::SeqCst);
    }
}
