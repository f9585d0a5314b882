// Transaction management module: the transaction record, the lock manager,
// and the write-ahead-log hook the storage core consumes.

pub mod concurrency;
pub mod wal;

// Public exports
pub use concurrency::lock_manager::LockManager;
pub use concurrency::transaction::{
    IndexWriteOp, IndexWriteRecord, IsolationLevel, Transaction, TransactionError, TransactionState,
};
pub use concurrency::transaction_manager::TransactionManager;
pub use wal::log_manager::{LogManager, LogManagerConfig};
pub use wal::log_record::{LogRecord, LogRecordType};
