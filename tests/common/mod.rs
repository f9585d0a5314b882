use std::sync::Arc;
use anyhow::Result;
use tempfile::NamedTempFile;

use opaldb::storage::buffer::{BufferPoolInstance, ParallelBufferPool};
use opaldb::storage::disk::DiskManager;
use opaldb::transaction::{
    IsolationLevel, LockManager, LogManager, LogManagerConfig, Transaction, TransactionManager,
};

// Route log output through the test harness
#[allow(dead_code)]
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a single buffer pool instance backed by a temporary database.
// Returns the shared disk manager too so tests can observe on-disk state.
#[allow(dead_code)]
pub fn create_test_buffer_pool(
    pool_size: usize,
) -> Result<(Arc<BufferPoolInstance>, Arc<DiskManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let disk_manager = Arc::new(DiskManager::new(path)?);
    let buffer_pool = Arc::new(BufferPoolInstance::new(pool_size, disk_manager.clone()));
    Ok((buffer_pool, disk_manager, file))
}

// Create a parallel buffer pool backed by a temporary database
#[allow(dead_code)]
pub fn create_test_parallel_pool(
    num_instances: usize,
    pool_size: usize,
) -> Result<(Arc<ParallelBufferPool>, Arc<DiskManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let disk_manager = Arc::new(DiskManager::new(path)?);
    let pool = Arc::new(ParallelBufferPool::new(
        num_instances,
        pool_size,
        disk_manager.clone(),
        None,
    ));
    Ok((pool, disk_manager, file))
}

// Create a transaction manager and lock manager over a temporary WAL
#[allow(dead_code)]
pub fn create_test_lock_manager() -> Result<(Arc<TransactionManager>, LockManager, NamedTempFile)> {
    let wal_file = NamedTempFile::new()?;
    let config = LogManagerConfig {
        log_path: wal_file.path().to_path_buf(),
    };
    let log_manager = Arc::new(LogManager::new(config)?);
    let txn_manager = Arc::new(TransactionManager::new(log_manager));
    let lock_manager = LockManager::new(txn_manager.clone());
    Ok((txn_manager, lock_manager, wal_file))
}

// Begin a transaction, panicking on WAL failure
#[allow(dead_code)]
pub fn begin(txn_manager: &TransactionManager, isolation: IsolationLevel) -> Arc<Transaction> {
    txn_manager.begin_transaction(isolation).unwrap()
}
