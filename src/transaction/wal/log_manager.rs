use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Lsn, TxnId};
use crate::transaction::wal::log_record::{LogRecord, LogRecordError, LogRecordType};

/// Error type for log manager operations
#[derive(Error, Debug)]
pub enum LogManagerError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Log record error: {0}")]
    RecordError(#[from] LogRecordError),
}

/// Result type for log manager operations
pub type Result<T> = std::result::Result<T, LogManagerError>;

#[derive(Debug, Clone)]
pub struct LogManagerConfig {
    pub log_path: PathBuf,
}

impl Default for LogManagerConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("opaldb.wal"),
        }
    }
}

/// Append-only WAL writer. The storage core only consumes the append hook
/// and the durability barrier; replay lives outside this crate.
pub struct LogManager {
    next_lsn: AtomicU64,
    flushed_lsn: AtomicU64,
    log_file: Mutex<File>,
}

impl LogManager {
    pub fn new(config: LogManagerConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_path)?;

        Ok(Self {
            next_lsn: AtomicU64::new(0),
            flushed_lsn: AtomicU64::new(0),
            log_file: Mutex::new(file),
        })
    }

    /// Append a record and return its LSN. Records are written through
    /// synchronously, so the returned LSN is already on its way to disk.
    pub fn append_log_record(
        &self,
        txn_id: TxnId,
        prev_lsn: Lsn,
        record_type: LogRecordType,
        payload: Vec<u8>,
    ) -> Result<Lsn> {
        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst) + 1;
        let record = LogRecord::new(lsn, txn_id, prev_lsn, record_type, payload);
        let bytes = record.to_bytes()?;

        let mut file = self.log_file.lock();
        file.write_all(&bytes)?;
        file.flush()?;
        self.flushed_lsn.fetch_max(lsn, Ordering::SeqCst);

        Ok(lsn)
    }

    /// Durability barrier: make sure every record up to `lsn` is on stable
    /// storage before a data page that carries it may be written.
    pub fn flush_until(&self, lsn: Lsn) -> Result<()> {
        if lsn <= self.flushed_lsn.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.log_file.lock().sync_data()?;
        Ok(())
    }

    pub fn flushed_lsn(&self) -> Lsn {
        self.flushed_lsn.load(Ordering::SeqCst)
    }
}
