use thiserror::Error;
use crate::common::types::PageId;
use crate::storage::disk::DiskManagerError;
use crate::transaction::wal::log_manager::LogManagerError;

#[derive(Error, Debug)]
pub enum BufferPoolError {
    #[error("Page {0} not found in the buffer pool")]
    PageNotFound(PageId),

    #[error("Page {0} is pinned")]
    PagePinned(PageId),

    #[error("Page {0} is not pinned")]
    PageNotPinned(PageId),

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("All frames are pinned")]
    BufferPoolFull,

    #[error("Buffer pool instance is poisoned by an earlier I/O failure")]
    Poisoned,

    #[error("Disk manager error: {0}")]
    DiskManagerError(#[from] DiskManagerError),

    #[error("WAL error: {0}")]
    WalError(#[from] LogManagerError),
}
