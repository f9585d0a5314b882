use thiserror::Error;
use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum HashIndexError {
    #[error("Buffer pool error: {0}")]
    BufferPoolError(#[from] BufferPoolError),

    #[error("Directory slot resolves to unknown bucket fingerprint {0:#x}")]
    DanglingBucketRef(u32),
}
