use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::types::{Lsn, TxnId};

/// Error type for log record operations
#[derive(Error, Debug)]
pub enum LogRecordError {
    #[error("Failed to serialize log record: {0}")]
    SerializationError(String),

    #[error("Failed to deserialize log record: {0}")]
    DeserializationError(String),
}

/// Kinds of records the storage core appends. Replaying them is recovery's
/// job and happens outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecordType {
    /// Marks the beginning of a transaction
    Begin,
    /// Marks the successful completion of a transaction
    Commit,
    /// Marks the abortion/rollback of a transaction
    Abort,
    /// Records an insert operation
    Insert,
    /// Records an update operation
    Update,
    /// Records a delete operation
    Delete,
}

/// A single WAL entry: header fields plus an opaque payload the caller
/// serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub txn_id: TxnId,
    pub prev_lsn: Lsn,
    pub record_type: LogRecordType,
    pub payload: Vec<u8>,
}

impl LogRecord {
    pub fn new(
        lsn: Lsn,
        txn_id: TxnId,
        prev_lsn: Lsn,
        record_type: LogRecordType,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            lsn,
            txn_id,
            prev_lsn,
            record_type,
            payload,
        }
    }

    /// Serialize as a length-prefixed bincode frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LogRecordError> {
        let body = bincode::serialize(self)
            .map_err(|e| LogRecordError::SerializationError(e.to_string()))?;
        let mut bytes = Vec::with_capacity(4 + body.len());
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LogRecordError> {
        if bytes.len() < 4 {
            return Err(LogRecordError::DeserializationError(
                "truncated frame header".to_string(),
            ));
        }
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let body = bytes
            .get(4..4 + len)
            .ok_or_else(|| LogRecordError::DeserializationError("truncated frame body".to_string()))?;
        bincode::deserialize(body).map_err(|e| LogRecordError::DeserializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip() {
        let record = LogRecord::new(42, 7, 41, LogRecordType::Update, vec![1, 2, 3]);
        let bytes = record.to_bytes().unwrap();
        let decoded = LogRecord::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.lsn, 42);
        assert_eq!(decoded.txn_id, 7);
        assert_eq!(decoded.prev_lsn, 41);
        assert_eq!(decoded.record_type, LogRecordType::Update);
        assert_eq!(decoded.payload, vec![1, 2, 3]);
    }
}
