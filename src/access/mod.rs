mod scan;

pub use scan::{
    acquire_scan_lock, acquire_write_lock, record_index_delete, record_index_insert,
    release_scan_lock, LockingScan,
};
