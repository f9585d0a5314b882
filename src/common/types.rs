use std::sync::Arc;
use parking_lot::RwLock;

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type. Non-negative ids are valid; page 0 exists because sharded
/// allocation starts each instance at its own index.
pub type PageId = i32;

/// Sentinel for a frame that holds no page
pub const INVALID_PAGE_ID: PageId = -1;

/// Buffer pool frame ID type
pub type FrameId = usize;

/// Transaction ID type. Ids are assigned monotonically, so a smaller id
/// means an older transaction.
pub type TxnId = u32;

/// LSN (Log Sequence Number) type
pub type Lsn = u64;

/// Row identifier: the page a tuple lives on plus its slot number.
/// This is the granularity the lock manager works at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

/// Page structure
#[derive(Debug, Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
    pub lsn: Lsn,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
            lsn: 0,
        }
    }

    /// Zero the payload and drop the identity back to the invalid sentinel.
    pub fn reset(&mut self) {
        self.data = [0; PAGE_SIZE];
        self.page_id = INVALID_PAGE_ID;
        self.lsn = 0;
    }
}

/// Smart pointer to a page; the RwLock doubles as the page latch.
pub type PagePtr = Arc<RwLock<Page>>;
