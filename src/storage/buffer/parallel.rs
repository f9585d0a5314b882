use std::sync::Arc;
use parking_lot::Mutex;

use crate::common::types::{PageId, PagePtr};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::instance::BufferPoolInstance;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::DiskManager;
use crate::transaction::wal::log_manager::LogManager;

/// A buffer pool sharded across `N` instances. Every id-addressed operation
/// routes to instance `page_id mod N`; because each instance allocates only
/// ids congruent to its own index, a page always routes back to the shard
/// that created it.
pub struct ParallelBufferPool {
    instances: Vec<Arc<BufferPoolInstance>>,
    start_index: Mutex<usize>,
    instance_size: usize,
}

impl ParallelBufferPool {
    pub fn new(
        num_instances: usize,
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        assert!(num_instances > 0, "a parallel pool needs at least one instance");

        let instances = (0..num_instances)
            .map(|i| {
                Arc::new(BufferPoolInstance::new_sharded(
                    pool_size,
                    num_instances as u32,
                    i as u32,
                    disk_manager.clone(),
                    log_manager.clone(),
                ))
            })
            .collect();

        Self {
            instances,
            start_index: Mutex::new(0),
            instance_size: pool_size,
        }
    }

    fn instance_for(&self, page_id: PageId) -> &BufferPoolInstance {
        let shard = page_id.rem_euclid(self.instances.len() as PageId) as usize;
        &self.instances[shard]
    }

    /// Allocate a new page, sweeping the instances round-robin. The sweep
    /// starts at a rotating index that advances by exactly one per call,
    /// whether or not the allocation succeeds, so load spreads across
    /// shards. A full sweep visits every shard once.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut start_index = self.start_index.lock();
        let start = *start_index;
        *start_index = (start + 1) % self.instances.len();
        drop(start_index);

        for offset in 0..self.instances.len() {
            let instance = &self.instances[(start + offset) % self.instances.len()];
            match instance.new_page() {
                Ok(result) => return Ok(result),
                Err(BufferPoolError::BufferPoolFull) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(BufferPoolError::BufferPoolFull)
    }

    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        self.instance_for(page_id).fetch_page(page_id)
    }

    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        self.instance_for(page_id).flush_page(page_id)
    }

    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        self.instance_for(page_id).delete_page(page_id)
    }

    /// Combined capacity of all shards.
    pub fn pool_size(&self) -> usize {
        self.instances.len() * self.instance_size
    }
}

impl BufferPool for ParallelBufferPool {
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        ParallelBufferPool::new_page(self)
    }

    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        ParallelBufferPool::fetch_page(self, page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        ParallelBufferPool::unpin_page(self, page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        ParallelBufferPool::flush_page(self, page_id)
    }

    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        ParallelBufferPool::flush_all_pages(self)
    }

    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        ParallelBufferPool::delete_page(self, page_id)
    }

    fn pool_size(&self) -> usize {
        ParallelBufferPool::pool_size(self)
    }
}
