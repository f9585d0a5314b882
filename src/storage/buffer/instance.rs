use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use log::debug;

use crate::common::types::{FrameId, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::DiskManager;
use crate::transaction::wal::log_manager::LogManager;

/// Per-frame metadata. The page bytes live in the shared `PagePtr`; identity
/// and lifetime accounting live here, under the instance latch.
struct FrameMeta {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

impl FrameMeta {
    fn empty() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

/// Bookkeeping state of one instance. Everything in here is mutated only
/// while the instance mutex is held, which is what makes each public
/// operation atomic.
struct PoolInner {
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
    replacer: LruReplacer,
    meta: Vec<FrameMeta>,
    next_page_id: PageId,
    poisoned: bool,
}

/// One buffer pool shard: a fixed array of page frames with pin/unpin
/// lifetime accounting, LRU eviction, and a sharded page-id allocator.
///
/// An instance that is one of `num_instances` shards allocates page ids
/// `instance_index, instance_index + N, instance_index + 2N, …` so the id
/// spaces of sibling shards never overlap.
pub struct BufferPoolInstance {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    frames: Vec<PagePtr>,
    inner: Mutex<PoolInner>,
    disk_manager: Arc<DiskManager>,
    log_manager: Option<Arc<LogManager>>,
}

impl BufferPoolInstance {
    /// A stand-alone instance (the one-shard case).
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::new_sharded(pool_size, 1, 0, disk_manager, None)
    }

    /// One shard of a parallel pool.
    pub fn new_sharded(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        assert!(num_instances > 0, "a pool needs at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index {} out of range for {} instances",
            instance_index,
            num_instances
        );

        let frames = (0..pool_size)
            .map(|_| Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID))) as PagePtr)
            .collect();
        // Reverse push order so frames are first handed out as 0, 1, 2, …
        // while reuse through delete_page stays LIFO.
        let free_list: Vec<FrameId> = (0..pool_size).rev().collect();
        let meta = (0..pool_size).map(|_| FrameMeta::empty()).collect();

        Self {
            pool_size,
            num_instances,
            instance_index,
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
                replacer: LruReplacer::new(pool_size),
                meta,
                next_page_id: instance_index as PageId,
                poisoned: false,
            }),
            disk_manager,
            log_manager,
        }
    }

    /// Allocate a fresh page id from this shard's id space.
    fn allocate_page(&self, inner: &mut PoolInner) -> PageId {
        let page_id = inner.next_page_id;
        inner.next_page_id += self.num_instances as PageId;
        debug_assert_eq!(page_id as u32 % self.num_instances, self.instance_index);
        page_id
    }

    /// Pick a frame for a new resident page: free list first (LIFO), then an
    /// LRU victim with dirty writeback. The evicted page id is removed from
    /// the page table.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = inner.free_list.pop() {
            return Ok(frame_id);
        }

        let victim = inner.replacer.victim().ok_or(BufferPoolError::BufferPoolFull)?;
        let victim_page_id = inner.meta[victim].page_id;
        if inner.meta[victim].is_dirty {
            debug!("evicting dirty page {} from frame {}", victim_page_id, victim);
            self.flush_frame(inner, victim)?;
        }
        inner.page_table.remove(&victim_page_id);
        Ok(victim)
    }

    /// Write a frame's page to disk and clear its dirty flag. Runs with the
    /// instance latch held; a failed write poisons the instance.
    fn flush_frame(&self, inner: &mut PoolInner, frame_id: FrameId) -> Result<(), BufferPoolError> {
        let page = self.frames[frame_id].read();
        if let Some(log_manager) = &self.log_manager {
            // WAL rule: the log must reach disk before the page does.
            log_manager.flush_until(page.lsn)?;
        }
        if let Err(e) = self.disk_manager.write_page(&page) {
            inner.poisoned = true;
            return Err(e.into());
        }
        drop(page);
        inner.meta[frame_id].is_dirty = false;
        Ok(())
    }

    fn check_poisoned(inner: &PoolInner) -> Result<(), BufferPoolError> {
        if inner.poisoned {
            Err(BufferPoolError::Poisoned)
        } else {
            Ok(())
        }
    }

    /// Allocate a new zero-filled page, pinned in a frame.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut inner = self.inner.lock();
        Self::check_poisoned(&inner)?;

        let frame_id = self.acquire_frame(&mut inner)?;
        let page_id = self.allocate_page(&mut inner);

        {
            let mut page = self.frames[frame_id].write();
            page.reset();
            page.page_id = page_id;
        }
        inner.meta[frame_id] = FrameMeta {
            page_id,
            pin_count: 1,
            is_dirty: false,
        };
        inner.page_table.insert(page_id, frame_id);

        Ok((self.frames[frame_id].clone(), page_id))
    }

    /// Fetch a page, reading it from disk if it is not resident.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        let mut inner = self.inner.lock();
        Self::check_poisoned(&inner)?;

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            if inner.meta[frame_id].pin_count == 0 {
                inner.replacer.pin(frame_id);
            }
            inner.meta[frame_id].pin_count += 1;
            return Ok(self.frames[frame_id].clone());
        }

        let frame_id = self.acquire_frame(&mut inner)?;
        {
            let mut page = self.frames[frame_id].write();
            if let Err(e) = self.disk_manager.read_page(page_id, &mut page) {
                drop(page);
                inner.free_list.push(frame_id);
                inner.meta[frame_id] = FrameMeta::empty();
                inner.poisoned = true;
                return Err(e.into());
            }
            page.page_id = page_id;
        }
        inner.meta[frame_id] = FrameMeta {
            page_id,
            pin_count: 1,
            is_dirty: false,
        };
        inner.page_table.insert(page_id, frame_id);

        Ok(self.frames[frame_id].clone())
    }

    /// Drop one pin on a page, folding in the caller's dirty flag. On the
    /// last unpin the frame becomes an eviction candidate.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut inner = self.inner.lock();

        let frame_id = *inner
            .page_table
            .get(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;
        if inner.meta[frame_id].pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }

        inner.meta[frame_id].is_dirty |= is_dirty;
        inner.meta[frame_id].pin_count -= 1;
        if inner.meta[frame_id].pin_count == 0 {
            inner.replacer.unpin(frame_id);
        }
        Ok(())
    }

    /// Write a resident page to disk and clear its dirty flag. Pin count and
    /// residency are untouched.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut inner = self.inner.lock();
        Self::check_poisoned(&inner)?;

        let frame_id = *inner
            .page_table
            .get(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;
        self.flush_frame(&mut inner, frame_id)
    }

    /// Flush every resident page. The instance latch is held for the whole
    /// scan, so the flush set is exactly the set of pages resident when the
    /// call started; concurrent writers may re-dirty pages afterwards.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let mut inner = self.inner.lock();
        Self::check_poisoned(&inner)?;

        let frame_ids: Vec<FrameId> = inner.page_table.values().copied().collect();
        for frame_id in frame_ids {
            self.flush_frame(&mut inner, frame_id)?;
        }
        Ok(())
    }

    /// Drop a page from the pool and return its id to the allocator.
    /// Deleting a page that is not resident succeeds trivially; deleting a
    /// pinned page fails.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut inner = self.inner.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(());
        };
        if inner.meta[frame_id].pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        inner.replacer.pin(frame_id);
        self.frames[frame_id].write().reset();
        inner.meta[frame_id] = FrameMeta::empty();
        inner.page_table.remove(&page_id);
        inner.free_list.push(frame_id);
        self.disk_manager.deallocate_page(page_id);

        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl BufferPool for BufferPoolInstance {
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        BufferPoolInstance::new_page(self)
    }

    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        BufferPoolInstance::fetch_page(self, page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        BufferPoolInstance::unpin_page(self, page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        BufferPoolInstance::flush_page(self, page_id)
    }

    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        BufferPoolInstance::flush_all_pages(self)
    }

    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        BufferPoolInstance::delete_page(self, page_id)
    }

    fn pool_size(&self) -> usize {
        BufferPoolInstance::pool_size(self)
    }
}
