use std::collections::HashMap;
use std::sync::Arc;
use anyhow::Result;
use parking_lot::RwLock;
use log::debug;

use crate::common::types::{PageId, PAGE_SIZE};
use crate::index::hash::error::HashIndexError;
use crate::index::hash::hasher::KeyHasher;
use crate::storage::buffer::BufferPool;
use crate::storage::page::{BucketInsert, HashBucketPage, HashDirectoryPage, SlotCodec, MAX_DEPTH};

/// Disk-resident extendible hash index.
///
/// A single directory page maps the low `global_depth` bits of a key's
/// 32-bit hash to a bucket. Directory slots store bucket fingerprints (the
/// slot index masked to the bucket's local depth); `ref_to_page` resolves
/// fingerprints to actual page ids, so relocating a bucket across a split
/// never rewrites co-sibling slots page id by page id.
///
/// Latching discipline, acquired in this order and released in reverse:
/// the `ref_to_page` RwLock is the table latch (read on the fast paths,
/// write for any structural change), then the directory page latch, then
/// the bucket page latch. A fast-path writer that discovers it needs a
/// split or merge drops everything, retakes the table latch in write mode,
/// re-reads the state it computed, and only then mutates the topology.
pub struct ExtendibleHashIndex<K, V, H> {
    buffer_pool: Arc<dyn BufferPool>,
    directory_page_id: PageId,
    ref_to_page: RwLock<HashMap<u32, PageId>>,
    hasher: H,
    bucket: HashBucketPage<K, V>,
    directory: HashDirectoryPage,
}

impl<K, V, H> ExtendibleHashIndex<K, V, H>
where
    K: SlotCodec + PartialEq,
    V: SlotCodec + PartialEq,
    H: KeyHasher<K>,
{
    /// Create an empty index: depth-0 directory, one empty bucket.
    pub fn new(buffer_pool: Arc<dyn BufferPool>, hasher: H) -> Result<Self, HashIndexError> {
        // A zeroed page is a valid empty directory (global depth 0, one
        // slot with local depth 0 and fingerprint 0) and a valid empty
        // bucket, so initialization is just allocation.
        let (_, directory_page_id) = buffer_pool.new_page()?;
        let (_, bucket_page_id) = buffer_pool.new_page()?;
        buffer_pool.unpin_page(directory_page_id, true)?;
        buffer_pool.unpin_page(bucket_page_id, true)?;

        let mut ref_to_page = HashMap::new();
        ref_to_page.insert(0, bucket_page_id);

        Ok(Self {
            buffer_pool,
            directory_page_id,
            ref_to_page: RwLock::new(ref_to_page),
            hasher,
            bucket: HashBucketPage::new(),
            directory: HashDirectoryPage::new(),
        })
    }

    /// Pairs a bucket page can hold; fixed by the page size and the slot
    /// encoding widths.
    pub fn bucket_capacity(&self) -> usize {
        self.bucket.capacity()
    }

    fn hash(&self, key: &K) -> u32 {
        self.hasher.hash_key(key)
    }

    fn resolve(refs: &HashMap<u32, PageId>, bucket_ref: u32) -> Result<PageId, HashIndexError> {
        refs.get(&bucket_ref)
            .copied()
            .ok_or(HashIndexError::DanglingBucketRef(bucket_ref))
    }

    /// Collect every value stored under `key`.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>, HashIndexError> {
        let ref_to_page = self.ref_to_page.read();
        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let directory_guard = directory_page.read();

        let dir_index =
            (self.hash(key) & self.directory.global_depth_mask(&directory_guard)) as usize;
        let bucket_ref = self.directory.bucket_ref(&directory_guard, dir_index);
        let bucket_page_id = Self::resolve(&ref_to_page, bucket_ref)?;

        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let bucket_guard = bucket_page.read();
        let mut values = Vec::new();
        self.bucket.get_value(&bucket_guard, key, &mut values);

        drop(bucket_guard);
        drop(directory_guard);
        drop(ref_to_page);
        self.buffer_pool.unpin_page(bucket_page_id, false)?;
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(values)
    }

    /// Insert a pair. Returns false for an exact duplicate or when the
    /// target bucket sits at MAX_DEPTH and cannot split further.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool, HashIndexError> {
        loop {
            let ref_to_page = self.ref_to_page.read();
            let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
            let directory_guard = directory_page.read();

            let dir_index =
                (self.hash(key) & self.directory.global_depth_mask(&directory_guard)) as usize;
            let local_depth = self.directory.local_depth(&directory_guard, dir_index);
            let bucket_ref = self.directory.bucket_ref(&directory_guard, dir_index);
            let bucket_page_id = Self::resolve(&ref_to_page, bucket_ref)?;

            let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
            let mut bucket_guard = bucket_page.write();
            let outcome = self.bucket.insert(&mut bucket_guard, key, value);

            drop(bucket_guard);
            drop(directory_guard);
            drop(ref_to_page);

            match outcome {
                BucketInsert::Inserted => {
                    self.buffer_pool.unpin_page(bucket_page_id, true)?;
                    self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                    return Ok(true);
                }
                BucketInsert::Duplicate => {
                    self.buffer_pool.unpin_page(bucket_page_id, false)?;
                    self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                    return Ok(false);
                }
                BucketInsert::Full => {
                    self.buffer_pool.unpin_page(bucket_page_id, false)?;
                    self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                    if local_depth >= MAX_DEPTH {
                        return Ok(false);
                    }
                    // Upgrade to the structural path, then retry. Splits are
                    // bounded by MAX_DEPTH, so the retry terminates.
                    self.split_bucket(key)?;
                }
            }
        }
    }

    /// Split the bucket `key` routes to, doubling the directory first when
    /// the bucket's depth equals the global depth. Runs under the write
    /// table latch; rechecks everything the fast path observed.
    fn split_bucket(&self, key: &K) -> Result<(), HashIndexError> {
        let mut ref_to_page = self.ref_to_page.write();
        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let mut directory_guard = directory_page.write();

        let dir_index =
            (self.hash(key) & self.directory.global_depth_mask(&directory_guard)) as usize;
        let local_depth = self.directory.local_depth(&directory_guard, dir_index);
        let old_ref = self.directory.bucket_ref(&directory_guard, dir_index);
        let bucket_page_id = Self::resolve(&ref_to_page, old_ref)?;

        if local_depth >= MAX_DEPTH {
            drop(directory_guard);
            drop(ref_to_page);
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(());
        }

        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let mut bucket_guard = bucket_page.write();
        if !self.bucket.is_full(&bucket_guard) {
            // Another writer already split or removed; retry the fast path.
            drop(bucket_guard);
            drop(directory_guard);
            drop(ref_to_page);
            self.buffer_pool.unpin_page(bucket_page_id, false)?;
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(());
        }

        let (image_page, image_page_id) = self.buffer_pool.new_page()?;
        let mut image_guard = image_page.write();

        if local_depth == self.directory.global_depth(&directory_guard) {
            // Double the directory: the new upper half mirrors the lower.
            let old_size = self.directory.size(&directory_guard);
            for idx in 0..old_size {
                let depth = self.directory.local_depth(&directory_guard, idx);
                let bucket_ref = self.directory.bucket_ref(&directory_guard, idx);
                self.directory
                    .set_local_depth(&mut directory_guard, idx + old_size, depth);
                self.directory
                    .set_bucket_ref(&mut directory_guard, idx + old_size, bucket_ref);
            }
            self.directory.incr_global_depth(&mut directory_guard);
        }

        let new_depth = local_depth + 1;
        let old_mask = (1u32 << local_depth) - 1;
        let new_mask = (1u32 << new_depth) - 1;
        let surviving_ref = dir_index as u32 & new_mask;
        let image_ref = surviving_ref ^ (1 << local_depth);
        debug!(
            "splitting bucket {:#x} at depth {} into {:#x}/{:#x}",
            old_ref, local_depth, surviving_ref, image_ref
        );

        ref_to_page.remove(&old_ref);
        ref_to_page.insert(surviving_ref, bucket_page_id);
        ref_to_page.insert(image_ref, image_page_id);

        // Every slot that pointed at the old bucket gets the new depth and
        // its side of the split.
        let directory_size = self.directory.size(&directory_guard);
        for idx in 0..directory_size {
            if idx as u32 & old_mask == old_ref {
                self.directory.set_local_depth(&mut directory_guard, idx, new_depth);
                self.directory
                    .set_bucket_ref(&mut directory_guard, idx, idx as u32 & new_mask);
            }
        }

        // Move the live pairs whose new fingerprint falls on the image
        // side; their old slots become tombstones, the image compacts.
        for slot in 0..self.bucket.capacity() {
            if !self.bucket.is_occupied(&bucket_guard, slot) {
                break;
            }
            if !self.bucket.is_readable(&bucket_guard, slot) {
                continue;
            }
            let slot_key = self.bucket.key_at(&bucket_guard, slot);
            if self.hash(&slot_key) & new_mask != surviving_ref {
                let slot_value = self.bucket.value_at(&bucket_guard, slot);
                self.bucket.remove_at(&mut bucket_guard, slot);
                self.bucket.insert(&mut image_guard, &slot_key, &slot_value);
            }
        }

        drop(image_guard);
        drop(bucket_guard);
        drop(directory_guard);
        drop(ref_to_page);
        self.buffer_pool.unpin_page(image_page_id, true)?;
        self.buffer_pool.unpin_page(bucket_page_id, true)?;
        self.buffer_pool.unpin_page(self.directory_page_id, true)?;
        Ok(())
    }

    /// Remove a pair. A bucket left empty is merged with its split image
    /// when their depths allow it.
    pub fn remove(&self, key: &K, value: &V) -> Result<bool, HashIndexError> {
        let ref_to_page = self.ref_to_page.read();
        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let directory_guard = directory_page.read();

        let dir_index =
            (self.hash(key) & self.directory.global_depth_mask(&directory_guard)) as usize;
        let bucket_ref = self.directory.bucket_ref(&directory_guard, dir_index);
        let bucket_page_id = Self::resolve(&ref_to_page, bucket_ref)?;

        let bucket_page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let mut bucket_guard = bucket_page.write();

        if !self.bucket.remove(&mut bucket_guard, key, value) {
            drop(bucket_guard);
            drop(directory_guard);
            drop(ref_to_page);
            self.buffer_pool.unpin_page(bucket_page_id, false)?;
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(false);
        }

        let local_depth = self.directory.local_depth(&directory_guard, dir_index);
        let mut needs_merge = false;
        if local_depth > 0 && self.bucket.is_empty(&bucket_guard) {
            let image_index = dir_index ^ (1 << (local_depth - 1));
            needs_merge =
                self.directory.local_depth(&directory_guard, image_index) == local_depth;
        }

        drop(bucket_guard);
        drop(directory_guard);
        drop(ref_to_page);
        self.buffer_pool.unpin_page(bucket_page_id, true)?;
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;

        if needs_merge {
            self.merge_bucket(key)?;
        }
        Ok(true)
    }

    /// Coalesce the empty bucket `key` routes to with its split image,
    /// shrinking the directory when no bucket uses the top depth bit any
    /// more. Runs under the write table latch and re-verifies the merge
    /// conditions the fast path observed; a no-op when they no longer hold.
    fn merge_bucket(&self, key: &K) -> Result<(), HashIndexError> {
        let mut ref_to_page = self.ref_to_page.write();
        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let mut directory_guard = directory_page.write();

        let dir_index =
            (self.hash(key) & self.directory.global_depth_mask(&directory_guard)) as usize;
        let local_depth = self.directory.local_depth(&directory_guard, dir_index);

        let abandon = |directory_guard, ref_to_page| -> Result<(), HashIndexError> {
            drop(directory_guard);
            drop(ref_to_page);
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            Ok(())
        };

        if local_depth == 0 {
            return abandon(directory_guard, ref_to_page);
        }
        let image_index = dir_index ^ (1 << (local_depth - 1));
        if self.directory.local_depth(&directory_guard, image_index) != local_depth {
            return abandon(directory_guard, ref_to_page);
        }

        let empty_ref = self.directory.bucket_ref(&directory_guard, dir_index);
        let image_ref = self.directory.bucket_ref(&directory_guard, image_index);
        if empty_ref == image_ref {
            return abandon(directory_guard, ref_to_page);
        }
        let empty_page_id = Self::resolve(&ref_to_page, empty_ref)?;
        let survivor_page_id = Self::resolve(&ref_to_page, image_ref)?;

        // The bucket may have been refilled between the fast path and here.
        let empty_page = self.buffer_pool.fetch_page(empty_page_id)?;
        let still_empty = self.bucket.is_empty(&empty_page.read());
        self.buffer_pool.unpin_page(empty_page_id, false)?;
        if !still_empty {
            return abandon(directory_guard, ref_to_page);
        }

        let new_depth = local_depth - 1;
        let new_mask = (1u32 << new_depth) - 1;
        let merged_ref = dir_index as u32 & new_mask;
        debug!(
            "merging buckets {:#x}/{:#x} at depth {} into {:#x}",
            empty_ref, image_ref, local_depth, merged_ref
        );

        // Both halves' co-siblings drop to the shared depth and point at
        // the surviving bucket.
        let directory_size = self.directory.size(&directory_guard);
        for idx in 0..directory_size {
            if idx as u32 & new_mask == merged_ref {
                self.directory.set_local_depth(&mut directory_guard, idx, new_depth);
                self.directory.set_bucket_ref(&mut directory_guard, idx, merged_ref);
            }
        }
        ref_to_page.remove(&empty_ref);
        ref_to_page.remove(&image_ref);
        ref_to_page.insert(merged_ref, survivor_page_id);

        let global_depth = self.directory.global_depth(&directory_guard);
        if global_depth > 0 {
            let all_shallower = (0..self.directory.size(&directory_guard))
                .all(|idx| self.directory.local_depth(&directory_guard, idx) < global_depth);
            if all_shallower {
                self.directory.decr_global_depth(&mut directory_guard);
            }
        }

        drop(directory_guard);
        drop(ref_to_page);
        self.buffer_pool.unpin_page(self.directory_page_id, true)?;
        self.buffer_pool.delete_page(empty_page_id)?;
        Ok(())
    }

    pub fn get_global_depth(&self) -> Result<u32, HashIndexError> {
        let _table = self.ref_to_page.read();
        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let global_depth = self.directory.global_depth(&directory_page.read());
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(global_depth)
    }

    /// Check the directory invariants and that every live fingerprint
    /// resolves to a bucket page. Violations are fatal.
    pub fn verify_integrity(&self) -> Result<(), HashIndexError> {
        let ref_to_page = self.ref_to_page.read();
        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        {
            let directory_guard = directory_page.read();
            self.directory.verify_integrity(&directory_guard);
            for idx in 0..self.directory.size(&directory_guard) {
                let bucket_ref = self.directory.bucket_ref(&directory_guard, idx);
                assert!(
                    ref_to_page.contains_key(&bucket_ref),
                    "directory slot {} holds dangling fingerprint {:#x}",
                    idx,
                    bucket_ref
                );
            }
        }
        drop(ref_to_page);
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(())
    }
}

// PAGE_SIZE is re-checked here because the directory layout must fit one
// page alongside its header word.
const _: () = assert!(4 + (1usize << MAX_DEPTH) * 5 <= PAGE_SIZE);
