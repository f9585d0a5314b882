use anyhow::Result;

use opaldb::storage::buffer::BufferPoolError;

mod common;
use common::create_test_parallel_pool;

// Sharded allocation: three instances of size four, six allocations.
// Ids come out distinct, one per shard, cycling shards round-robin from
// start index zero.
#[test]
fn test_round_robin_sharded_allocation() -> Result<()> {
    let (pool, _disk, _temp_file) = create_test_parallel_pool(3, 4)?;

    let mut page_ids = Vec::new();
    for _ in 0..6 {
        let (_, page_id) = pool.new_page()?;
        page_ids.push(page_id);
    }

    assert_eq!(page_ids, vec![0, 1, 2, 3, 4, 5]);
    for (call, &page_id) in page_ids.iter().enumerate() {
        assert_eq!(page_id as usize % 3, call % 3);
    }

    for page_id in page_ids {
        pool.unpin_page(page_id, false)?;
    }
    Ok(())
}

#[test]
fn test_operations_route_to_owning_shard() -> Result<()> {
    let (pool, _disk, _temp_file) = create_test_parallel_pool(3, 4)?;

    let mut page_ids = Vec::new();
    for i in 0..6u8 {
        let (page, page_id) = pool.new_page()?;
        page.write().data[0] = i;
        pool.unpin_page(page_id, true)?;
        page_ids.push(page_id);
    }

    // Every id finds its way back to the shard that allocated it.
    for (i, &page_id) in page_ids.iter().enumerate() {
        let page = pool.fetch_page(page_id)?;
        assert_eq!(page.read().data[0], i as u8);
        assert_eq!(page.read().page_id, page_id);
        pool.unpin_page(page_id, false)?;
    }

    pool.flush_all_pages()?;
    for &page_id in &page_ids {
        pool.delete_page(page_id)?;
    }
    Ok(())
}

#[test]
fn test_pool_size_reports_all_shards() -> Result<()> {
    let (pool, _disk, _temp_file) = create_test_parallel_pool(5, 10)?;
    assert_eq!(pool.pool_size(), 50);
    Ok(())
}

// A full sweep tries every shard once before giving up; freeing any one
// shard makes allocation succeed again.
#[test]
fn test_new_page_sweeps_all_shards() -> Result<()> {
    let (pool, _disk, _temp_file) = create_test_parallel_pool(2, 1)?;

    let (_, a) = pool.new_page()?;
    let (_, b) = pool.new_page()?;
    assert!(matches!(pool.new_page(), Err(BufferPoolError::BufferPoolFull)));

    pool.unpin_page(b, false)?;
    let (_, c) = pool.new_page()?;
    assert_eq!(c as usize % 2, b as usize % 2);

    pool.unpin_page(a, false)?;
    pool.unpin_page(c, false)?;
    Ok(())
}

#[test]
fn test_shard_id_spaces_are_disjoint() -> Result<()> {
    let (pool, _disk, _temp_file) = create_test_parallel_pool(3, 8)?;

    let mut page_ids = Vec::new();
    for _ in 0..12 {
        let (_, page_id) = pool.new_page()?;
        page_ids.push(page_id);
    }

    let mut sorted = page_ids.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 12);

    for page_id in page_ids {
        pool.unpin_page(page_id, false)?;
    }
    Ok(())
}
