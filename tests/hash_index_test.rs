use std::sync::Arc;
use std::thread;
use anyhow::Result;

use opaldb::index::hash::{DefaultKeyHasher, ExtendibleHashIndex, KeyHasher};
use opaldb::storage::buffer::BufferPool;

mod common;
use common::{create_test_buffer_pool, create_test_parallel_pool, init_test_logging};

/// Routes a key by its own value, so tests place keys in chosen directory
/// slots.
struct IdentityHasher;

impl KeyHasher<i32> for IdentityHasher {
    fn hash_key(&self, key: &i32) -> u32 {
        *key as u32
    }
}

/// Sends every key to directory index 0.
struct ConstantHasher;

impl KeyHasher<i32> for ConstantHasher {
    fn hash_key(&self, _key: &i32) -> u32 {
        0
    }
}

fn create_test_index<H: KeyHasher<i32>>(
    pool_size: usize,
    hasher: H,
) -> Result<(
    ExtendibleHashIndex<i32, i32, H>,
    tempfile::NamedTempFile,
)> {
    let (buffer_pool, _disk, temp_file) = create_test_buffer_pool(pool_size)?;
    let buffer_pool: Arc<dyn BufferPool> = buffer_pool;
    let index = ExtendibleHashIndex::new(buffer_pool, hasher)?;
    Ok((index, temp_file))
}

#[test]
fn test_insert_and_get_value() -> Result<()> {
    init_test_logging();
    let (index, _temp_file) = create_test_index(10, DefaultKeyHasher)?;

    assert!(index.insert(&1, &10)?);
    assert!(index.insert(&2, &20)?);
    assert!(index.insert(&1, &11)?);

    let mut values = index.get_value(&1)?;
    values.sort();
    assert_eq!(values, vec![10, 11]);
    assert_eq!(index.get_value(&2)?, vec![20]);
    assert!(index.get_value(&3)?.is_empty());

    index.verify_integrity()?;
    Ok(())
}

#[test]
fn test_duplicate_pair_rejected() -> Result<()> {
    let (index, _temp_file) = create_test_index(10, DefaultKeyHasher)?;

    assert!(index.insert(&7, &70)?);
    assert!(!index.insert(&7, &70)?);
    assert_eq!(index.get_value(&7)?, vec![70]);
    Ok(())
}

#[test]
fn test_remove() -> Result<()> {
    let (index, _temp_file) = create_test_index(10, DefaultKeyHasher)?;

    assert!(index.insert(&5, &50)?);
    assert!(index.insert(&5, &51)?);

    assert!(index.remove(&5, &50)?);
    assert_eq!(index.get_value(&5)?, vec![51]);
    // Already removed, and never-present pairs, both report false.
    assert!(!index.remove(&5, &50)?);
    assert!(!index.remove(&6, &60)?);

    assert!(index.remove(&5, &51)?);
    assert!(index.get_value(&5)?.is_empty());
    Ok(())
}

// Overflowing a depth-0 index forces exactly one split: global depth goes
// to 1, both halves hold data, and nothing is lost or duplicated.
#[test]
fn test_overflow_splits_bucket() -> Result<()> {
    let (index, _temp_file) = create_test_index(10, IdentityHasher)?;
    let capacity = index.bucket_capacity() as i32;

    assert_eq!(index.get_global_depth()?, 0);
    for key in 0..=capacity {
        assert!(index.insert(&key, &(key * 2))?, "failed to insert {}", key);
    }

    assert_eq!(index.get_global_depth()?, 1);
    index.verify_integrity()?;

    let mut even = 0;
    let mut odd = 0;
    for key in 0..=capacity {
        let values = index.get_value(&key)?;
        assert_eq!(values, vec![key * 2], "key {} after split", key);
        if key % 2 == 0 {
            even += 1;
        } else {
            odd += 1;
        }
    }
    assert!(even > 0 && odd > 0);
    Ok(())
}

// Draining one half of a split index merges the empty bucket back into its
// image and shrinks the directory to depth 0.
#[test]
fn test_emptied_bucket_merges_and_directory_shrinks() -> Result<()> {
    let (index, _temp_file) = create_test_index(10, IdentityHasher)?;
    let capacity = index.bucket_capacity() as i32;

    for key in 0..=capacity {
        index.insert(&key, &(key * 2))?;
    }
    assert_eq!(index.get_global_depth()?, 1);

    // Odd hashes live in the split image; removing them all empties it.
    for key in (1..=capacity).step_by(2) {
        assert!(index.remove(&key, &(key * 2))?);
    }

    assert_eq!(index.get_global_depth()?, 0);
    index.verify_integrity()?;

    for key in (0..=capacity).step_by(2) {
        assert_eq!(index.get_value(&key)?, vec![key * 2]);
    }
    for key in (1..=capacity).step_by(2) {
        assert!(index.get_value(&key)?.is_empty());
    }
    Ok(())
}

// With every key hashing to the same slot, splitting never relieves the
// pressure: the bucket chain bottoms out at MAX_DEPTH and further inserts
// report the index full.
#[test]
fn test_insert_fails_at_max_depth() -> Result<()> {
    let (index, _temp_file) = create_test_index(30, ConstantHasher)?;
    let capacity = index.bucket_capacity() as i32;

    for key in 0..capacity {
        assert!(index.insert(&key, &key)?);
    }
    assert!(!index.insert(&capacity, &capacity)?);
    assert_eq!(index.get_global_depth()?, 9);
    index.verify_integrity()?;

    // Everything inserted before the capacity wall is still there.
    for key in 0..capacity {
        assert_eq!(index.get_value(&key)?, vec![key]);
    }
    Ok(())
}

#[test]
fn test_mixed_workload_sweep() -> Result<()> {
    let (index, _temp_file) = create_test_index(50, DefaultKeyHasher)?;
    let keys = 100;

    for i in 0..keys {
        assert!(index.insert(&i, &i)?, "failed to insert {}", i);
        assert_eq!(index.get_value(&i)?, vec![i]);
    }
    index.verify_integrity()?;

    for i in 0..keys {
        assert_eq!(index.get_value(&i)?, vec![i], "failed to keep {}", i);
    }

    // A second value per key is fine; the exact same pair is not.
    for i in 0..keys {
        if i == 0 {
            assert!(!index.insert(&i, &(2 * i))?);
            assert_eq!(index.get_value(&i)?, vec![0]);
        } else {
            assert!(index.insert(&i, &(2 * i))?);
            let mut values = index.get_value(&i)?;
            values.sort();
            assert_eq!(values, vec![i, 2 * i]);
        }
    }
    index.verify_integrity()?;

    for i in 0..keys {
        assert!(index.remove(&i, &i)?);
        if i == 0 {
            assert!(index.get_value(&i)?.is_empty());
        } else {
            assert_eq!(index.get_value(&i)?, vec![2 * i]);
        }
    }
    index.verify_integrity()?;

    for i in 1..keys {
        assert!(index.remove(&i, &(2 * i))?);
    }
    assert!(!index.remove(&0, &0)?);
    index.verify_integrity()?;
    Ok(())
}

#[test]
fn test_concurrent_inserts_on_parallel_pool() -> Result<()> {
    let (pool, _disk, _temp_file) = create_test_parallel_pool(5, 10)?;
    let buffer_pool: Arc<dyn BufferPool> = pool;
    let index = Arc::new(ExtendibleHashIndex::new(buffer_pool, DefaultKeyHasher)?);

    let writer = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for i in 5000..10000 {
                index.insert(&i, &i).unwrap();
                assert_eq!(index.get_value(&i).unwrap(), vec![i]);
            }
        })
    };
    for i in 0..5000 {
        index.insert(&i, &i)?;
        assert_eq!(index.get_value(&i)?, vec![i]);
    }
    writer.join().unwrap();

    for i in 0..10000 {
        assert_eq!(index.get_value(&i)?, vec![i], "lost key {}", i);
    }
    index.verify_integrity()?;
    Ok(())
}
