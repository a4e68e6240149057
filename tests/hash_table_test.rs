//! End-to-end tests for the extendible hash table

use std::sync::Arc;

use strata::buffer::{BufferPool, BufferPoolInstance, ParallelBufferPool};
use strata::index::{ExtendibleHashTable, KeyHasher, MurmurHasher, OrdComparator};
use strata::storage::disk::DiskManager;
use tempfile::NamedTempFile;

/// Uses the key itself as its hash, so tests can steer keys into
/// specific directory slots.
struct IdentityHasher;

impl KeyHasher<u64> for IdentityHasher {
    fn hash_key(&self, key: &u64) -> u32 {
        *key as u32
    }
}

/// Hashes every key to zero: all keys collide into one bucket and no
/// split can ever separate them.
struct ConstantHasher;

impl KeyHasher<u64> for ConstantHasher {
    fn hash_key(&self, _key: &u64) -> u32 {
        0
    }
}

fn single_instance_pool(pool_size: usize) -> (Arc<BufferPoolInstance>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    (Arc::new(BufferPoolInstance::new(pool_size, dm, None)), temp_file)
}

#[test]
fn test_bucket_split_keeps_all_keys_reachable() {
    let (pool, _temp) = single_instance_pool(16);
    let table = ExtendibleHashTable::<u64, u64, _, _>::new(
        pool.clone() as Arc<dyn BufferPool>,
        OrdComparator,
        IdentityHasher,
    )
    .unwrap();

    // 600 keys split 300/300 over the two depth-1 buckets, which hold
    // 252 entries each, so both sides must split.
    for key in 0..600u64 {
        assert!(table.insert(None, &key, &(key * 7)).unwrap(), "key {}", key);
    }

    assert!(table.global_depth().unwrap() >= 2);
    table.verify_integrity().unwrap();

    for key in 0..600u64 {
        assert_eq!(table.get_value(None, &key).unwrap(), vec![key * 7]);
    }
}

#[test]
fn test_directory_doubling_chain() {
    let (pool, _temp) = single_instance_pool(16);
    let table = ExtendibleHashTable::<u64, u64, _, _>::new(
        pool.clone() as Arc<dyn BufferPool>,
        OrdComparator,
        IdentityHasher,
    )
    .unwrap();

    let mut last_depth = table.global_depth().unwrap();
    assert_eq!(last_depth, 1);

    for key in 0..1600u64 {
        assert!(table.insert(None, &key, &key).unwrap());

        let depth = table.global_depth().unwrap();
        assert!(depth >= last_depth, "global depth shrank at key {}", key);
        last_depth = depth;
    }

    // 800 keys per low bit force two rounds of doubling.
    assert!(last_depth >= 3);
    table.verify_integrity().unwrap();

    for key in 0..1600u64 {
        assert_eq!(table.get_value(None, &key).unwrap(), vec![key]);
    }

    // Nothing is left pinned once the dust settles.
    assert_eq!(pool.pin_count(table.directory_page_id()), Some(0));
}

#[test]
fn test_unsplittable_bucket_fails_the_insert() {
    let (pool, _temp) = single_instance_pool(16);
    let table = ExtendibleHashTable::<u64, u64, _, _>::new(
        pool.clone() as Arc<dyn BufferPool>,
        OrdComparator,
        ConstantHasher,
    )
    .unwrap();

    // Every key lands in the same bucket; fill it exactly.
    let capacity = strata::storage::page::bucket_array_size::<u64, u64>() as u64;
    for key in 0..capacity {
        assert!(table.insert(None, &key, &key).unwrap(), "key {}", key);
    }

    // One more key drives the directory to its maximum depth, after
    // which the insert must give up instead of looping.
    assert!(!table.insert(None, &capacity, &capacity).unwrap());
    table.verify_integrity().unwrap();

    // The failed insert lost nothing.
    for key in 0..capacity {
        assert_eq!(table.get_value(None, &key).unwrap(), vec![key]);
    }

    // Freeing a slot makes the bucket insertable again.
    assert!(table.remove(None, &0, &0).unwrap());
    assert!(table.insert(None, &capacity, &capacity).unwrap());
    assert_eq!(
        table.get_value(None, &capacity).unwrap(),
        vec![capacity]
    );
}

#[test]
fn test_insert_get_remove_laws_under_real_hashing() {
    let (pool, _temp) = single_instance_pool(32);
    let table = ExtendibleHashTable::<u32, u32, _, _>::new(
        pool.clone() as Arc<dyn BufferPool>,
        OrdComparator,
        MurmurHasher::new(),
    )
    .unwrap();

    for key in 0..1000u32 {
        assert!(table.insert(None, &key, &(key + 1)).unwrap());
    }
    table.verify_integrity().unwrap();

    // Everything inserted is found.
    for key in 0..1000u32 {
        assert_eq!(table.get_value(None, &key).unwrap(), vec![key + 1]);
    }

    // A second identical insert is rejected and does not duplicate.
    assert!(!table.insert(None, &500, &501).unwrap());
    assert_eq!(table.get_value(None, &500).unwrap(), vec![501]);

    // Remove every even key; odd keys survive.
    for key in (0..1000u32).step_by(2) {
        assert!(table.remove(None, &key, &(key + 1)).unwrap());
    }
    for key in 0..1000u32 {
        let values = table.get_value(None, &key).unwrap();
        if key % 2 == 0 {
            assert!(values.is_empty(), "key {} should be gone", key);
        } else {
            assert_eq!(values, vec![key + 1]);
        }
    }
    table.verify_integrity().unwrap();
}

#[test]
fn test_hash_table_over_sharded_pool() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let pool = Arc::new(ParallelBufferPool::new(4, 8, dm, None));

    let table = ExtendibleHashTable::<u32, u32, _, _>::new(
        pool.clone() as Arc<dyn BufferPool>,
        OrdComparator,
        MurmurHasher::new(),
    )
    .unwrap();

    for key in 0..800u32 {
        assert!(table.insert(None, &key, &key).unwrap());
    }
    table.verify_integrity().unwrap();

    for key in 0..800u32 {
        assert_eq!(table.get_value(None, &key).unwrap(), vec![key]);
    }

    // Index pages were allocated round-robin across all four shards and
    // every operation still found them.
    assert_eq!(pool.pin_count(table.directory_page_id()), Some(0));
}
