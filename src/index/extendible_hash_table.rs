use std::marker::PhantomData;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::buffer::BufferPool;
use crate::common::{PageId, Result, Transaction, DIRECTORY_MAX_DEPTH};
use crate::storage::page::{
    bucket_array_size, HashTableBucketPage, HashTableBucketPageRef, HashTableDirectoryPage,
    HashTableDirectoryPageRef, Storable,
};

use super::{KeyComparator, KeyHasher};

/// A disk-backed extendible hash table.
///
/// The directory and every bucket live in buffer-pool pages; each
/// operation borrows the pages it needs and returns them with an honest
/// dirty flag. Keys hash to 32 bits, of which the low `global_depth`
/// bits select a directory slot and the slot names the bucket page.
///
/// The same key may be stored under several distinct values; only the
/// exact (key, value) pair is unique.
///
/// A table-wide reader-writer latch serializes structural changes:
/// lookups take it shared, insert/remove take it exclusively since they
/// may split buckets or double the directory.
pub struct ExtendibleHashTable<K, V, C, H> {
    directory_page_id: PageId,
    buffer_pool: Arc<dyn BufferPool>,
    comparator: C,
    hasher: H,
    table_latch: RwLock<()>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, C, H> ExtendibleHashTable<K, V, C, H>
where
    K: Storable,
    V: Storable,
    C: KeyComparator<K>,
    H: KeyHasher<K>,
{
    /// Creates a table with a depth-1 directory wired to two fresh
    /// buckets. Needs three free frames in the buffer pool.
    pub fn new(buffer_pool: Arc<dyn BufferPool>, comparator: C, hasher: H) -> Result<Self> {
        let (directory_page_id, directory_frame) = buffer_pool.new_page()?;
        let (bucket_page_id_0, _bucket_frame_0) = buffer_pool.new_page()?;
        let (bucket_page_id_1, _bucket_frame_1) = buffer_pool.new_page()?;

        {
            let mut data = directory_frame.write_data();
            let mut directory = HashTableDirectoryPage::new(&mut data[..]);
            directory.init(directory_page_id);
            directory.incr_global_depth();
            directory.set_bucket_page_id(0, bucket_page_id_0);
            directory.set_local_depth(0, 1);
            directory.set_bucket_page_id(1, bucket_page_id_1);
            directory.set_local_depth(1, 1);
        }

        // A fresh page is zeroed and a zeroed bucket is validly empty,
        // so the buckets go back clean.
        buffer_pool.unpin_page(bucket_page_id_0, false);
        buffer_pool.unpin_page(bucket_page_id_1, false);
        buffer_pool.unpin_page(directory_page_id, true);

        Ok(Self {
            directory_page_id,
            buffer_pool,
            comparator,
            hasher,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    /// Collects every value stored under `key`.
    pub fn get_value(&self, _transaction: Option<&Transaction>, key: &K) -> Result<Vec<V>> {
        let _latch = self.table_latch.read();

        let bucket_page_id = self.bucket_page_for(key)?;

        let bucket_frame = self.buffer_pool.fetch_page(bucket_page_id)?;
        let values = {
            let data = bucket_frame.read_data();
            let bucket = HashTableBucketPageRef::<K, V>::new(&data[..]);
            bucket.get_value(key, &self.comparator)
        };
        self.buffer_pool.unpin_page(bucket_page_id, false);

        Ok(values)
    }

    /// Inserts the (key, value) pair, splitting its bucket - and
    /// doubling the directory - as often as needed to make room.
    ///
    /// Returns false if the exact pair is already present, or if the
    /// directory is at maximum depth and the overflowing bucket cannot
    /// be partitioned any further.
    pub fn insert(&self, _transaction: Option<&Transaction>, key: &K, value: &V) -> Result<bool> {
        let _latch = self.table_latch.write();

        loop {
            let bucket_page_id = self.bucket_page_for(key)?;

            let bucket_frame = self.buffer_pool.fetch_page(bucket_page_id)?;
            let (is_full, inserted) = {
                let mut data = bucket_frame.write_data();
                let mut bucket = HashTableBucketPage::<K, V>::new(&mut data[..]);
                if bucket.is_full() {
                    (true, false)
                } else {
                    (false, bucket.insert(key, value, &self.comparator))
                }
            };
            self.buffer_pool.unpin_page(bucket_page_id, inserted);

            if !is_full {
                return Ok(inserted);
            }
            if !self.split_bucket(key)? {
                return Ok(false);
            }
        }
    }

    /// Removes the first pair matching the key (by comparator) and the
    /// value (by equality). Returns whether anything was removed.
    pub fn remove(&self, transaction: Option<&Transaction>, key: &K, value: &V) -> Result<bool> {
        let _latch = self.table_latch.write();

        let bucket_page_id = self.bucket_page_for(key)?;

        let bucket_frame = self.buffer_pool.fetch_page(bucket_page_id)?;
        let (removed, now_empty) = {
            let mut data = bucket_frame.write_data();
            let mut bucket = HashTableBucketPage::<K, V>::new(&mut data[..]);
            let removed = bucket.remove(key, value, &self.comparator);
            (removed, bucket.is_empty())
        };
        self.buffer_pool.unpin_page(bucket_page_id, removed);

        if now_empty {
            self.merge(transaction, key, value);
        }
        Ok(removed)
    }

    pub fn global_depth(&self) -> Result<u32> {
        let _latch = self.table_latch.read();

        let directory_frame = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let depth = {
            let data = directory_frame.read_data();
            HashTableDirectoryPageRef::new(&data[..]).global_depth()
        };
        self.buffer_pool.unpin_page(self.directory_page_id, false);
        Ok(depth)
    }

    /// Panics if the directory violates its structural invariants.
    pub fn verify_integrity(&self) -> Result<()> {
        let _latch = self.table_latch.read();

        let directory_frame = self.buffer_pool.fetch_page(self.directory_page_id)?;
        {
            let data = directory_frame.read_data();
            HashTableDirectoryPageRef::new(&data[..]).verify_integrity();
        }
        self.buffer_pool.unpin_page(self.directory_page_id, false);
        Ok(())
    }

    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    fn hash(&self, key: &K) -> u32 {
        self.hasher.hash_key(key)
    }

    /// Resolves the key's bucket page through the directory. The
    /// directory pin is dropped before returning; the table latch keeps
    /// the mapping stable.
    fn bucket_page_for(&self, key: &K) -> Result<PageId> {
        let directory_frame = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let bucket_page_id = {
            let data = directory_frame.read_data();
            let directory = HashTableDirectoryPageRef::new(&data[..]);
            let idx = (self.hash(key) & directory.global_depth_mask()) as usize;
            directory.bucket_page_id(idx)
        };
        self.buffer_pool.unpin_page(self.directory_page_id, false);
        Ok(bucket_page_id)
    }

    /// Splits the bucket the key resolves to, doubling the directory
    /// first when the bucket's local depth has caught up with the
    /// global depth.
    ///
    /// Returns false - without changing anything - when the directory
    /// is already at maximum depth and the bucket cannot split.
    fn split_bucket(&self, key: &K) -> Result<bool> {
        let directory_frame = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let mut data = directory_frame.write_data();
        let mut directory = HashTableDirectoryPage::new(&mut data[..]);

        let idx = (self.hash(key) & directory.global_depth_mask()) as usize;
        let local_depth = directory.local_depth(idx);
        let global_depth = directory.global_depth();

        if local_depth == global_depth && global_depth == DIRECTORY_MAX_DEPTH {
            drop(directory);
            drop(data);
            self.buffer_pool.unpin_page(self.directory_page_id, false);
            return Ok(false);
        }

        let bucket_page_id = directory.bucket_page_id(idx);

        let doubled = local_depth == global_depth;
        if doubled {
            let old_size = directory.size();
            directory.incr_global_depth();
            debug!(
                "doubling hash directory to global depth {}",
                directory.global_depth()
            );
            // New upper-half slots start out as images of the lower half.
            for slot in old_size..directory.size() {
                let image = slot - old_size;
                let image_page_id = directory.bucket_page_id(image);
                let image_depth = directory.local_depth(image);
                directory.set_bucket_page_id(slot, image_page_id);
                directory.set_local_depth(slot, image_depth as u8);
            }
        }

        let new_local_depth = local_depth + 1;
        let low_bits = idx & ((1usize << local_depth) - 1);
        let sibling_bits = low_bits | (1usize << local_depth);

        let (new_bucket_page_id, new_bucket_frame) = match self.buffer_pool.new_page() {
            Ok(page) => page,
            Err(e) => {
                drop(directory);
                drop(data);
                self.buffer_pool.unpin_page(self.directory_page_id, doubled);
                return Err(e);
            }
        };
        let old_bucket_frame = match self.buffer_pool.fetch_page(bucket_page_id) {
            Ok(frame) => frame,
            Err(e) => {
                drop(directory);
                drop(data);
                self.buffer_pool.unpin_page(new_bucket_page_id, false);
                self.buffer_pool.unpin_page(self.directory_page_id, doubled);
                return Err(e);
            }
        };

        debug!(
            "splitting bucket {} at local depth {} into {}",
            bucket_page_id, local_depth, new_bucket_page_id
        );

        // Move every entry whose low new_local_depth hash bits select
        // the sibling pattern.
        {
            let mut old_data = old_bucket_frame.write_data();
            let mut new_data = new_bucket_frame.write_data();
            let mut old_bucket = HashTableBucketPage::<K, V>::new(&mut old_data[..]);
            let mut new_bucket = HashTableBucketPage::<K, V>::new(&mut new_data[..]);

            for slot in 0..bucket_array_size::<K, V>() {
                if !old_bucket.is_readable(slot) {
                    continue;
                }
                let slot_key = old_bucket.key_at(slot);
                let hash_bits = (self.hash(&slot_key) as usize) & ((1usize << new_local_depth) - 1);
                if hash_bits == sibling_bits {
                    let slot_value = old_bucket.value_at(slot);
                    new_bucket.insert(&slot_key, &slot_value, &self.comparator);
                    old_bucket.remove_at(slot);
                }
            }
        }

        // Repoint every directory slot sharing the sibling's low bits,
        // and record the deeper local depth on both sides of the split.
        let mask = (1usize << new_local_depth) - 1;
        for slot in 0..directory.size() {
            if slot & mask == sibling_bits {
                directory.set_bucket_page_id(slot, new_bucket_page_id);
                directory.set_local_depth(slot, new_local_depth as u8);
            } else if slot & mask == low_bits {
                directory.set_local_depth(slot, new_local_depth as u8);
            }
        }

        drop(directory);
        drop(data);
        self.buffer_pool.unpin_page(bucket_page_id, true);
        self.buffer_pool.unpin_page(new_bucket_page_id, true);
        self.buffer_pool.unpin_page(self.directory_page_id, true);
        Ok(true)
    }

    /// Empty buckets are left in place: coalescing is intentionally not
    /// implemented, so local depths never decrease and the directory
    /// never halves.
    fn merge(&self, _transaction: Option<&Transaction>, _key: &K, _value: &V) {}
}
