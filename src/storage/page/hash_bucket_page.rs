use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::common::PAGE_SIZE;
use crate::index::KeyComparator;

use super::Storable;

/// Number of (key, value) pairs a bucket page can hold.
///
/// Each pair needs its encoded bytes plus two bits (occupied, readable),
/// i.e. `size + 1/4` bytes, hence
/// `4 * PAGE_SIZE / (4 * pair_size + 1)` pairs per page.
pub const fn bucket_array_size<K: Storable, V: Storable>() -> usize {
    (4 * PAGE_SIZE) / (4 * (K::ENCODED_SIZE + V::ENCODED_SIZE) + 1)
}

const fn bitmap_bytes(capacity: usize) -> usize {
    (capacity + 7) / 8
}

/// Bucket page of the extendible hash table.
///
/// Layout: occupied bitmap, readable bitmap, then a fixed-width array
/// of encoded (key, value) pairs. A bucket is full when every slot is
/// occupied and empty when no slot is readable. Removal clears both
/// bits, so a freed slot is immediately reusable and "full" always
/// means "no free slot left".
pub struct HashTableBucketPage<'a, K, V> {
    data: &'a mut [u8],
    _marker: PhantomData<(K, V)>,
}

impl<'a, K: Storable, V: Storable> HashTableBucketPage<'a, K, V> {
    const CAPACITY: usize = bucket_array_size::<K, V>();
    const OCCUPIED_OFFSET: usize = 0;
    const READABLE_OFFSET: usize = bitmap_bytes(Self::CAPACITY);
    const PAIRS_OFFSET: usize = 2 * bitmap_bytes(Self::CAPACITY);
    const PAIR_SIZE: usize = K::ENCODED_SIZE + V::ENCODED_SIZE;

    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        debug_assert!(Self::PAIRS_OFFSET + Self::CAPACITY * Self::PAIR_SIZE <= PAGE_SIZE);
        Self {
            data,
            _marker: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        Self::CAPACITY
    }

    pub fn key_at(&self, idx: usize) -> K {
        let offset = Self::PAIRS_OFFSET + idx * Self::PAIR_SIZE;
        K::decode(&self.data[offset..offset + K::ENCODED_SIZE])
    }

    pub fn value_at(&self, idx: usize) -> V {
        let offset = Self::PAIRS_OFFSET + idx * Self::PAIR_SIZE + K::ENCODED_SIZE;
        V::decode(&self.data[offset..offset + V::ENCODED_SIZE])
    }

    pub fn is_occupied(&self, idx: usize) -> bool {
        self.get_bit(Self::OCCUPIED_OFFSET, idx)
    }

    pub fn is_readable(&self, idx: usize) -> bool {
        self.get_bit(Self::READABLE_OFFSET, idx)
    }

    /// Collects every value stored under a key equal to `key`.
    pub fn get_value<C: KeyComparator<K>>(&self, key: &K, comparator: &C) -> Vec<V> {
        let mut result = Vec::new();
        for idx in 0..Self::CAPACITY {
            if self.is_readable(idx)
                && comparator.compare(&self.key_at(idx), key) == Ordering::Equal
            {
                result.push(self.value_at(idx));
            }
        }
        result
    }

    /// Inserts the pair into the first free slot. Returns false when the
    /// exact (key, value) pair is already present or no slot is free.
    /// Equal keys with distinct values are allowed.
    pub fn insert<C: KeyComparator<K>>(&mut self, key: &K, value: &V, comparator: &C) -> bool {
        let mut free_slot = None;
        for idx in 0..Self::CAPACITY {
            if self.is_readable(idx) {
                if comparator.compare(&self.key_at(idx), key) == Ordering::Equal
                    && self.value_at(idx) == *value
                {
                    return false;
                }
            } else if free_slot.is_none() && !self.is_occupied(idx) {
                free_slot = Some(idx);
            }
        }

        let idx = match free_slot {
            Some(idx) => idx,
            None => return false,
        };

        let offset = Self::PAIRS_OFFSET + idx * Self::PAIR_SIZE;
        key.encode(&mut self.data[offset..offset + K::ENCODED_SIZE]);
        value.encode(
            &mut self.data[offset + K::ENCODED_SIZE..offset + K::ENCODED_SIZE + V::ENCODED_SIZE],
        );
        self.set_bit(Self::OCCUPIED_OFFSET, idx, true);
        self.set_bit(Self::READABLE_OFFSET, idx, true);
        true
    }

    /// Removes the first pair matching the key (by comparator) and the
    /// value (by equality). Returns whether anything was removed.
    pub fn remove<C: KeyComparator<K>>(&mut self, key: &K, value: &V, comparator: &C) -> bool {
        for idx in 0..Self::CAPACITY {
            if self.is_readable(idx)
                && comparator.compare(&self.key_at(idx), key) == Ordering::Equal
                && self.value_at(idx) == *value
            {
                self.remove_at(idx);
                return true;
            }
        }
        false
    }

    /// Frees the slot at `idx`.
    pub fn remove_at(&mut self, idx: usize) {
        self.set_bit(Self::OCCUPIED_OFFSET, idx, false);
        self.set_bit(Self::READABLE_OFFSET, idx, false);
    }

    /// A bucket is full when every slot is occupied.
    pub fn is_full(&self) -> bool {
        (0..Self::CAPACITY).all(|idx| self.is_occupied(idx))
    }

    /// A bucket is empty when no slot is readable.
    pub fn is_empty(&self) -> bool {
        (0..Self::CAPACITY).all(|idx| !self.is_readable(idx))
    }

    pub fn num_readable(&self) -> usize {
        (0..Self::CAPACITY).filter(|&idx| self.is_readable(idx)).count()
    }

    fn get_bit(&self, base: usize, idx: usize) -> bool {
        debug_assert!(idx < Self::CAPACITY);
        self.data[base + idx / 8] & (1 << (idx % 8)) != 0
    }

    fn set_bit(&mut self, base: usize, idx: usize, set: bool) {
        debug_assert!(idx < Self::CAPACITY);
        if set {
            self.data[base + idx / 8] |= 1 << (idx % 8);
        } else {
            self.data[base + idx / 8] &= !(1 << (idx % 8));
        }
    }
}

/// Read-only view over a bucket page.
pub struct HashTableBucketPageRef<'a, K, V> {
    data: &'a [u8],
    _marker: PhantomData<(K, V)>,
}

impl<'a, K: Storable, V: Storable> HashTableBucketPageRef<'a, K, V> {
    const CAPACITY: usize = bucket_array_size::<K, V>();
    const READABLE_OFFSET: usize = bitmap_bytes(Self::CAPACITY);
    const PAIRS_OFFSET: usize = 2 * bitmap_bytes(Self::CAPACITY);
    const PAIR_SIZE: usize = K::ENCODED_SIZE + V::ENCODED_SIZE;

    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self {
            data,
            _marker: PhantomData,
        }
    }

    pub fn key_at(&self, idx: usize) -> K {
        let offset = Self::PAIRS_OFFSET + idx * Self::PAIR_SIZE;
        K::decode(&self.data[offset..offset + K::ENCODED_SIZE])
    }

    pub fn value_at(&self, idx: usize) -> V {
        let offset = Self::PAIRS_OFFSET + idx * Self::PAIR_SIZE + K::ENCODED_SIZE;
        V::decode(&self.data[offset..offset + V::ENCODED_SIZE])
    }

    pub fn is_readable(&self, idx: usize) -> bool {
        debug_assert!(idx < Self::CAPACITY);
        self.data[Self::READABLE_OFFSET + idx / 8] & (1 << (idx % 8)) != 0
    }

    pub fn get_value<C: KeyComparator<K>>(&self, key: &K, comparator: &C) -> Vec<V> {
        let mut result = Vec::new();
        for idx in 0..Self::CAPACITY {
            if self.is_readable(idx)
                && comparator.compare(&self.key_at(idx), key) == Ordering::Equal
            {
                result.push(self.value_at(idx));
            }
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        (0..Self::CAPACITY).all(|idx| !self.is_readable(idx))
    }

    pub fn num_readable(&self) -> usize {
        (0..Self::CAPACITY).filter(|&idx| self.is_readable(idx)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::OrdComparator;

    type Bucket<'a> = HashTableBucketPage<'a, u32, u32>;

    #[test]
    fn test_bucket_page_insert_and_get() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = Bucket::new(&mut data);
        let cmp = OrdComparator;

        assert!(bucket.insert(&1, &100, &cmp));
        assert!(bucket.insert(&2, &200, &cmp));

        assert_eq!(bucket.get_value(&1, &cmp), vec![100]);
        assert_eq!(bucket.get_value(&2, &cmp), vec![200]);
        assert!(bucket.get_value(&3, &cmp).is_empty());
        assert_eq!(bucket.num_readable(), 2);
    }

    #[test]
    fn test_bucket_page_rejects_exact_duplicate() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = Bucket::new(&mut data);
        let cmp = OrdComparator;

        assert!(bucket.insert(&1, &100, &cmp));
        assert!(!bucket.insert(&1, &100, &cmp));
        assert_eq!(bucket.num_readable(), 1);
    }

    #[test]
    fn test_bucket_page_allows_multiple_values_per_key() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = Bucket::new(&mut data);
        let cmp = OrdComparator;

        assert!(bucket.insert(&1, &100, &cmp));
        assert!(bucket.insert(&1, &101, &cmp));

        let mut values = bucket.get_value(&1, &cmp);
        values.sort_unstable();
        assert_eq!(values, vec![100, 101]);
    }

    #[test]
    fn test_bucket_page_remove_frees_slot() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = Bucket::new(&mut data);
        let cmp = OrdComparator;

        assert!(bucket.insert(&1, &100, &cmp));
        assert!(bucket.remove(&1, &100, &cmp));
        assert!(!bucket.remove(&1, &100, &cmp));
        assert!(bucket.is_empty());
        assert!(!bucket.is_full());
        assert!(bucket.get_value(&1, &cmp).is_empty());
    }

    #[test]
    fn test_bucket_page_fills_to_capacity() {
        let mut data = [0u8; PAGE_SIZE];
        let mut bucket = Bucket::new(&mut data);
        let cmp = OrdComparator;
        let capacity = bucket.capacity();

        for i in 0..capacity as u32 {
            assert!(bucket.insert(&i, &i, &cmp));
        }
        assert!(bucket.is_full());
        assert!(!bucket.insert(&u32::MAX, &0, &cmp));

        // Removing one entry makes the bucket insertable again.
        assert!(bucket.remove(&0, &0, &cmp));
        assert!(!bucket.is_full());
        assert!(bucket.insert(&u32::MAX, &0, &cmp));
        assert!(bucket.is_full());
    }

    #[test]
    fn test_bucket_page_ref_view() {
        let mut data = [0u8; PAGE_SIZE];
        let cmp = OrdComparator;
        {
            let mut bucket = Bucket::new(&mut data);
            bucket.insert(&7, &700, &cmp);
        }

        let bucket = HashTableBucketPageRef::<u32, u32>::new(&data);
        assert_eq!(bucket.get_value(&7, &cmp), vec![700]);
        assert_eq!(bucket.num_readable(), 1);
        assert!(!bucket.is_empty());
    }
}
