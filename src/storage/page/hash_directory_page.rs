use crate::common::{PageId, DIRECTORY_ARRAY_SIZE, DIRECTORY_MAX_DEPTH, PAGE_SIZE};

const PAGE_ID_OFFSET: usize = 0;
const LSN_OFFSET: usize = 4;
const GLOBAL_DEPTH_OFFSET: usize = 8;
const LOCAL_DEPTHS_OFFSET: usize = 12;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE;

/// Directory page of the extendible hash table.
///
/// Layout (little-endian):
/// `{ page_id: u32, lsn: u32, global_depth: u32,
///    local_depths: [u8; DIRECTORY_ARRAY_SIZE],
///    bucket_page_ids: [u32; DIRECTORY_ARRAY_SIZE] }`
///
/// Only the first `1 << global_depth` slots are live. A key with hash
/// `h` resolves to slot `h & ((1 << global_depth) - 1)`.
pub struct HashTableDirectoryPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HashTableDirectoryPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, page_id: PageId) {
        self.data.fill(0);
        self.set_page_id(page_id);
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(u32::from_le_bytes(
            self.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4]
                .try_into()
                .unwrap(),
        ))
    }

    pub fn set_page_id(&mut self, page_id: PageId) {
        self.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4]
            .copy_from_slice(&page_id.as_u32().to_le_bytes());
    }

    pub fn lsn(&self) -> u32 {
        u32::from_le_bytes(self.data[LSN_OFFSET..LSN_OFFSET + 4].try_into().unwrap())
    }

    pub fn set_lsn(&mut self, lsn: u32) {
        self.data[LSN_OFFSET..LSN_OFFSET + 4].copy_from_slice(&lsn.to_le_bytes());
    }

    pub fn global_depth(&self) -> u32 {
        u32::from_le_bytes(
            self.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    /// Mask selecting the low `global_depth` bits of a hash.
    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth()) - 1
    }

    pub fn incr_global_depth(&mut self) {
        let depth = self.global_depth();
        assert!(depth < DIRECTORY_MAX_DEPTH, "directory cannot grow further");
        self.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
            .copy_from_slice(&(depth + 1).to_le_bytes());
    }

    /// Number of live directory slots: `1 << global_depth`.
    pub fn size(&self) -> usize {
        1usize << self.global_depth()
    }

    pub fn bucket_page_id(&self, idx: usize) -> PageId {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        let offset = BUCKET_PAGE_IDS_OFFSET + idx * 4;
        PageId::new(u32::from_le_bytes(
            self.data[offset..offset + 4].try_into().unwrap(),
        ))
    }

    pub fn set_bucket_page_id(&mut self, idx: usize, page_id: PageId) {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        let offset = BUCKET_PAGE_IDS_OFFSET + idx * 4;
        self.data[offset..offset + 4].copy_from_slice(&page_id.as_u32().to_le_bytes());
    }

    pub fn local_depth(&self, idx: usize) -> u32 {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        self.data[LOCAL_DEPTHS_OFFSET + idx] as u32
    }

    pub fn set_local_depth(&mut self, idx: usize, depth: u8) {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        debug_assert!((depth as u32) <= DIRECTORY_MAX_DEPTH);
        self.data[LOCAL_DEPTHS_OFFSET + idx] = depth;
    }

    pub fn incr_local_depth(&mut self, idx: usize) {
        let depth = self.local_depth(idx);
        self.set_local_depth(idx, (depth + 1) as u8);
    }

    /// Mask selecting the low `local_depth(idx)` bits of a hash.
    pub fn local_depth_mask(&self, idx: usize) -> u32 {
        (1u32 << self.local_depth(idx)) - 1
    }

    pub fn verify_integrity(&self) {
        HashTableDirectoryPageRef::new(self.data).verify_integrity();
    }
}

/// Read-only view over a directory page.
pub struct HashTableDirectoryPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HashTableDirectoryPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(u32::from_le_bytes(
            self.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4]
                .try_into()
                .unwrap(),
        ))
    }

    pub fn global_depth(&self) -> u32 {
        u32::from_le_bytes(
            self.data[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth()) - 1
    }

    pub fn size(&self) -> usize {
        1usize << self.global_depth()
    }

    pub fn bucket_page_id(&self, idx: usize) -> PageId {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        let offset = BUCKET_PAGE_IDS_OFFSET + idx * 4;
        PageId::new(u32::from_le_bytes(
            self.data[offset..offset + 4].try_into().unwrap(),
        ))
    }

    pub fn local_depth(&self, idx: usize) -> u32 {
        debug_assert!(idx < DIRECTORY_ARRAY_SIZE);
        self.data[LOCAL_DEPTHS_OFFSET + idx] as u32
    }

    /// Panics if the directory violates its structural invariants:
    /// every live slot's local depth must not exceed the global depth,
    /// every bucket must be referenced by exactly `1 << (gd - ld)`
    /// slots, and all slots referencing a bucket must agree on its
    /// local depth.
    pub fn verify_integrity(&self) {
        use std::collections::HashMap;

        let global_depth = self.global_depth();
        let mut ref_counts: HashMap<PageId, u32> = HashMap::new();
        let mut depths: HashMap<PageId, u32> = HashMap::new();

        for idx in 0..self.size() {
            let local_depth = self.local_depth(idx);
            assert!(
                local_depth <= global_depth,
                "slot {} local depth {} exceeds global depth {}",
                idx,
                local_depth,
                global_depth
            );

            let bucket_page_id = self.bucket_page_id(idx);
            *ref_counts.entry(bucket_page_id).or_insert(0) += 1;

            match depths.get(&bucket_page_id) {
                Some(&depth) => assert_eq!(
                    depth, local_depth,
                    "bucket {} referenced with local depths {} and {}",
                    bucket_page_id, depth, local_depth
                ),
                None => {
                    depths.insert(bucket_page_id, local_depth);
                }
            }
        }

        for (bucket_page_id, count) in ref_counts {
            let expected = 1u32 << (global_depth - depths[&bucket_page_id]);
            assert_eq!(
                count, expected,
                "bucket {} referenced by {} slots, expected {}",
                bucket_page_id, count, expected
            );
        }
    }
}
