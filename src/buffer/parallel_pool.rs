use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::{LogManager, PageId, Result, StrataError};
use crate::storage::disk::DiskManager;

use super::{BufferPool, BufferPoolInstance, Frame};

/// Shards the page cache across N independent [`BufferPoolInstance`]s.
///
/// Page id `p` is owned by instance `p mod N`, so every id-bearing
/// operation routes to exactly one shard and no cross-shard lock is
/// needed. `new_page` spreads allocation load by probing the shards
/// round-robin, advancing its cursor once per call.
pub struct ParallelBufferPool {
    instances: Vec<BufferPoolInstance>,
    /// Round-robin cursor for `new_page`
    last_index: AtomicUsize,
}

impl ParallelBufferPool {
    pub fn new(
        num_instances: usize,
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        assert!(num_instances > 0, "a pool needs at least one instance");

        let instances = (0..num_instances)
            .map(|i| {
                BufferPoolInstance::with_sharding(
                    pool_size,
                    num_instances as u32,
                    i as u32,
                    Arc::clone(&disk_manager),
                    log_manager.clone(),
                )
            })
            .collect();

        Self {
            instances,
            last_index: AtomicUsize::new(0),
        }
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// The instance owning `page_id`.
    pub fn instance_for(&self, page_id: PageId) -> &BufferPoolInstance {
        let shard = page_id.shard(self.instances.len() as u32);
        &self.instances[shard as usize]
    }

    pub fn instance(&self, index: usize) -> &BufferPoolInstance {
        &self.instances[index]
    }

    /// Allocates a page from the first shard with a frame to spare,
    /// probing round-robin from where the previous call started plus
    /// one. Fails with `BufferPoolFull` only when a full sweep finds
    /// every shard exhausted.
    pub fn new_page(&self) -> Result<(PageId, Arc<Frame>)> {
        let num = self.instances.len();
        let start = self.last_index.fetch_add(1, Ordering::Relaxed) % num;

        for offset in 0..num {
            match self.instances[(start + offset) % num].new_page() {
                Err(StrataError::BufferPoolFull) => continue,
                result => return result,
            }
        }
        Err(StrataError::BufferPoolFull)
    }

    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Frame>> {
        self.instance_for(page_id).fetch_page(page_id)
    }

    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        self.instance_for(page_id).flush_page(page_id)
    }

    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        self.instance_for(page_id).delete_page(page_id)
    }

    pub fn flush_all_pages(&self) -> Result<()> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    /// Total number of frames across all shards.
    pub fn pool_size(&self) -> usize {
        self.instances.len() * self.instances[0].pool_size()
    }

    /// Pin count of a resident page, wherever it lives.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        self.instance_for(page_id).pin_count(page_id)
    }
}

impl BufferPool for ParallelBufferPool {
    fn new_page(&self) -> Result<(PageId, Arc<Frame>)> {
        ParallelBufferPool::new_page(self)
    }

    fn fetch_page(&self, page_id: PageId) -> Result<Arc<Frame>> {
        ParallelBufferPool::fetch_page(self, page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        ParallelBufferPool::unpin_page(self, page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool> {
        ParallelBufferPool::flush_page(self, page_id)
    }

    fn delete_page(&self, page_id: PageId) -> Result<bool> {
        ParallelBufferPool::delete_page(self, page_id)
    }

    fn flush_all_pages(&self) -> Result<()> {
        ParallelBufferPool::flush_all_pages(self)
    }

    fn pool_size(&self) -> usize {
        ParallelBufferPool::pool_size(self)
    }
}
