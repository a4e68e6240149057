use std::collections::{HashMap, LinkedList};
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use crate::common::{FrameId, LogManager, PageId, Result, StrataError};
use crate::storage::disk::DiskManager;

use super::{BufferPool, Frame, LruReplacer};

/// State serialized by the instance lock: the page table, the free
/// list, and the page-id allocator cursor.
struct PoolState {
    /// Maps resident page IDs to their frames
    page_table: HashMap<PageId, FrameId>,
    /// Frames that hold no page
    free_list: LinkedList<FrameId>,
    /// Next page ID this instance will hand out
    next_page_id: u32,
}

/// One buffer pool instance: a fixed array of frames caching pages of
/// the database file, with LRU eviction of unpinned pages.
///
/// An instance may stand alone or be one shard of a
/// [`ParallelBufferPool`](super::ParallelBufferPool); shard `i` of `N`
/// owns exactly the page IDs congruent to `i` modulo `N` and allocates
/// `i, i + N, i + 2N, …`. Identifiers are never reused within a run.
///
/// One mutex serializes the public surface, and it is held across the
/// disk manager calls on victim write-back and fault-in.
pub struct BufferPoolInstance {
    /// Number of frames
    pool_size: usize,
    /// Number of instances in the owning pool (1 if standalone)
    num_instances: u32,
    /// Which of those instances this is
    instance_index: u32,
    /// The buffer pool frames
    frames: Vec<Arc<Frame>>,
    /// LRU eviction queue over unpinned frames
    replacer: LruReplacer,
    /// Page table, free list, allocator
    state: Mutex<PoolState>,
    disk_manager: Arc<DiskManager>,
    log_manager: Option<Arc<LogManager>>,
}

impl BufferPoolInstance {
    /// Creates a standalone instance owning the full page-id space.
    pub fn new(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        Self::with_sharding(pool_size, 1, 0, disk_manager, log_manager)
    }

    /// Creates instance `instance_index` of `num_instances`.
    pub fn with_sharding(
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

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = LinkedList::new();
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            frames,
            replacer: LruReplacer::new(pool_size),
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                next_page_id: instance_index,
            }),
            disk_manager,
            log_manager,
        }
    }

    /// Allocates a fresh page and returns it pinned (pin count 1) with
    /// zeroed bytes. Fails with `BufferPoolFull` when every frame is
    /// pinned.
    pub fn new_page(&self) -> Result<(PageId, Arc<Frame>)> {
        let mut state = self.state.lock();

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.index()];

        let page_id = self.allocate_page(&mut state);

        frame.seize(page_id);
        frame.write_data().fill(0);
        self.replacer.pin(frame_id);
        state.page_table.insert(page_id, frame_id);

        Ok((page_id, Arc::clone(frame)))
    }

    /// Pins the page and returns its frame, faulting it in from disk if
    /// it is not resident. A cache hit still takes a pin and removes the
    /// frame from the eviction queue.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Frame>> {
        if !page_id.is_valid() {
            return Err(StrataError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.index()];
            frame.pin();
            self.replacer.pin(frame_id);
            return Ok(Arc::clone(frame));
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.index()];

        if let Err(e) = self
            .disk_manager
            .read_page(page_id, &mut frame.write_data()[..])
        {
            // The frame stayed empty; hand it back rather than leak it.
            state.free_list.push_back(frame_id);
            return Err(e);
        }

        frame.seize(page_id);
        self.replacer.pin(frame_id);
        state.page_table.insert(page_id, frame_id);

        Ok(Arc::clone(frame))
    }

    /// Drops one pin on the page. The caller's dirty bit is ORed in, so
    /// a clean unpin never hides an earlier writer's mutation. When the
    /// pin count reaches zero the frame becomes evictable.
    ///
    /// Returns false if the page is not resident or its pin count was
    /// already zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };
        let frame = &self.frames[frame_id.index()];

        let new_count = match frame.unpin() {
            Some(count) => count,
            None => return false,
        };
        if is_dirty {
            frame.mark_dirty();
        }
        if new_count == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Unconditionally writes a resident page back to disk and clears
    /// its dirty flag. Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        let frame = &self.frames[frame_id.index()];

        self.disk_manager
            .write_page(page_id, &frame.read_data()[..])?;
        frame.clear_dirty();

        Ok(true)
    }

    /// Writes every resident page back to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let state = self.state.lock();

        for (&page_id, &frame_id) in state.page_table.iter() {
            let frame = &self.frames[frame_id.index()];
            self.disk_manager
                .write_page(page_id, &frame.read_data()[..])?;
            frame.clear_dirty();
        }

        Ok(())
    }

    /// Drops the page from the cache and returns its frame to the free
    /// list. Returns `Ok(true)` if the page is gone afterwards - which
    /// includes a page that was never resident - and `Ok(false)` while
    /// someone still holds a pin.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(true),
        };
        let frame = &self.frames[frame_id.index()];

        if frame.pin_count() > 0 {
            return Ok(false);
        }

        self.replacer.pin(frame_id);
        frame.clear();
        state.page_table.remove(&page_id);
        state.free_list.push_back(frame_id);
        // The identifier is not handed out again within this run.

        Ok(true)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    /// Returns the pin count for a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.frames[frame_id.index()].pin_count())
    }

    /// Number of frames holding no page.
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Number of loaded, unpinned frames.
    pub fn evictable_frame_count(&self) -> usize {
        self.replacer.size()
    }

    pub fn log_manager(&self) -> Option<&Arc<LogManager>> {
        self.log_manager.as_ref()
    }

    /// Hands out the next page ID of this instance's arithmetic
    /// progression.
    fn allocate_page(&self, state: &mut PoolState) -> PageId {
        let page_id = state.next_page_id;
        state.next_page_id += self.num_instances;
        debug_assert_eq!(page_id % self.num_instances, self.instance_index);
        PageId::new(page_id)
    }

    /// Finds an empty frame for a new resident: the free list first,
    /// then an LRU victim, whose old page is written back if dirty and
    /// removed from the page table. Fails with `BufferPoolFull` when
    /// neither yields a frame.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = match self.replacer.victim() {
            Some(frame_id) => frame_id,
            None => return Err(StrataError::BufferPoolFull),
        };
        let frame = &self.frames[frame_id.index()];

        // A victim always holds a page; only loaded, unpinned frames
        // are ever queued.
        let old_page_id = frame.page_id();
        debug_assert!(old_page_id.is_valid());

        if frame.is_dirty() {
            trace!("writing back page {} from frame {}", old_page_id, frame_id);
            if let Err(e) = self
                .disk_manager
                .write_page(old_page_id, &frame.read_data()[..])
            {
                // Failed write-back: the page stays cached and goes to
                // the back of the eviction queue.
                self.replacer.unpin(frame_id);
                return Err(e);
            }
        }
        state.page_table.remove(&old_page_id);
        frame.clear();

        Ok(frame_id)
    }
}

impl BufferPool for BufferPoolInstance {
    fn new_page(&self) -> Result<(PageId, Arc<Frame>)> {
        BufferPoolInstance::new_page(self)
    }

    fn fetch_page(&self, page_id: PageId) -> Result<Arc<Frame>> {
        BufferPoolInstance::fetch_page(self, page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        BufferPoolInstance::unpin_page(self, page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool> {
        BufferPoolInstance::flush_page(self, page_id)
    }

    fn delete_page(&self, page_id: PageId) -> Result<bool> {
        BufferPoolInstance::delete_page(self, page_id)
    }

    fn flush_all_pages(&self) -> Result<()> {
        BufferPoolInstance::flush_all_pages(self)
    }

    fn pool_size(&self) -> usize {
        BufferPoolInstance::pool_size(self)
    }
}
