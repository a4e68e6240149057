use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId, PAGE_SIZE};

/// Metadata of one cache slot. Every transition goes through the
/// owning pool instance's lock, so a single mutex-guarded record is
/// all the synchronization the metadata needs.
#[derive(Clone, Copy)]
struct FrameMeta {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

impl FrameMeta {
    const EMPTY: FrameMeta = FrameMeta {
        page_id: PageId::INVALID,
        pin_count: 0,
        is_dirty: false,
    };
}

/// One fixed-size slot of the buffer pool: the cached page's bytes
/// plus the metadata the pool manages it by.
///
/// The bytes sit behind their own reader-writer lock so that pinned
/// callers can read or mutate a page without going through the pool.
/// The pool never serializes access within a page - coordinating
/// concurrent pinners of the same page is the callers' business.
pub struct Frame {
    /// Index of this frame in the pool
    frame_id: FrameId,
    meta: Mutex<FrameMeta>,
    /// The page bytes
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl Frame {
    pub(crate) fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            meta: Mutex::new(FrameMeta::EMPTY),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// The page held by this frame, or `PageId::INVALID` if empty.
    pub fn page_id(&self) -> PageId {
        self.meta.lock().page_id
    }

    pub fn pin_count(&self) -> u32 {
        self.meta.lock().pin_count
    }

    pub fn is_dirty(&self) -> bool {
        self.meta.lock().is_dirty
    }

    /// Claims an empty frame for `page_id`: pinned once, clean. The
    /// frame must actually be empty; a pool that seizes a loaded frame
    /// has corrupted its own accounting.
    pub(crate) fn seize(&self, page_id: PageId) {
        let mut meta = self.meta.lock();
        assert!(
            !meta.page_id.is_valid() && meta.pin_count == 0,
            "seized frame {} still holds page {}",
            self.frame_id,
            meta.page_id
        );
        *meta = FrameMeta {
            page_id,
            pin_count: 1,
            is_dirty: false,
        };
    }

    /// Takes another pin; returns the new pin count.
    pub(crate) fn pin(&self) -> u32 {
        let mut meta = self.meta.lock();
        meta.pin_count += 1;
        meta.pin_count
    }

    /// Drops one pin; returns the new count, or None when there was no
    /// pin to drop.
    pub(crate) fn unpin(&self) -> Option<u32> {
        let mut meta = self.meta.lock();
        if meta.pin_count == 0 {
            return None;
        }
        meta.pin_count -= 1;
        Some(meta.pin_count)
    }

    pub(crate) fn mark_dirty(&self) {
        self.meta.lock().is_dirty = true;
    }

    pub(crate) fn clear_dirty(&self) {
        self.meta.lock().is_dirty = false;
    }

    /// Empties the frame: no page, no pins, clean. The bytes are left
    /// as they are; whoever seizes the frame next overwrites them.
    pub(crate) fn clear(&self) {
        *self.meta.lock() = FrameMeta::EMPTY;
    }

    /// Shared access to the page bytes. Hold a pin while using this.
    pub fn read_data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Exclusive access to the page bytes. Hold a pin while using this,
    /// and report the mutation through `unpin_page`'s dirty bit.
    pub fn write_data(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }
}
