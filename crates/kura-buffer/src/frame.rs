//! Buffer frame management.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use kura_common::page::{PageId, PAGE_SIZE};

/// Pin count of a frame nobody holds. A frame at this count is a victim
/// candidate for the clock sweep; every fetch increments and every release
/// decrements, so balanced callers return the frame exactly here.
const EVICTABLE: i64 = -1;

/// A frame in the buffer pool holding a single page.
///
/// Each frame owns:
/// - The page data (PAGE_SIZE bytes)
/// - Metadata for buffer management (page id, pin count, dirty flag)
pub struct Frame {
    /// The page currently stored in this frame (raw id, -1 = none).
    page_id: AtomicI64,
    /// Page data buffer.
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
    /// Signed reference count: -1 = evictable, 0 = one holder, and so on.
    pin_count: AtomicI64,
    /// Whether the buffer differs from the on-disk page.
    dirty: AtomicBool,
}

impl Frame {
    /// Creates a new empty frame: sentinel id, zeroed buffer, evictable,
    /// clean.
    pub fn new() -> Self {
        Self {
            page_id: AtomicI64::new(PageId::INVALID.0),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
            pin_count: AtomicI64::new(EVICTABLE),
            dirty: AtomicBool::new(false),
        }
    }

    /// Returns the page id currently stored in this frame.
    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId(self.page_id.load(Ordering::Acquire))
    }

    /// Sets the page id for this frame.
    #[inline]
    pub fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.0, Ordering::Release);
    }

    /// Returns the current pin count.
    #[inline]
    pub fn pin_count(&self) -> i64 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count. Returns the new count.
    #[inline]
    pub fn pin(&self) -> i64 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count. Returns the new count.
    #[inline]
    pub fn unpin(&self) -> i64 {
        self.pin_count.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Returns true if no caller holds this frame.
    #[inline]
    pub fn is_evictable(&self) -> bool {
        self.pin_count.load(Ordering::Acquire) == EVICTABLE
    }

    /// Returns true if this frame is dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Sets or clears the dirty flag.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Reads the page data.
    #[inline]
    pub fn read_data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Writes to the page data. Callers that mutate through this guard
    /// must also set the dirty flag.
    #[inline]
    pub fn write_data(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Resets the frame to its initial state: sentinel id, zeroed buffer,
    /// evictable, clean.
    pub fn reset(&self) {
        self.page_id.store(PageId::INVALID.0, Ordering::Release);
        self.pin_count.store(EVICTABLE, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
        let mut data = self.data.write();
        data.fill(0);
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("page_id", &self.page_id())
            .field("pin_count", &self.pin_count())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
