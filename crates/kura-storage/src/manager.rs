//! Pool manager: the page table plus fetch/create/sync/close on top of a
//! heap file and a buffer pool.
//!
//! The manager is the only legitimate mutator of pin counts and the page
//! table. Callers acquire a frame via [`PoolManager::fetch`], read or
//! write through it, and hand it back with [`PoolManager::release`];
//! balanced acquire/release leaves the frame evictable again.

use crate::heap::HeapFile;
use kura_buffer::{BufferPool, Frame};
use kura_common::page::PageId;
use kura_common::{KuraError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Coordinates the heap file and the in-memory frame pool.
#[derive(Debug)]
pub struct PoolManager {
    /// Backing heap file; owned exclusively by this manager.
    heap: Mutex<HeapFile>,
    /// Frame pool. Frames are created once and only ever borrowed out.
    pool: BufferPool,
    /// Maps resident page ids to their frame index.
    page_table: Mutex<HashMap<PageId, usize>>,
}

impl PoolManager {
    /// Creates a manager over an open heap file and a frame pool.
    pub fn new(heap: HeapFile, pool: BufferPool) -> Self {
        Self {
            heap: Mutex::new(heap),
            pool,
            page_table: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool.num_frames()
    }

    /// Returns the frame index caching `page_id`, if it is resident.
    pub fn cached_frame_index(&self, page_id: PageId) -> Option<usize> {
        self.page_table.lock().get(&page_id).copied()
    }

    /// Returns the ids of all resident pages, in no particular order.
    pub fn cached_page_ids(&self) -> Vec<PageId> {
        self.page_table.lock().keys().copied().collect()
    }

    /// Reclaims a frame for reuse.
    ///
    /// Runs the clock sweep, unmaps whatever page the victim held, and
    /// writes the old contents back if dirty. A failed write-back clears
    /// the dirty flag before surfacing the error so the frame cannot wedge
    /// the pool in a retry loop.
    fn evict(&self) -> Result<usize> {
        let index = self.pool.clock_sweep()?;
        let frame = self.pool.frame(index);

        let old_id = frame.page_id();
        if old_id.is_valid() {
            self.page_table.lock().remove(&old_id);
        }

        if old_id.is_valid() && frame.is_dirty() {
            let data = frame.read_data();
            let written = self.heap.lock().write_page(old_id, &data[..]);
            drop(data);
            frame.set_dirty(false);
            if let Err(e) = written {
                return Err(e);
            }
            tracing::trace!(page = old_id.0, frame = index, "wrote back dirty page before reuse");
        }

        Ok(index)
    }

    /// Fetches the page with `page_id`, pinning its frame.
    ///
    /// A cached page is returned directly; otherwise a victim frame is
    /// reclaimed and the page is read from the heap file. The caller must
    /// pass the frame to [`PoolManager::release`] when done.
    pub fn fetch(&self, page_id: PageId) -> Result<&Frame> {
        if !page_id.is_valid() || page_id >= self.heap.lock().next_id() {
            return Err(KuraError::InvalidPageId { page_id: page_id.0 });
        }

        if let Some(&index) = self.page_table.lock().get(&page_id) {
            let frame = self.pool.frame(index);
            frame.pin();
            return Ok(frame);
        }

        let index = self.evict()?;
        let frame = self.pool.frame(index);
        {
            let mut data = frame.write_data();
            self.heap.lock().read_page(page_id, &mut data[..])?;
        }
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        self.page_table.lock().insert(page_id, index);
        frame.pin();

        Ok(frame)
    }

    /// Allocates a new page and stages it, unpinned, in a reclaimed frame.
    ///
    /// The frame starts zeroed and dirty: the new page is logically
    /// written even though its content is all zeros, which is what keeps
    /// it alive across an immediate eviction. Callers that want to
    /// initialize the contents must `fetch` the returned id first.
    pub fn create(&self) -> Result<PageId> {
        let index = self.evict()?;
        let page_id = self.heap.lock().allocate_page();

        let frame = self.pool.frame(index);
        frame.reset();
        frame.set_page_id(page_id);
        frame.set_dirty(true);
        self.page_table.lock().insert(page_id, index);

        tracing::trace!(page = page_id.0, frame = index, "created page");
        Ok(page_id)
    }

    /// Hands a fetched frame back, decrementing its pin count.
    ///
    /// Release exactly once per fetch; the manager does not police
    /// imbalance.
    pub fn release(&self, frame: &Frame) {
        frame.unpin();
    }

    /// Writes every dirty resident page back to the heap file, clears the
    /// dirty flags, and syncs the file.
    pub fn sync(&self) -> Result<()> {
        let table = self.page_table.lock();
        let mut heap = self.heap.lock();

        for (&page_id, &index) in table.iter() {
            let frame = self.pool.frame(index);
            if frame.is_dirty() {
                let data = frame.read_data();
                heap.write_page(page_id, &data[..])?;
                drop(data);
                frame.set_dirty(false);
            }
        }

        tracing::trace!("synced pool to heap file");
        heap.sync()
    }

    /// Syncs, then closes the heap file.
    pub fn close(&self) -> Result<()> {
        self.sync()?;
        self.heap.lock().close()
    }
}
