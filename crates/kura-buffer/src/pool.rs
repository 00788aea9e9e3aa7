//! Fixed-size ring of page frames with clock-sweep victim selection.

use crate::frame::Frame;
use kura_common::{KuraError, Result};
use parking_lot::Mutex;

/// A fixed vector of page frames and a rotating sweep cursor.
///
/// The pool itself performs no I/O and never mutates pin counts; it only
/// stores frames and picks victims. The pool manager layered above is the
/// sole mutator of pins and the page table.
#[derive(Debug)]
pub struct BufferPool {
    /// Frames, created once at construction and reused forever.
    frames: Vec<Frame>,
    /// Index of the next frame the sweep inspects.
    sweep_cursor: Mutex<usize>,
}

impl BufferPool {
    /// Creates a pool with the given number of frames, all initialized
    /// empty and evictable.
    pub fn new(num_frames: usize) -> Self {
        let frames = (0..num_frames).map(|_| Frame::new()).collect();
        Self {
            frames,
            sweep_cursor: Mutex::new(0),
        }
    }

    /// Returns the number of frames in the pool.
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Returns the frame at the given index.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn frame(&self, index: usize) -> &Frame {
        &self.frames[index]
    }

    /// Selects a victim frame for reuse.
    ///
    /// Starting at the sweep cursor, inspects frames in order and returns
    /// the index of the first one with no holders (pin count -1); the
    /// cursor advances past it. Inspecting every frame without finding an
    /// unpinned one fails with [`KuraError::AllFramesPinned`].
    ///
    /// The sweep performs no I/O and does not touch pin counts.
    pub fn clock_sweep(&self) -> Result<usize> {
        let num_frames = self.frames.len();
        if num_frames == 0 {
            return Err(KuraError::AllFramesPinned);
        }

        let mut cursor = self.sweep_cursor.lock();
        for _ in 0..num_frames {
            let index = *cursor;
            *cursor = (index + 1) % num_frames;
            if self.frames[index].is_evictable() {
                return Ok(index);
            }
        }

        Err(KuraError::AllFramesPinned)
    }
}
