//! Heap file manager for page-level file I/O.
//!
//! A heap file is a single regular file whose length is always a multiple
//! of the page size. Page `i` occupies bytes `[i * 4096, (i+1) * 4096)`;
//! there is no file header, no checksum, no tail sentinel. Writes are
//! flushed through to the device so that every acknowledged write is
//! durable.

use kura_common::page::{PageId, PAGE_SIZE};
use kura_common::{KuraError, Result};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Manages fixed-size page I/O on a single heap file and hands out dense,
/// monotonically increasing page ids.
#[derive(Debug)]
pub struct HeapFile {
    /// The open file, or None once closed.
    file: Option<File>,
    /// Id the next allocation returns. Equals file length / page size at
    /// open; allocations advance it without touching the file.
    next_id: PageId,
    /// Path the file was opened at.
    path: PathBuf,
}

impl HeapFile {
    /// Opens the heap file at `path`, creating it if absent.
    ///
    /// Fails with [`KuraError::HeapSizeNotAligned`] when the existing file
    /// length is not an exact multiple of the page size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let size = file.metadata()?.len();
        if size % PAGE_SIZE as u64 != 0 {
            return Err(KuraError::HeapSizeNotAligned { size });
        }

        let next_id = PageId::new((size / PAGE_SIZE as u64) as i64);
        tracing::debug!(path = %path.display(), pages = next_id.0, "opened heap file");

        Ok(Self {
            file: Some(file),
            next_id,
            path,
        })
    }

    /// Returns the path the heap file was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the id the next allocation will hand out. Every id below
    /// this is a valid page.
    #[inline]
    pub fn next_id(&self) -> PageId {
        self.next_id
    }

    /// Validates a page id and buffer before any I/O happens.
    fn check_page(page_id: PageId, buf: &[u8]) -> Result<()> {
        if buf.len() != PAGE_SIZE {
            return Err(KuraError::PageSizeMismatch {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        if !page_id.is_valid() {
            return Err(KuraError::InvalidPageId { page_id: page_id.0 });
        }
        Ok(())
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(KuraError::FileClosed)
    }

    /// Reads page `page_id` into `buf`.
    ///
    /// Fails with [`KuraError::ShortRead`] when fewer than a full page's
    /// worth of bytes is available at the page's offset.
    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        Self::check_page(page_id, buf)?;

        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(page_id.file_offset()))?;
        match file.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(KuraError::ShortRead { page_id: page_id.0 })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `buf` to page `page_id` and flushes it through to the
    /// device before returning.
    pub fn write_page(&mut self, page_id: PageId, buf: &[u8]) -> Result<()> {
        Self::check_page(page_id, buf)?;

        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(page_id.file_offset()))?;
        file.write_all(buf)?;
        file.sync_all()?;
        Ok(())
    }

    /// Hands out the next page id.
    ///
    /// No I/O happens here; the physical extent appears the first time a
    /// write targets the new id.
    pub fn allocate_page(&mut self) -> PageId {
        let page_id = self.next_id;
        self.next_id = PageId::new(self.next_id.0 + 1);
        page_id
    }

    /// Forces kernel buffers to durable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file_mut()?.sync_all()?;
        Ok(())
    }

    /// Flushes and releases the file handle. Subsequent operations fail
    /// with [`KuraError::FileClosed`].
    pub fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
            tracing::debug!(path = %self.path.display(), "closed heap file");
        }
        Ok(())
    }
}
