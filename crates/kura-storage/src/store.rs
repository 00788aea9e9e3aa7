//! Store facade: a heap file on a path plus a configured buffer pool.

use crate::btree::BTree;
use crate::heap::HeapFile;
use crate::manager::PoolManager;
use kura_buffer::BufferPool;
use kura_common::config::StoreConfig;
use kura_common::page::PageId;
use kura_common::Result;
use std::sync::Arc;

/// An opened store: the embeddable entry point of the library.
///
/// A store is a single heap file with a bounded page cache in front of it.
/// Trees are created inside it and share its pool manager.
#[derive(Debug)]
pub struct Store {
    pool: Arc<PoolManager>,
}

impl Store {
    /// Opens (creating if absent) the heap file named by the
    /// configuration and sets up the buffer pool in front of it.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let heap = HeapFile::open(&config.path)?;
        let pool = BufferPool::new(config.pool_size);
        tracing::debug!(
            path = %config.path.display(),
            pool_size = config.pool_size,
            "opened store"
        );

        Ok(Self {
            pool: Arc::new(PoolManager::new(heap, pool)),
        })
    }

    /// Creates a new B+ tree inside the store. The first tree of a fresh
    /// store claims pages 0 (meta) and 1 (root).
    pub fn create_tree(&self) -> Result<BTree> {
        BTree::create(Arc::clone(&self.pool))
    }

    /// Opens a tree previously created in this store's heap file.
    pub fn open_tree(&self, meta_id: PageId) -> Result<BTree> {
        BTree::open(Arc::clone(&self.pool), meta_id)
    }

    /// Returns the store's pool manager.
    pub fn pool(&self) -> &Arc<PoolManager> {
        &self.pool
    }

    /// Writes all dirty pages back and syncs the heap file.
    pub fn sync(&self) -> Result<()> {
        self.pool.sync()
    }

    /// Syncs and closes the underlying heap file.
    pub fn close(self) -> Result<()> {
        self.pool.close()
    }
}
