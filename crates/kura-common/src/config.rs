//! Configuration structures for KuraDB.

use crate::error::{KuraError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of in-memory page frames.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Configuration for opening a store.
///
/// A store is a single heap file on disk plus a bounded in-memory buffer
/// pool. These are the only two knobs the system has.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Filesystem path to the heap file. Created if absent.
    pub path: PathBuf,
    /// Number of page frames held in memory. Must be positive.
    pub pool_size: usize,
}

impl StoreConfig {
    /// Creates a configuration for the given heap file path with the
    /// default pool size.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Sets the number of in-memory page frames.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(KuraError::ConfigError(
                "pool_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
