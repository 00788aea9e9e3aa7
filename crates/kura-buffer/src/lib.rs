//! Buffer pool management for KuraDB.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable frame count
//! - Clock-sweep victim selection for eviction
//! - Pin counting for reference tracking
//! - Dirty page tracking for write-back

mod frame;
mod pool;

pub use frame::Frame;
pub use pool::BufferPool;
