//! Storage engine for KuraDB.
//!
//! This crate provides:
//! - Heap file manager for fixed-size page I/O on a single file
//! - Pool manager coordinating the heap file with the buffer pool
//! - Slotted-page layout for variable-length key/value pairs
//! - Typed node views (meta / leaf / branch) over pinned frames
//! - B+ tree index supporting insert and search
//! - Store facade for opening and closing a database on a path

mod btree;
mod heap;
mod manager;
mod node;
mod slotted;
mod store;

pub use btree::BTree;
pub use heap::HeapFile;
pub use manager::PoolManager;
pub use node::{BranchNode, LeafNode, MetaNode, NodeKind};
pub use slotted::Pair;
pub use store::Store;
