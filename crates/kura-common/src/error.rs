//! Error types for KuraDB.

use thiserror::Error;

/// Result type alias using KuraError.
pub type Result<T> = std::result::Result<T, KuraError>;

/// Errors that can occur in KuraDB operations.
#[derive(Debug, Error)]
pub enum KuraError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Heap file errors
    #[error("Invalid page id: {page_id}")]
    InvalidPageId { page_id: i64 },

    #[error("Page size mismatch: expected {expected}, got {actual}")]
    PageSizeMismatch { expected: usize, actual: usize },

    #[error("Short read on page {page_id}")]
    ShortRead { page_id: i64 },

    #[error("Heap file size {size} is not a multiple of the page size")]
    HeapSizeNotAligned { size: u64 },

    #[error("Heap file is closed")]
    FileClosed,

    // Buffer pool errors
    #[error("All frames pinned, no victim available")]
    AllFramesPinned,

    // Slotted page errors
    #[error("Page full: need {needed} bytes, {free} free")]
    PageFull { needed: usize, free: usize },

    #[error("Pair too large: {size} bytes (max {max})")]
    PairTooLarge { size: usize, max: usize },

    #[error("Slot index {index} out of range (slot count {count})")]
    SlotOutOfRange { index: u16, count: u16 },

    // Node errors
    #[error("Wrong node type: expected {expected:?}, got {actual:?}")]
    WrongNodeType {
        expected: &'static str,
        actual: String,
    },

    #[error("Unrecognized node type tag: {tag:?}")]
    UnknownNodeType { tag: String },

    // B+ tree errors
    #[error("Duplicate key")]
    DuplicateKey,

    #[error("Key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
