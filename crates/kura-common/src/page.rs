//! Page identifiers and on-disk page constants for KuraDB.

use serde::{Deserialize, Serialize};

/// Page size in bytes. Every page on disk and every buffer frame is
/// exactly this large.
pub const PAGE_SIZE: usize = 4096;

/// Length of the node-type tag at the start of every page.
pub const NODE_TYPE_LEN: usize = 8;

/// Type tag for a meta page (ASCII, space padded).
pub const META_NODE_TYPE: &[u8; NODE_TYPE_LEN] = b"META    ";

/// Type tag for a leaf page (ASCII, space padded).
pub const LEAF_NODE_TYPE: &[u8; NODE_TYPE_LEN] = b"LEAF    ";

/// Type tag for a branch page (ASCII, space padded).
pub const BRANCH_NODE_TYPE: &[u8; NODE_TYPE_LEN] = b"BRANCH  ";

/// Unique identifier for a page within the heap file.
///
/// Ids are dense and assigned monotonically starting at 0. The sentinel
/// [`PageId::INVALID`] (-1) means "absent"; every valid id is strictly
/// greater than it. Page `i` occupies file bytes `[i * 4096, (i+1) * 4096)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub i64);

impl PageId {
    /// Sentinel id meaning "no page".
    pub const INVALID: PageId = PageId(-1);

    /// Creates a page id from a raw value.
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns true if this id names an actual page.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 > Self::INVALID.0
    }

    /// Byte offset of this page within the heap file.
    #[inline]
    pub fn file_offset(&self) -> u64 {
        self.0 as u64 * PAGE_SIZE as u64
    }

    /// Serializes the id to little-endian bytes (the on-page encoding).
    #[inline]
    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Deserializes an id from little-endian bytes.
    #[inline]
    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Self(i64::from_le_bytes(bytes))
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_constant() {
        assert_eq!(PAGE_SIZE, 4096);
    }

    #[test]
    fn test_node_type_tags() {
        assert_eq!(META_NODE_TYPE.len(), NODE_TYPE_LEN);
        assert_eq!(LEAF_NODE_TYPE.len(), NODE_TYPE_LEN);
        assert_eq!(BRANCH_NODE_TYPE.len(), NODE_TYPE_LEN);

        assert_eq!(META_NODE_TYPE, b"META    ");
        assert_eq!(LEAF_NODE_TYPE, b"LEAF    ");
        assert_eq!(BRANCH_NODE_TYPE, b"BRANCH  ");
    }

    #[test]
    fn test_page_id_validity() {
        assert!(!PageId::INVALID.is_valid());
        assert!(!PageId::new(-2).is_valid());
        assert!(PageId::new(0).is_valid());
        assert!(PageId::new(1).is_valid());
        assert!(PageId::new(i64::MAX).is_valid());
    }

    #[test]
    fn test_page_id_sentinel_value() {
        assert_eq!(PageId::INVALID, PageId(-1));
        assert!(PageId::new(0) > PageId::INVALID);
    }

    #[test]
    fn test_page_id_file_offset() {
        assert_eq!(PageId::new(0).file_offset(), 0);
        assert_eq!(PageId::new(1).file_offset(), 4096);
        assert_eq!(PageId::new(10).file_offset(), 40960);
    }

    #[test]
    fn test_page_id_le_bytes_roundtrip() {
        for raw in [-1i64, 0, 1, 42, i64::MAX] {
            let id = PageId::new(raw);
            assert_eq!(PageId::from_le_bytes(id.to_le_bytes()), id);
        }
    }

    #[test]
    fn test_page_id_sentinel_encoding() {
        // Two's complement -1 serializes as eight 0xFF bytes.
        assert_eq!(PageId::INVALID.to_le_bytes(), [0xFF; 8]);
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(PageId::new(42).to_string(), "page:42");
        assert_eq!(PageId::INVALID.to_string(), "page:-1");
    }

    #[test]
    fn test_page_id_ordering() {
        assert!(PageId::new(1) < PageId::new(2));
        assert!(PageId::INVALID < PageId::new(0));
    }

    #[test]
    fn test_page_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(PageId::new(1));
        set.insert(PageId::new(2));
        set.insert(PageId::new(1)); // Duplicate

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_page_id_serde_roundtrip() {
        let original = PageId::new(500);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: PageId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }
}
