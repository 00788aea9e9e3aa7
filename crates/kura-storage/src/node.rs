//! Typed node views over pinned page frames.
//!
//! A view borrows a frame for as long as the caller's pin is held and
//! interprets the buffer as one node kind. Views store no offsets into
//! the buffer; every accessor computes its position per call, and every
//! mutator marks the frame dirty through the borrowed frame itself.
//!
//! Page layouts (all integers little-endian):
//!
//! ```text
//! Meta    tag[0..8]  root_id[8..16]
//! Leaf    tag[0..8]  prev_id[8..16]  next_id[16..24]  slots[24..4096]
//! Branch  tag[0..8]  right_id[8..16]                  slots[16..4096]
//! ```
//!
//! A slotted region starts with slot_count (2 bytes) and free_offset
//! (2 bytes); see [`crate::slotted`].

use crate::slotted::{record_size, Pair, SlotLayout};
use bytes::Bytes;
use kura_buffer::Frame;
use kura_common::page::{
    PageId, BRANCH_NODE_TYPE, LEAF_NODE_TYPE, META_NODE_TYPE, NODE_TYPE_LEN, PAGE_SIZE,
};
use kura_common::{KuraError, Result};

/// The three node kinds a page can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Meta,
    Leaf,
    Branch,
}

/// Reads and classifies the type tag of a pinned page.
pub fn kind_of(frame: &Frame) -> Result<NodeKind> {
    let data = frame.read_data();
    let tag: [u8; NODE_TYPE_LEN] = data[..NODE_TYPE_LEN].try_into().unwrap();
    drop(data);

    match &tag {
        t if t == META_NODE_TYPE => Ok(NodeKind::Meta),
        t if t == LEAF_NODE_TYPE => Ok(NodeKind::Leaf),
        t if t == BRANCH_NODE_TYPE => Ok(NodeKind::Branch),
        t => Err(KuraError::UnknownNodeType {
            tag: String::from_utf8_lossy(t).into_owned(),
        }),
    }
}

fn expect_kind(frame: &Frame, want: NodeKind, tag: &'static [u8; NODE_TYPE_LEN]) -> Result<()> {
    let kind = kind_of(frame)?;
    if kind != want {
        let data = frame.read_data();
        let actual = String::from_utf8_lossy(&data[..NODE_TYPE_LEN]).into_owned();
        return Err(KuraError::WrongNodeType {
            expected: std::str::from_utf8(tag).unwrap(),
            actual,
        });
    }
    Ok(())
}

fn write_tag(frame: &Frame, tag: &[u8; NODE_TYPE_LEN]) {
    let mut data = frame.write_data();
    data[..NODE_TYPE_LEN].copy_from_slice(tag);
    drop(data);
    frame.set_dirty(true);
}

fn read_id(page: &[u8; PAGE_SIZE], at: usize) -> PageId {
    PageId::from_le_bytes(page[at..at + 8].try_into().unwrap())
}

fn write_id(page: &mut [u8; PAGE_SIZE], at: usize, id: PageId) {
    page[at..at + 8].copy_from_slice(&id.to_le_bytes());
}

// =============================================================================
// Meta node
// =============================================================================

/// View of a meta page: holds the root page id of one tree.
#[derive(Debug)]
pub struct MetaNode<'a> {
    frame: &'a Frame,
}

impl<'a> MetaNode<'a> {
    const ROOT_ID_AT: usize = 8;

    /// Stamps a fresh page as a meta node with no root.
    pub fn format(frame: &Frame) {
        write_tag(frame, META_NODE_TYPE);
        let mut data = frame.write_data();
        write_id(&mut data, Self::ROOT_ID_AT, PageId::INVALID);
        drop(data);
        frame.set_dirty(true);
    }

    /// Attaches a meta view; fails unless the page carries the meta tag.
    pub fn new(frame: &'a Frame) -> Result<Self> {
        expect_kind(frame, NodeKind::Meta, META_NODE_TYPE)?;
        Ok(Self { frame })
    }

    /// Returns the root page id.
    pub fn root_id(&self) -> PageId {
        read_id(&self.frame.read_data(), Self::ROOT_ID_AT)
    }

    /// Points the tree at a new root. Rejects the sentinel id.
    pub fn set_root_id(&self, root_id: PageId) -> Result<()> {
        if !root_id.is_valid() {
            return Err(KuraError::InvalidPageId { page_id: root_id.0 });
        }
        let mut data = self.frame.write_data();
        write_id(&mut data, Self::ROOT_ID_AT, root_id);
        drop(data);
        self.frame.set_dirty(true);
        Ok(())
    }
}

// =============================================================================
// Leaf node
// =============================================================================

/// View of a leaf page: sibling links plus a sorted slotted region of
/// key/value pairs.
pub struct LeafNode<'a> {
    frame: &'a Frame,
}

impl<'a> LeafNode<'a> {
    const PREV_ID_AT: usize = 8;
    const NEXT_ID_AT: usize = 16;
    const LAYOUT: SlotLayout = SlotLayout::new(24);

    /// Largest pair a leaf can ever hold (half the slot space of an empty
    /// leaf).
    pub const MAX_PAIR_SIZE: usize = Self::LAYOUT.max_pair_size_empty();

    /// Slot-area bytes of an empty leaf.
    pub(crate) const CAPACITY: usize = Self::LAYOUT.capacity();

    /// Stamps a fresh page as an empty leaf with no siblings.
    pub fn format(frame: &'a Frame) {
        write_tag(frame, LEAF_NODE_TYPE);
        let view = Self { frame };
        view.reset();
    }

    /// Attaches a leaf view; fails unless the page carries the leaf tag.
    pub fn new(frame: &'a Frame) -> Result<Self> {
        expect_kind(frame, NodeKind::Leaf, LEAF_NODE_TYPE)?;
        Ok(Self { frame })
    }

    /// Clears the leaf: no siblings, empty slot region.
    pub fn reset(&self) {
        let mut data = self.frame.write_data();
        write_id(&mut data, Self::PREV_ID_AT, PageId::INVALID);
        write_id(&mut data, Self::NEXT_ID_AT, PageId::INVALID);
        Self::LAYOUT.reset(&mut data);
        drop(data);
        self.frame.set_dirty(true);
    }

    pub fn prev_id(&self) -> PageId {
        read_id(&self.frame.read_data(), Self::PREV_ID_AT)
    }

    pub fn next_id(&self) -> PageId {
        read_id(&self.frame.read_data(), Self::NEXT_ID_AT)
    }

    pub fn set_prev_id(&self, id: PageId) {
        let mut data = self.frame.write_data();
        write_id(&mut data, Self::PREV_ID_AT, id);
        drop(data);
        self.frame.set_dirty(true);
    }

    pub fn set_next_id(&self, id: PageId) {
        let mut data = self.frame.write_data();
        write_id(&mut data, Self::NEXT_ID_AT, id);
        drop(data);
        self.frame.set_dirty(true);
    }

    pub fn slot_count(&self) -> u16 {
        Self::LAYOUT.slot_count(&self.frame.read_data())
    }

    /// Free bytes in the slot region.
    pub fn free(&self) -> usize {
        Self::LAYOUT.free(&self.frame.read_data())
    }

    /// Current per-pair ceiling for this leaf.
    pub fn max_pair_size(&self) -> usize {
        Self::LAYOUT.max_pair_size(&self.frame.read_data())
    }

    /// Copies the pair at `index` out of the page.
    pub fn pair(&self, index: u16) -> Pair {
        Self::LAYOUT.pair(&self.frame.read_data(), index)
    }

    /// Copies the key at `index` out of the page.
    pub fn key(&self, index: u16) -> Bytes {
        Bytes::copy_from_slice(Self::LAYOUT.key_slice(&self.frame.read_data(), index))
    }

    /// Lower-bound search for `key`; `(index, found)`.
    pub fn search(&self, key: &[u8]) -> (u16, bool) {
        Self::LAYOUT.search(&self.frame.read_data(), key)
    }

    /// Inserts `(key, value)` at slot `index`.
    ///
    /// Enforces the per-pair ceiling (half the current free bytes) so a
    /// second pair of the same size always stays insertable.
    pub fn insert(&self, index: u16, key: &[u8], value: &[u8]) -> Result<()> {
        let mut data = self.frame.write_data();
        let size = record_size(key, value);
        let max = Self::LAYOUT.max_pair_size(&data);
        if size > max {
            return Err(KuraError::PairTooLarge { size, max });
        }
        Self::LAYOUT.insert(&mut data, index, key, value)?;
        drop(data);
        self.frame.set_dirty(true);
        Ok(())
    }

    /// Inserts without the per-pair ceiling, checking free space only.
    ///
    /// Split paths refill pages with records they already held (or a pair
    /// that passed admission at the tree boundary); re-applying the
    /// ceiling there would reject records mid-split.
    pub(crate) fn insert_unbounded(&self, index: u16, key: &[u8], value: &[u8]) -> Result<()> {
        let mut data = self.frame.write_data();
        Self::LAYOUT.insert(&mut data, index, key, value)?;
        drop(data);
        self.frame.set_dirty(true);
        Ok(())
    }

    /// Removes slot `index`.
    pub fn delete(&self, index: u16) -> Result<()> {
        let mut data = self.frame.write_data();
        Self::LAYOUT.delete(&mut data, index)?;
        drop(data);
        self.frame.set_dirty(true);
        Ok(())
    }
}

// =============================================================================
// Branch node
// =============================================================================

/// View of a branch page: separator slots plus the rightmost child in the
/// header.
///
/// Slot `j` holds `(separator, child)` where every key in the child's
/// subtree is strictly less than the separator; keys at or above the last
/// separator live under `right_id`.
#[derive(Debug)]
pub struct BranchNode<'a> {
    frame: &'a Frame,
}

impl<'a> BranchNode<'a> {
    const RIGHT_ID_AT: usize = 8;
    const LAYOUT: SlotLayout = SlotLayout::new(16);

    /// Largest separator/child pair a branch can ever hold (half the slot
    /// space of an empty branch).
    pub const MAX_PAIR_SIZE: usize = Self::LAYOUT.max_pair_size_empty();

    /// Slot-area bytes of an empty branch.
    pub(crate) const CAPACITY: usize = Self::LAYOUT.capacity();

    /// Stamps a fresh page as an empty branch with no rightmost child.
    pub fn format(frame: &'a Frame) {
        write_tag(frame, BRANCH_NODE_TYPE);
        let view = Self { frame };
        view.reset();
    }

    /// Attaches a branch view; fails unless the page carries the branch
    /// tag.
    pub fn new(frame: &'a Frame) -> Result<Self> {
        expect_kind(frame, NodeKind::Branch, BRANCH_NODE_TYPE)?;
        Ok(Self { frame })
    }

    /// Clears the branch: no rightmost child, empty slot region.
    pub fn reset(&self) {
        let mut data = self.frame.write_data();
        write_id(&mut data, Self::RIGHT_ID_AT, PageId::INVALID);
        Self::LAYOUT.reset(&mut data);
        drop(data);
        self.frame.set_dirty(true);
    }

    pub fn right_id(&self) -> PageId {
        read_id(&self.frame.read_data(), Self::RIGHT_ID_AT)
    }

    pub fn set_right_id(&self, id: PageId) {
        let mut data = self.frame.write_data();
        write_id(&mut data, Self::RIGHT_ID_AT, id);
        drop(data);
        self.frame.set_dirty(true);
    }

    pub fn slot_count(&self) -> u16 {
        Self::LAYOUT.slot_count(&self.frame.read_data())
    }

    /// Free bytes in the slot region.
    pub fn free(&self) -> usize {
        Self::LAYOUT.free(&self.frame.read_data())
    }

    /// Copies the separator key at `index` out of the page.
    pub fn key(&self, index: u16) -> Bytes {
        Bytes::copy_from_slice(Self::LAYOUT.key_slice(&self.frame.read_data(), index))
    }

    /// Child page id stored at slot `index`.
    pub fn child(&self, index: u16) -> PageId {
        let data = self.frame.read_data();
        let value = Self::LAYOUT.value_slice(&data, index);
        PageId::from_le_bytes(value.try_into().expect("branch slot value is a page id"))
    }

    /// Lower-bound search for `key` over the separators; `(index, found)`.
    pub fn search(&self, key: &[u8]) -> (u16, bool) {
        Self::LAYOUT.search(&self.frame.read_data(), key)
    }

    /// Picks the child to descend into for `key`.
    ///
    /// Returns `(slot_index, child_id)` where `slot_index` is the first
    /// slot whose separator is strictly greater than `key`; when `key` is
    /// at or above every separator the index equals the slot count and
    /// the child is `right_id`.
    pub fn find_child(&self, key: &[u8]) -> (u16, PageId) {
        let (index, found) = self.search(key);
        let slot = if found { index + 1 } else { index };
        let child = if slot < self.slot_count() {
            self.child(slot)
        } else {
            self.right_id()
        };
        (slot, child)
    }

    /// Inserts `(separator, child)` at slot `index`.
    pub fn insert(&self, index: u16, separator: &[u8], child: PageId) -> Result<()> {
        let mut data = self.frame.write_data();
        let value = child.to_le_bytes();
        let size = record_size(separator, &value);
        let max = Self::LAYOUT.max_pair_size(&data);
        if size > max {
            return Err(KuraError::PairTooLarge { size, max });
        }
        Self::LAYOUT.insert(&mut data, index, separator, &value)?;
        drop(data);
        self.frame.set_dirty(true);
        Ok(())
    }

    /// Inserts without the per-pair ceiling; see
    /// [`LeafNode::insert_unbounded`].
    pub(crate) fn insert_unbounded(&self, index: u16, separator: &[u8], child: PageId) -> Result<()> {
        let mut data = self.frame.write_data();
        Self::LAYOUT.insert(&mut data, index, separator, &child.to_le_bytes())?;
        drop(data);
        self.frame.set_dirty(true);
        Ok(())
    }

    /// Re-points the child of slot `index` in place, leaving its
    /// separator untouched.
    pub fn set_child(&self, index: u16, child: PageId) -> Result<()> {
        let mut data = self.frame.write_data();
        Self::LAYOUT.overwrite_value(&mut data, index, &child.to_le_bytes())?;
        drop(data);
        self.frame.set_dirty(true);
        Ok(())
    }

    /// Removes slot `index`.
    pub fn delete(&self, index: u16) -> Result<()> {
        let mut data = self.frame.write_data();
        Self::LAYOUT.delete(&mut data, index)?;
        drop(data);
        self.frame.set_dirty(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_of_fresh_page_is_unknown() {
        let frame = Frame::new();
        let err = kind_of(&frame).unwrap_err();
        assert!(matches!(err, KuraError::UnknownNodeType { .. }));
    }

    #[test]
    fn test_kind_of_recognizes_tags() {
        let frame = Frame::new();

        MetaNode::format(&frame);
        assert_eq!(kind_of(&frame).unwrap(), NodeKind::Meta);

        LeafNode::format(&frame);
        assert_eq!(kind_of(&frame).unwrap(), NodeKind::Leaf);

        BranchNode::format(&frame);
        assert_eq!(kind_of(&frame).unwrap(), NodeKind::Branch);
    }

    #[test]
    fn test_view_construction_checks_tag() {
        let frame = Frame::new();
        LeafNode::format(&frame);

        assert!(LeafNode::new(&frame).is_ok());
        assert!(matches!(
            MetaNode::new(&frame).unwrap_err(),
            KuraError::WrongNodeType { expected: "META    ", .. }
        ));
        assert!(matches!(
            BranchNode::new(&frame).unwrap_err(),
            KuraError::WrongNodeType { .. }
        ));
    }

    #[test]
    fn test_format_marks_dirty() {
        let frame = Frame::new();
        assert!(!frame.is_dirty());
        LeafNode::format(&frame);
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_meta_root_id() {
        let frame = Frame::new();
        MetaNode::format(&frame);
        let meta = MetaNode::new(&frame).unwrap();

        assert_eq!(meta.root_id(), PageId::INVALID);

        meta.set_root_id(PageId::new(7)).unwrap();
        assert_eq!(meta.root_id(), PageId::new(7));
    }

    #[test]
    fn test_meta_rejects_invalid_root() {
        let frame = Frame::new();
        MetaNode::format(&frame);
        let meta = MetaNode::new(&frame).unwrap();

        assert!(matches!(
            meta.set_root_id(PageId::INVALID).unwrap_err(),
            KuraError::InvalidPageId { page_id: -1 }
        ));
    }

    #[test]
    fn test_fresh_leaf_geometry() {
        let frame = Frame::new();
        LeafNode::format(&frame);
        let leaf = LeafNode::new(&frame).unwrap();

        assert_eq!(leaf.prev_id(), PageId::INVALID);
        assert_eq!(leaf.next_id(), PageId::INVALID);
        assert_eq!(leaf.slot_count(), 0);
        assert_eq!(leaf.free(), 4068);
        assert_eq!(LeafNode::MAX_PAIR_SIZE, 2034);
    }

    #[test]
    fn test_leaf_sibling_links() {
        let frame = Frame::new();
        LeafNode::format(&frame);
        let leaf = LeafNode::new(&frame).unwrap();

        leaf.set_prev_id(PageId::new(3));
        leaf.set_next_id(PageId::new(5));
        assert_eq!(leaf.prev_id(), PageId::new(3));
        assert_eq!(leaf.next_id(), PageId::new(5));

        leaf.reset();
        assert_eq!(leaf.prev_id(), PageId::INVALID);
        assert_eq!(leaf.next_id(), PageId::INVALID);
    }

    #[test]
    fn test_leaf_insert_search_roundtrip() {
        let frame = Frame::new();
        LeafNode::format(&frame);
        let leaf = LeafNode::new(&frame).unwrap();

        leaf.insert(0, b"banana", b"yellow").unwrap();
        leaf.insert(0, b"apple", b"red").unwrap();
        leaf.insert(2, b"cherry", b"dark").unwrap();

        assert_eq!(leaf.search(b"apple"), (0, true));
        assert_eq!(leaf.search(b"banana"), (1, true));
        assert_eq!(leaf.search(b"cherry"), (2, true));
        assert_eq!(leaf.search(b"blueberry"), (2, false));

        let pair = leaf.pair(1);
        assert_eq!(&pair.key[..], b"banana");
        assert_eq!(&pair.value[..], b"yellow");
    }

    #[test]
    fn test_leaf_insert_rejects_oversized_pair() {
        let frame = Frame::new();
        LeafNode::format(&frame);
        let leaf = LeafNode::new(&frame).unwrap();

        let value = vec![0u8; 2040];
        let err = leaf.insert(0, b"k", &value).unwrap_err();
        assert!(matches!(err, KuraError::PairTooLarge { max: 2034, .. }));
    }

    #[test]
    fn test_leaf_ceiling_shrinks_as_page_fills() {
        let frame = Frame::new();
        LeafNode::format(&frame);
        let leaf = LeafNode::new(&frame).unwrap();

        let value = vec![0u8; 1000];
        leaf.insert(0, &[0], &value).unwrap();
        leaf.insert(1, &[1], &value).unwrap();
        leaf.insert(2, &[2], &value).unwrap();

        // A fourth 1003-byte pair exceeds half the remaining free bytes.
        let err = leaf.insert(3, &[3], &value).unwrap_err();
        assert!(matches!(err, KuraError::PairTooLarge { .. }));
    }

    #[test]
    fn test_leaf_mutations_set_dirty() {
        let frame = Frame::new();
        LeafNode::format(&frame);
        frame.set_dirty(false);

        let leaf = LeafNode::new(&frame).unwrap();
        leaf.insert(0, b"k", b"v").unwrap();
        assert!(frame.is_dirty());

        frame.set_dirty(false);
        leaf.set_next_id(PageId::new(1));
        assert!(frame.is_dirty());

        frame.set_dirty(false);
        leaf.delete(0).unwrap();
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_fresh_branch_geometry() {
        let frame = Frame::new();
        BranchNode::format(&frame);
        let branch = BranchNode::new(&frame).unwrap();

        assert_eq!(branch.right_id(), PageId::INVALID);
        assert_eq!(branch.slot_count(), 0);
        assert_eq!(branch.free(), 4076);
    }

    #[test]
    fn test_branch_child_roundtrip() {
        let frame = Frame::new();
        BranchNode::format(&frame);
        let branch = BranchNode::new(&frame).unwrap();

        branch.insert(0, b"m", PageId::new(10)).unwrap();
        branch.set_right_id(PageId::new(11));

        assert_eq!(&branch.key(0)[..], b"m");
        assert_eq!(branch.child(0), PageId::new(10));
        assert_eq!(branch.right_id(), PageId::new(11));
    }

    #[test]
    fn test_branch_set_child_in_place() {
        let frame = Frame::new();
        BranchNode::format(&frame);
        let branch = BranchNode::new(&frame).unwrap();

        branch.insert(0, b"m", PageId::new(10)).unwrap();
        let free_before = branch.free();

        branch.set_child(0, PageId::new(99)).unwrap();
        assert_eq!(branch.child(0), PageId::new(99));
        assert_eq!(&branch.key(0)[..], b"m");
        assert_eq!(branch.free(), free_before);
    }

    #[test]
    fn test_branch_find_child() {
        let frame = Frame::new();
        BranchNode::format(&frame);
        let branch = BranchNode::new(&frame).unwrap();

        // Children: keys < "g" in page 1, keys in ["g", "p") in page 2,
        // keys >= "p" in page 3.
        branch.insert(0, b"g", PageId::new(1)).unwrap();
        branch.insert(1, b"p", PageId::new(2)).unwrap();
        branch.set_right_id(PageId::new(3));

        assert_eq!(branch.find_child(b"a"), (0, PageId::new(1)));
        assert_eq!(branch.find_child(b"g"), (1, PageId::new(2)));
        assert_eq!(branch.find_child(b"h"), (1, PageId::new(2)));
        assert_eq!(branch.find_child(b"p"), (2, PageId::new(3)));
        assert_eq!(branch.find_child(b"z"), (2, PageId::new(3)));
    }

    #[test]
    fn test_branch_find_child_empty() {
        let frame = Frame::new();
        BranchNode::format(&frame);
        let branch = BranchNode::new(&frame).unwrap();
        branch.set_right_id(PageId::new(4));

        assert_eq!(branch.find_child(b"any"), (0, PageId::new(4)));
    }
}
