//! B+ tree index over slotted pages.
//!
//! The tree owns a meta page whose body holds the root page id. Keys and
//! values are opaque byte sequences ordered lexicographically; the tree is
//! a unique-key index supporting insert and search. Leaves chain through
//! `prev`/`next` sibling links in key order.
//!
//! Branch pages store `(separator, child)` slots where every key under the
//! child is strictly less than the separator; the rightmost child lives in
//! the branch header. A leaf split copies the first key of the new right
//! sibling up as the separator; a branch split promotes its middle key,
//! removing it from both halves.

use crate::manager::PoolManager;
use crate::node::{kind_of, BranchNode, LeafNode, MetaNode, NodeKind};
use crate::slotted::{record_size, Pair, SLOT_ENTRY_SIZE};
use bytes::Bytes;
use kura_buffer::Frame;
use kura_common::page::PageId;
use kura_common::{KuraError, Result};
use std::sync::Arc;

/// Largest key the tree accepts: a promoted separator with its child
/// pointer and directory entry must fit half an empty branch page, which
/// is what keeps branch splits able to place any separator.
pub const MAX_KEY_SIZE: usize = BranchNode::MAX_PAIR_SIZE - 10 - SLOT_ENTRY_SIZE;

/// Result of a child split: the separator to promote and the new right
/// sibling.
struct Split {
    separator: Bytes,
    new_page: PageId,
}

/// Picks how many records the lower half keeps when a page divides.
///
/// `costs` are per-record slot-area footprints (record plus directory
/// entry) in key order, pending record included. The cut starts at the
/// byte midpoint and slides right until the upper half fits. Admission
/// caps every footprint at half an empty region, so whenever the records
/// overflow one page a cut with both halves within `capacity` exists.
fn split_point(costs: &[usize], capacity: usize) -> usize {
    let total: usize = costs.iter().sum();
    let mut mid = 0;
    let mut lower = 0;
    while mid < costs.len() - 1
        && (lower + costs[mid] <= total / 2 || total - lower > capacity)
    {
        lower += costs[mid];
        mid += 1;
    }
    mid.max(1)
}

/// A B+ tree rooted in one meta page of a store.
#[derive(Debug)]
pub struct BTree {
    /// The tree's meta page; retained for the tree's lifetime.
    meta_id: PageId,
    pool: Arc<PoolManager>,
}

impl BTree {
    /// Creates a new tree: allocates a meta page and a root page,
    /// initializes the root as an empty leaf, and points the meta node at
    /// it.
    pub fn create(pool: Arc<PoolManager>) -> Result<Self> {
        let meta_id = pool.create()?;
        let root_id = pool.create()?;

        let meta_page = pool.fetch(meta_id)?;
        MetaNode::format(meta_page);
        let result = MetaNode::new(meta_page).and_then(|meta| meta.set_root_id(root_id));
        pool.release(meta_page);
        result?;

        let root_page = pool.fetch(root_id)?;
        LeafNode::format(root_page);
        pool.release(root_page);

        tracing::debug!(meta = meta_id.0, root = root_id.0, "created tree");
        Ok(Self { meta_id, pool })
    }

    /// Opens the tree whose meta page already exists at `meta_id`.
    pub fn open(pool: Arc<PoolManager>, meta_id: PageId) -> Result<Self> {
        let meta_page = pool.fetch(meta_id)?;
        let result = MetaNode::new(meta_page).map(|_| ());
        pool.release(meta_page);
        result?;
        Ok(Self { meta_id, pool })
    }

    /// Returns the id of the tree's meta page.
    pub fn meta_id(&self) -> PageId {
        self.meta_id
    }

    /// Reads the current root id out of the meta page.
    fn root_id(&self) -> Result<PageId> {
        let meta_page = self.pool.fetch(self.meta_id)?;
        let result = MetaNode::new(meta_page).map(|meta| meta.root_id());
        self.pool.release(meta_page);
        result
    }

    /// Looks up `key`, copying out its value when present.
    pub fn search(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let mut current = self.root_id()?;
        loop {
            let page = self.pool.fetch(current)?;
            match kind_of(page) {
                Ok(NodeKind::Leaf) => {
                    let result = LeafNode::new(page).map(|leaf| {
                        let (index, found) = leaf.search(key);
                        if found {
                            Some(leaf.pair(index).value)
                        } else {
                            None
                        }
                    });
                    self.pool.release(page);
                    return result;
                }
                Ok(NodeKind::Branch) => {
                    let result = BranchNode::new(page).map(|branch| branch.find_child(key).1);
                    self.pool.release(page);
                    current = result?;
                }
                Ok(NodeKind::Meta) => {
                    self.pool.release(page);
                    return Err(KuraError::WrongNodeType {
                        expected: "LEAF    ",
                        actual: "META    ".to_string(),
                    });
                }
                Err(e) => {
                    self.pool.release(page);
                    return Err(e);
                }
            }
        }
    }

    /// Inserts `(key, value)`. Duplicate keys are rejected; pages split
    /// and the tree grows a new root as needed.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > MAX_KEY_SIZE {
            return Err(KuraError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
        }
        // Admission reserves room for the directory entry in half an
        // empty leaf; that reserve is what guarantees a split can always
        // place the pair.
        let size = record_size(key, value);
        if size + SLOT_ENTRY_SIZE > LeafNode::MAX_PAIR_SIZE {
            return Err(KuraError::PairTooLarge {
                size,
                max: LeafNode::MAX_PAIR_SIZE - SLOT_ENTRY_SIZE,
            });
        }

        let root_id = self.root_id()?;
        if let Some(split) = self.insert_at(root_id, key, value)? {
            self.grow_root(root_id, split)?;
        }
        Ok(())
    }

    /// Inserts into the subtree rooted at `page_id`. Returns the split to
    /// propagate when the page had to divide.
    fn insert_at(&self, page_id: PageId, key: &[u8], value: &[u8]) -> Result<Option<Split>> {
        let page = self.pool.fetch(page_id)?;
        let result = match kind_of(page) {
            Ok(NodeKind::Leaf) => self.insert_into_leaf(page, page_id, key, value),
            Ok(NodeKind::Branch) => self.insert_into_branch(page, key, value),
            Ok(NodeKind::Meta) => Err(KuraError::WrongNodeType {
                expected: "LEAF    ",
                actual: "META    ".to_string(),
            }),
            Err(e) => Err(e),
        };
        self.pool.release(page);
        result
    }

    fn insert_into_leaf(
        &self,
        page: &Frame,
        page_id: PageId,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<Split>> {
        let leaf = LeafNode::new(page)?;
        let (index, found) = leaf.search(key);
        if found {
            return Err(KuraError::DuplicateKey);
        }

        match leaf.insert(index, key, value) {
            Ok(()) => Ok(None),
            Err(KuraError::PageFull { .. }) | Err(KuraError::PairTooLarge { .. })
                if leaf.slot_count() > 0 =>
            {
                self.split_leaf(page, page_id, index, key, value)
            }
            Err(e) => Err(e),
        }
    }

    /// Splits a full leaf, stitches the sibling chain, and hands the new
    /// sibling's first key up as the separator (a copy, not a move).
    ///
    /// The pending pair joins the sorted run before the cut is chosen, and
    /// the cut is picked by cumulative bytes so each half is guaranteed to
    /// fit. Every fallible step runs before the original page is touched;
    /// a failure leaves the tree intact (at worst an unreferenced page).
    fn split_leaf(
        &self,
        page: &Frame,
        page_id: PageId,
        index: u16,
        key: &[u8],
        value: &[u8],
    ) -> Result<Option<Split>> {
        let leaf = LeafNode::new(page)?;
        let count = leaf.slot_count();

        let mut lower: Vec<Pair> = (0..count).map(|i| leaf.pair(i)).collect();
        lower.insert(index as usize, Pair::new(key.to_vec(), value.to_vec()));

        let costs: Vec<usize> = lower
            .iter()
            .map(|pair| pair.disk_size() + SLOT_ENTRY_SIZE)
            .collect();
        let mid = split_point(&costs, LeafNode::CAPACITY);

        let upper = lower.split_off(mid);
        let separator = upper[0].key.clone();

        let prev_id = leaf.prev_id();
        let old_next = leaf.next_id();

        let new_id = self.pool.create()?;
        let new_page = self.pool.fetch(new_id)?;
        LeafNode::format(new_page);
        let result = (|| -> Result<()> {
            let new_leaf = LeafNode::new(new_page)?;
            new_leaf.set_prev_id(page_id);
            new_leaf.set_next_id(old_next);
            for (i, pair) in upper.iter().enumerate() {
                new_leaf.insert_unbounded(i as u16, &pair.key, &pair.value)?;
            }
            Ok(())
        })();
        self.pool.release(new_page);
        result?;

        // The old successor's prev link must follow the chain.
        if old_next.is_valid() {
            let next_page = self.pool.fetch(old_next)?;
            let result = LeafNode::new(next_page).map(|next| next.set_prev_id(new_id));
            self.pool.release(next_page);
            result?;
        }

        // Rebuild the original page with the lower half so the moved
        // records' heap bytes do not linger there. The cut guarantees the
        // half fits, so nothing below fails for space.
        leaf.reset();
        leaf.set_prev_id(prev_id);
        leaf.set_next_id(new_id);
        for (i, pair) in lower.iter().enumerate() {
            leaf.insert_unbounded(i as u16, &pair.key, &pair.value)?;
        }

        tracing::debug!(left = page_id.0, right = new_id.0, "leaf split");
        Ok(Some(Split {
            separator,
            new_page: new_id,
        }))
    }

    fn insert_into_branch(&self, page: &Frame, key: &[u8], value: &[u8]) -> Result<Option<Split>> {
        let branch = BranchNode::new(page)?;
        let (slot, child_id) = branch.find_child(key);

        let split = match self.insert_at(child_id, key, value)? {
            None => return Ok(None),
            Some(split) => split,
        };

        // The divided child kept its id and its lower keys. Its slot entry
        // (or the header, when it was the rightmost child) must now name
        // the new sibling, with the separator guarding the old page.
        let count = branch.slot_count();
        match branch.insert(slot, &split.separator, child_id) {
            Ok(()) => {
                if slot == count {
                    branch.set_right_id(split.new_page);
                } else {
                    branch.set_child(slot + 1, split.new_page)?;
                }
                Ok(None)
            }
            Err(KuraError::PageFull { .. }) | Err(KuraError::PairTooLarge { .. }) => {
                self.split_branch(page, slot, child_id, split)
            }
            Err(e) => Err(e),
        }
    }

    /// Splits a full branch while applying a pending child split. The
    /// separator at the cut is promoted and removed from both halves; the
    /// left half inherits that slot's child as its rightmost, the new
    /// right half inherits the old rightmost.
    ///
    /// The cut is picked by cumulative bytes over the merged entries, and
    /// the new sibling is written before the original page is rebuilt, so
    /// the split cannot fail after mutating the tree.
    fn split_branch(
        &self,
        page: &Frame,
        slot: u16,
        child_id: PageId,
        pending: Split,
    ) -> Result<Option<Split>> {
        let branch = BranchNode::new(page)?;
        let count = branch.slot_count();

        let mut entries: Vec<(Bytes, PageId)> =
            (0..count).map(|i| (branch.key(i), branch.child(i))).collect();
        let mut right_id = branch.right_id();

        // Apply the pending separator the same way the in-place path does.
        if slot == count {
            entries.push((pending.separator, child_id));
            right_id = pending.new_page;
        } else {
            entries.insert(slot as usize, (pending.separator, child_id));
            entries[slot as usize + 1].1 = pending.new_page;
        }

        let costs: Vec<usize> = entries
            .iter()
            .map(|(separator, child)| {
                record_size(separator, &child.to_le_bytes()) + SLOT_ENTRY_SIZE
            })
            .collect();
        let mid = split_point(&costs, BranchNode::CAPACITY);
        let promoted = entries[mid].0.clone();
        let left_right_id = entries[mid].1;

        // The new sibling takes slots (mid, n) and the old rightmost child.
        let new_id = self.pool.create()?;
        let new_page = self.pool.fetch(new_id)?;
        BranchNode::format(new_page);
        let result = (|| -> Result<()> {
            let new_branch = BranchNode::new(new_page)?;
            for (i, (separator, child)) in entries[mid + 1..].iter().enumerate() {
                new_branch.insert_unbounded(i as u16, separator, *child)?;
            }
            new_branch.set_right_id(right_id);
            Ok(())
        })();
        self.pool.release(new_page);
        result?;

        // Rebuild the original page with slots [0, mid); the cut
        // guarantees both halves fit.
        branch.reset();
        for (i, (separator, child)) in entries[..mid].iter().enumerate() {
            branch.insert_unbounded(i as u16, separator, *child)?;
        }
        branch.set_right_id(left_right_id);

        tracing::debug!(right = new_id.0, "branch split");
        Ok(Some(Split {
            separator: promoted,
            new_page: new_id,
        }))
    }

    /// Grows the tree by one level after the root split: the new root's
    /// single slot guards the old root, its rightmost child is the new
    /// sibling.
    fn grow_root(&self, old_root: PageId, split: Split) -> Result<()> {
        let new_root = self.pool.create()?;

        let page = self.pool.fetch(new_root)?;
        BranchNode::format(page);
        let result = (|| -> Result<()> {
            let branch = BranchNode::new(page)?;
            branch.insert(0, &split.separator, old_root)?;
            branch.set_right_id(split.new_page);
            Ok(())
        })();
        self.pool.release(page);
        result?;

        let meta_page = self.pool.fetch(self.meta_id)?;
        let result = MetaNode::new(meta_page).and_then(|meta| meta.set_root_id(new_root));
        self.pool.release(meta_page);
        result?;

        tracing::debug!(old = old_root.0, new = new_root.0, "root split, tree grew");
        Ok(())
    }
}
