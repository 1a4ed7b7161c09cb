//! Block store — arena of blocks keyed by id.
//!
//! Holds one document's block tree. Parent, child, and sibling relationships
//! are id references only; there are no owned subtree structures, so moves
//! are O(1) field updates. Every mutation primitive validates before
//! mutating, which keeps the tree valid after every call: `parent_id` always
//! resolves, sibling order keys stay unique, and moves cannot introduce a
//! cycle.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Block, BlockId, PartialPatch, StoreError};

/// Gap between sibling order keys after an append or a renumbering pass.
pub const ORDER_STEP: f64 = 10.0;

/// Placement of a block among its siblings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Anchor {
    /// Append after the parent's last child.
    #[default]
    End,
    /// Immediately after this sibling.
    After(BlockId),
    /// Immediately before this sibling.
    Before(BlockId),
}

/// Arena of blocks for one document.
#[derive(Clone, Debug, Default)]
pub struct BlockStore {
    blocks: HashMap<BlockId, Block>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.blocks.contains_key(id)
    }

    pub fn get(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// Children of `parent` in sibling order. Order keys are unique within a
    /// parent, so the id tiebreak never fires on a valid tree; it only keeps
    /// the sort total.
    pub fn children(&self, parent: &BlockId) -> Vec<&Block> {
        let mut out: Vec<&Block> = self
            .blocks
            .values()
            .filter(|b| &b.parent_id == parent)
            .collect();
        out.sort_by(|a, b| {
            a.order
                .partial_cmp(&b.order)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    pub fn child_ids(&self, parent: &BlockId) -> Vec<BlockId> {
        self.children(parent).into_iter().map(|b| b.id.clone()).collect()
    }

    fn validate_parent(&self, parent: &BlockId) -> Result<(), StoreError> {
        if parent.is_root() || self.blocks.contains_key(parent) {
            Ok(())
        } else {
            Err(StoreError::InvalidAnchor(parent.clone()))
        }
    }

    // =========================================================================
    // Mutation primitives
    // =========================================================================

    /// Insert a new block at `anchor` among the children of
    /// `block.parent_id`. The incoming order key is ignored; the store
    /// computes one from the anchor.
    pub fn insert(&mut self, mut block: Block, anchor: &Anchor) -> Result<BlockId, StoreError> {
        if block.id.is_root() || self.blocks.contains_key(&block.id) {
            return Err(StoreError::DuplicateId(block.id));
        }
        self.validate_parent(&block.parent_id)?;
        let parent = block.parent_id.clone();
        block.order = self.place(&parent, anchor, None)?;
        let id = block.id.clone();
        self.blocks.insert(id.clone(), block);
        Ok(id)
    }

    /// Merge a partial attribute set into an existing block. Structure
    /// (parent, order) is untouched; that is what moves are for.
    pub fn update(&mut self, id: &BlockId, patch: &PartialPatch) -> Result<(), StoreError> {
        let block = self
            .blocks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        patch.apply_to(block);
        Ok(())
    }

    /// Relocate a block to `anchor`, optionally under a new parent.
    /// `new_parent` of `None` keeps the current parent (pure reorder).
    pub fn move_block(
        &mut self,
        id: &BlockId,
        new_parent: Option<&BlockId>,
        anchor: &Anchor,
    ) -> Result<(), StoreError> {
        let current_parent = self
            .blocks
            .get(id)
            .map(|b| b.parent_id.clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let parent = new_parent.cloned().unwrap_or(current_parent);
        self.validate_parent(&parent)?;
        if &parent == id || self.is_in_subtree(&parent, id) {
            return Err(StoreError::CycleDetected(id.clone()));
        }
        let order = self.place(&parent, anchor, Some(id))?;
        if let Some(block) = self.blocks.get_mut(id) {
            block.parent_id = parent;
            block.order = order;
        }
        Ok(())
    }

    /// Remove the subtree rooted at `id`. Returns every removed id, root
    /// first, so downstream consumers (presence, selection) can drop their
    /// references.
    pub fn delete(&mut self, id: &BlockId) -> Result<Vec<BlockId>, StoreError> {
        if !self.blocks.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        let mut removed = vec![id.clone()];
        let mut i = 0;
        while i < removed.len() {
            let parent = removed[i].clone();
            removed.extend(self.child_ids(&parent));
            i += 1;
        }
        for rid in &removed {
            self.blocks.remove(rid);
        }
        Ok(removed)
    }

    /// Whether `id` lies in the subtree rooted at `root`.
    fn is_in_subtree(&self, id: &BlockId, root: &BlockId) -> bool {
        let mut cur = id.clone();
        while let Some(block) = self.blocks.get(&cur) {
            if &block.parent_id == root {
                return true;
            }
            cur = block.parent_id.clone();
        }
        false
    }

    // =========================================================================
    // Order key calculation
    // =========================================================================

    /// Compute the order key for a placement at `anchor` under `parent`.
    /// `exclude` is the block being moved, ignored as a sibling of itself.
    /// When the midpoint between two neighbors is no longer strictly between
    /// them, the parent's children are renumbered to evenly spaced keys and
    /// the placement recomputed.
    fn place(
        &mut self,
        parent: &BlockId,
        anchor: &Anchor,
        exclude: Option<&BlockId>,
    ) -> Result<f64, StoreError> {
        let siblings: Vec<(BlockId, f64)> = self
            .children(parent)
            .into_iter()
            .filter(|b| exclude != Some(&b.id))
            .map(|b| (b.id.clone(), b.order))
            .collect();

        let (lo, hi) = match anchor {
            Anchor::End => {
                return Ok(match siblings.last() {
                    Some((_, last)) => last + ORDER_STEP,
                    None => ORDER_STEP,
                });
            }
            Anchor::After(a) => {
                let idx = siblings
                    .iter()
                    .position(|(id, _)| id == a)
                    .ok_or_else(|| StoreError::InvalidAnchor(a.clone()))?;
                (Some(siblings[idx].1), siblings.get(idx + 1).map(|(_, o)| *o))
            }
            Anchor::Before(b) => {
                let idx = siblings
                    .iter()
                    .position(|(id, _)| id == b)
                    .ok_or_else(|| StoreError::InvalidAnchor(b.clone()))?;
                let prev = idx.checked_sub(1).map(|i| siblings[i].1);
                (prev, Some(siblings[idx].1))
            }
        };

        match (lo, hi) {
            (Some(lo), Some(hi)) => match midpoint(lo, hi) {
                Some(mid) => Ok(mid),
                None => {
                    debug!(parent = %parent, lo, hi, "order precision exhausted, renumbering siblings");
                    self.renumber_children(parent);
                    self.place(parent, anchor, exclude)
                }
            },
            (Some(lo), None) => Ok(lo + ORDER_STEP),
            (None, Some(hi)) => Ok(hi - ORDER_STEP),
            (None, None) => Ok(ORDER_STEP),
        }
    }

    fn renumber_children(&mut self, parent: &BlockId) {
        for (i, id) in self.child_ids(parent).iter().enumerate() {
            if let Some(block) = self.blocks.get_mut(id) {
                block.order = (i as f64 + 1.0) * ORDER_STEP;
            }
        }
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Depth-first flattening of the tree, children in sibling order.
    pub fn snapshot(&self) -> TreeSnapshot {
        let mut blocks = Vec::with_capacity(self.blocks.len());
        self.flatten(&BlockId::root(), &mut blocks);
        TreeSnapshot { blocks }
    }

    fn flatten(&self, parent: &BlockId, out: &mut Vec<Block>) {
        for child in self.children(parent) {
            out.push(child.clone());
            self.flatten(&child.id, out);
        }
    }

    /// Rebuild a store from a snapshot, validating ids, parent references,
    /// and sibling order uniqueness.
    pub fn from_snapshot(snapshot: &TreeSnapshot) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for block in &snapshot.blocks {
            if block.id.is_root()
                || store.blocks.insert(block.id.clone(), block.clone()).is_some()
            {
                return Err(StoreError::DuplicateId(block.id.clone()));
            }
        }
        for block in &snapshot.blocks {
            if !block.parent_id.is_root() && !store.blocks.contains_key(&block.parent_id) {
                return Err(StoreError::DanglingParent {
                    child: block.id.clone(),
                    parent: block.parent_id.clone(),
                });
            }
        }
        store.check_orders()?;
        Ok(store)
    }

    fn check_orders(&self) -> Result<(), StoreError> {
        let mut parents: Vec<BlockId> = vec![BlockId::root()];
        parents.extend(self.blocks.keys().cloned());
        for parent in parents {
            let children = self.children(&parent);
            for pair in children.windows(2) {
                if pair[0].order >= pair[1].order {
                    return Err(StoreError::DuplicateOrder { parent });
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tree snapshot
// =============================================================================

/// Immutable depth-first flattening of a block tree.
///
/// This is what travels on the wire when a client fetches the authoritative
/// document, and what the store rebuilds itself from. The sequence already
/// encodes sibling order, so structural comparison ([`TreeSnapshot::same_tree`])
/// ignores the raw order floats.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    blocks: Vec<Block>,
}

impl TreeSnapshot {
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.get(id).is_some()
    }

    /// Structural equality: same blocks, same fields, same tree shape.
    /// Raw order keys may differ between two stores that represent the same
    /// document, so they are excluded.
    pub fn same_tree(&self, other: &TreeSnapshot) -> bool {
        self.blocks.len() == other.blocks.len()
            && self.blocks.iter().zip(&other.blocks).all(|(a, b)| {
                a.id == b.id
                    && a.kind == b.kind
                    && a.props == b.props
                    && a.content == b.content
                    && a.parent_id == b.parent_id
                    && a.depth == b.depth
            })
    }
}

fn midpoint(lo: f64, hi: f64) -> Option<f64> {
    let mid = lo + (hi - lo) / 2.0;
    (mid > lo && mid < hi).then_some(mid)
}
