//! Patch codec — diff between trees, atomic application against a version.
//!
//! `diff` produces the minimal op list turning one tree into another, and
//! `Document::apply` is its receiving end: validate the version token, run
//! the ops on a scratch copy, commit all or nothing. `apply(diff(a, b))` on
//! a document holding `a` yields a tree structurally equal to `b`.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::{
    Anchor, BlockId, BlockStore, PartialPatch, PatchError, PatchOp, PatchRequest, StoreError,
    TreeSnapshot,
};

// =============================================================================
// Document
// =============================================================================

/// Result of a successful patch application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    /// Version after the request.
    pub version: u64,
    /// Every block removed by delete operations, cascades included, so
    /// downstream state (presence, selections) can drop references.
    pub removed: Vec<BlockId>,
}

/// A block tree plus the version token that gates patches against it.
///
/// Versions count accepted patch requests, not operations: each accepted
/// request bumps the version by exactly one.
#[derive(Clone, Debug, Default)]
pub struct Document {
    store: BlockStore,
    version: u64,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: BlockStore, version: u64) -> Self {
        Self { store, version }
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn into_store(self) -> BlockStore {
        self.store
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        self.store.snapshot()
    }

    /// Apply a patch request atomically.
    ///
    /// The declared `base_version` is checked first; operations then run in
    /// order on a scratch copy, so a failing operation leaves no partial
    /// effect and the version unchanged.
    pub fn apply(&mut self, request: &PatchRequest) -> Result<Applied, PatchError> {
        if let Some(base) = request.base_version {
            if base != self.version {
                return Err(PatchError::VersionConflict {
                    current: self.version,
                });
            }
        }

        let mut scratch = self.store.clone();
        let mut removed = Vec::new();
        for (index, op) in request.ops.iter().enumerate() {
            removed.extend(
                apply_op(&mut scratch, op).map_err(|source| PatchError::Validation { index, source })?,
            );
        }

        self.store = scratch;
        self.version += 1;
        debug!(version = self.version, ops = request.ops.len(), "patch applied");
        Ok(Applied {
            version: self.version,
            removed,
        })
    }
}

fn anchor_from(after: &Option<BlockId>, before: &Option<BlockId>) -> Result<Anchor, StoreError> {
    match (after, before) {
        (Some(_), Some(_)) => Err(StoreError::ConflictingAnchors),
        (Some(a), None) => Ok(Anchor::After(a.clone())),
        (None, Some(b)) => Ok(Anchor::Before(b.clone())),
        (None, None) => Ok(Anchor::End),
    }
}

/// Run one operation; returns the removed ids for deletes.
fn apply_op(store: &mut BlockStore, op: &PatchOp) -> Result<Vec<BlockId>, StoreError> {
    match op {
        PatchOp::Insert {
            block,
            after_id,
            before_id,
        } => {
            let anchor = anchor_from(after_id, before_id)?;
            store.insert(block.clone(), &anchor)?;
            Ok(Vec::new())
        }
        PatchOp::Update { node_id, patch } => {
            store.update(node_id, patch)?;
            Ok(Vec::new())
        }
        PatchOp::Move {
            node_id,
            new_parent_id,
            after_id,
            before_id,
            ..
        } => {
            let anchor = anchor_from(after_id, before_id)?;
            store.move_block(node_id, new_parent_id.as_ref(), &anchor)?;
            Ok(Vec::new())
        }
        PatchOp::Delete { node_id } => store.delete(node_id),
    }
}

// =============================================================================
// Diff
// =============================================================================

/// Compute the minimal op list transforming `before` into `after`.
///
/// Deletes come first, one per topmost deleted block (the cascade covers
/// descendants). Survivors living inside a deleted subtree are hoisted to
/// the root beforehand so the cascade cannot take them; the placement pass
/// moves them to their final position. Placement runs top-down per parent,
/// left to right:
/// surviving siblings whose previous order keys form a longest increasing
/// subsequence are left alone, everything else is inserted or moved. Each
/// placed block is anchored after the previously placed sibling, or before
/// the first stable sibling, so every anchor resolves against
/// already-applied state. Because parents are processed before their
/// children, a moved block always lands under a parent whose own position
/// is final, which also rules out transient cycles.
pub fn diff(before: &BlockStore, after: &BlockStore) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    let mut deletes = Vec::new();

    for block in before.snapshot().blocks() {
        let parent_deleted = !block.parent_id.is_root()
            && before.contains(&block.parent_id)
            && !after.contains(&block.parent_id);
        if after.contains(&block.id) {
            // A survivor directly under a deleted block must escape before
            // the cascade fires. Its subtree travels with it; the placement
            // pass finds it at the root and moves it where it belongs.
            if parent_deleted {
                ops.push(PatchOp::Move {
                    node_id: block.id.clone(),
                    new_parent_id: Some(BlockId::root()),
                    after_id: None,
                    before_id: None,
                    order: block.order,
                });
            }
        } else if !parent_deleted {
            deletes.push(PatchOp::Delete {
                node_id: block.id.clone(),
            });
        }
    }
    ops.append(&mut deletes);

    let mut queue = VecDeque::from([BlockId::root()]);
    while let Some(parent) = queue.pop_front() {
        let children = after.children(&parent);
        queue.extend(children.iter().map(|c| c.id.clone()));

        // Survivors that stayed under this parent, as (position, previous
        // order key). The LIS over previous keys is the largest set whose
        // relative order already matches the target.
        let mut survivors = Vec::new();
        for (i, child) in children.iter().enumerate() {
            if let Some(prev) = before.get(&child.id) {
                if prev.parent_id == parent {
                    survivors.push((i, prev.order));
                }
            }
        }
        let orders: Vec<f64> = survivors.iter().map(|(_, o)| *o).collect();
        let stable: HashSet<usize> = lis_indices(&orders)
            .into_iter()
            .map(|k| survivors[k].0)
            .collect();

        let mut prev_placed: Option<BlockId> = None;
        for (i, child) in children.iter().enumerate() {
            if stable.contains(&i) {
                if let Some(prev) = before.get(&child.id) {
                    if let Some(op) = field_patch(prev, child) {
                        ops.push(op);
                    }
                }
                prev_placed = Some(child.id.clone());
                continue;
            }

            let (after_id, before_id) = match &prev_placed {
                Some(placed) => (Some(placed.clone()), None),
                None => {
                    let next_stable = children[i + 1..]
                        .iter()
                        .enumerate()
                        .find(|(j, _)| stable.contains(&(i + 1 + j)))
                        .map(|(_, c)| c.id.clone());
                    (None, next_stable)
                }
            };

            match before.get(&child.id) {
                Some(prev) => {
                    let new_parent_id = (prev.parent_id != parent).then(|| parent.clone());
                    ops.push(PatchOp::Move {
                        node_id: child.id.clone(),
                        new_parent_id,
                        after_id,
                        before_id,
                        order: child.order,
                    });
                    if let Some(op) = field_patch(prev, child) {
                        ops.push(op);
                    }
                }
                None => {
                    ops.push(PatchOp::Insert {
                        block: (*child).clone(),
                        after_id,
                        before_id,
                    });
                }
            }
            prev_placed = Some(child.id.clone());
        }
    }

    ops
}

/// Minimal update op for field-level differences, or `None` when equal.
fn field_patch(before: &crate::Block, after: &crate::Block) -> Option<PatchOp> {
    let mut patch = PartialPatch::default();
    if before.kind != after.kind {
        patch.kind = Some(after.kind.clone());
    }
    if before.props != after.props {
        patch.props = Some(after.props.clone());
    }
    if before.content != after.content {
        patch.content = Some(after.content.clone());
    }
    if before.depth != after.depth {
        patch.depth = Some(after.depth);
    }
    (!patch.is_empty()).then(|| PatchOp::Update {
        node_id: after.id.clone(),
        patch,
    })
}

/// Indices of one longest strictly increasing subsequence.
fn lis_indices(values: &[f64]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; values.len()];
    for i in 0..values.len() {
        let pos = tails.partition_point(|&t| values[t] < values[i]);
        if pos > 0 {
            prev[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }
    let mut out = Vec::new();
    let mut cur = tails.last().copied();
    while let Some(i) = cur {
        out.push(i);
        cur = prev[i];
    }
    out.reverse();
    out
}
