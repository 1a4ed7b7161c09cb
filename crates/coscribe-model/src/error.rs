//! Error types for document operations.

use thiserror::Error;

use crate::BlockId;

/// Errors from block store mutation primitives.
///
/// Every primitive validates before mutating, so any of these means the
/// store was left exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Referenced anchor or parent does not resolve (missing, or a sibling
    /// anchor under a different parent).
    #[error("invalid anchor: {0:?}")]
    InvalidAnchor(BlockId),

    /// Both `after` and `before` anchors were supplied for one placement.
    #[error("conflicting anchors: both after and before supplied")]
    ConflictingAnchors,

    /// Block not found in the store.
    #[error("block not found: {0:?}")]
    NotFound(BlockId),

    /// A block with this id already exists. The root sentinel counts as
    /// always present.
    #[error("block already exists: {0:?}")]
    DuplicateId(BlockId),

    /// The move would make a block an ancestor of itself.
    #[error("move would create a cycle at {0:?}")]
    CycleDetected(BlockId),

    /// Snapshot references a parent that is not part of the tree.
    #[error("dangling parent {parent:?} referenced by {child:?}")]
    DanglingParent { child: BlockId, parent: BlockId },

    /// Snapshot contains two siblings with the same order key.
    #[error("duplicate sibling order key under {parent:?}")]
    DuplicateOrder { parent: BlockId },
}

/// Errors from applying a patch request to a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// Declared base version does not match the document's current version.
    #[error("version conflict: document is at version {current}")]
    VersionConflict { current: u64 },

    /// An operation failed validation; the whole request was rejected.
    #[error("operation {index} rejected: {source}")]
    Validation {
        index: usize,
        #[source]
        source: StoreError,
    },
}
