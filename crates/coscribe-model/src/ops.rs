//! Patch protocol wire types.
//!
//! A client never sends whole documents after the initial load; it sends
//! ordered lists of block operations gated on a version token. Layouts here
//! are wire contracts; changing a field name breaks interop.

use serde::{Deserialize, Serialize};

use crate::{Block, BlockId, PartialPatch};

/// One atomic tree mutation. JSON-tagged by `"op"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    /// Create a new block under `block.parent_id`. With no anchor the block
    /// is appended; supplying both anchors is rejected.
    Insert {
        block: Block,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after_id: Option<BlockId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before_id: Option<BlockId>,
    },

    /// Merge a partial attribute set into an existing block.
    Update { node_id: BlockId, patch: PartialPatch },

    /// Relocate a block. `new_parent_id` of `None` keeps the current parent.
    Move {
        node_id: BlockId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_parent_id: Option<BlockId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after_id: Option<BlockId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before_id: Option<BlockId>,
        /// Sender's computed order key, carried for diagnostics. The
        /// receiver recomputes placement from the anchors.
        order: f64,
    },

    /// Remove a block and its whole subtree.
    Delete { node_id: BlockId },
}

impl PatchOp {
    /// The block this operation targets (the new block's id for inserts).
    pub fn node_id(&self) -> &BlockId {
        match self {
            PatchOp::Insert { block, .. } => &block.id,
            PatchOp::Update { node_id, .. }
            | PatchOp::Move { node_id, .. }
            | PatchOp::Delete { node_id } => node_id,
        }
    }

    /// Whether the operation changes tree shape (anything but an update).
    pub fn is_structural(&self) -> bool {
        !matches!(self, PatchOp::Update { .. })
    }
}

/// Ordered operations applied atomically against `base_version`.
///
/// A request with no `base_version` skips the optimistic-concurrency check;
/// clients that care about lost updates always set it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub ops: Vec<PatchOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<u64>,
}

impl PatchRequest {
    pub fn new(ops: Vec<PatchOp>, base_version: u64) -> Self {
        Self {
            ops,
            base_version: Some(base_version),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Authoritative verdict on one patch request. JSON-tagged by `"status"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PatchResponse {
    /// Applied atomically; the document is now at `version`.
    Applied { version: u64 },
    /// Stale `base_version`; nothing was applied. The client should rebase
    /// onto `current_version` and resend.
    Conflict { current_version: u64 },
    /// Operation `index` failed validation; nothing was applied.
    ValidationError { index: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockType;
    use serde_json::json;

    #[test]
    fn insert_wire_shape() {
        let op = PatchOp::Insert {
            block: Block::new("b2", BlockType::Paragraph).with_text("hi"),
            after_id: Some("b1".into()),
            before_id: None,
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(
            value,
            json!({
                "op": "insert",
                "block": {
                    "id": "b2",
                    "type": "paragraph",
                    "content": [{"text": "hi"}],
                    "parent_id": "",
                    "order": 0.0
                },
                "after_id": "b1"
            })
        );
        assert_eq!(serde_json::from_value::<PatchOp>(value).unwrap(), op);
    }

    #[test]
    fn move_wire_shape() {
        let json = json!({
            "op": "move",
            "node_id": "b3",
            "new_parent_id": "b1",
            "before_id": "b2",
            "order": 5.0
        });
        let op: PatchOp = serde_json::from_value(json).unwrap();
        assert_eq!(
            op,
            PatchOp::Move {
                node_id: "b3".into(),
                new_parent_id: Some("b1".into()),
                after_id: None,
                before_id: Some("b2".into()),
                order: 5.0,
            }
        );
        assert!(op.is_structural());
    }

    #[test]
    fn update_is_not_structural() {
        let op = PatchOp::Update {
            node_id: "b1".into(),
            patch: PartialPatch::default(),
        };
        assert!(!op.is_structural());
        assert_eq!(op.node_id(), &BlockId::from("b1"));
    }

    #[test]
    fn request_wire_shape() {
        let request = PatchRequest::new(vec![PatchOp::Delete { node_id: "b9".into() }], 41);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "ops": [{"op": "delete", "node_id": "b9"}],
                "base_version": 41
            })
        );
    }

    #[test]
    fn response_wire_shapes() {
        let applied: PatchResponse =
            serde_json::from_value(json!({"status": "applied", "version": 42})).unwrap();
        assert_eq!(applied, PatchResponse::Applied { version: 42 });

        let conflict: PatchResponse =
            serde_json::from_value(json!({"status": "conflict", "current_version": 43})).unwrap();
        assert_eq!(conflict, PatchResponse::Conflict { current_version: 43 });

        let rejected: PatchResponse = serde_json::from_value(
            json!({"status": "validation_error", "index": 1, "message": "block not found: \"x\""}),
        )
        .unwrap();
        assert!(matches!(rejected, PatchResponse::ValidationError { index: 1, .. }));
    }
}
