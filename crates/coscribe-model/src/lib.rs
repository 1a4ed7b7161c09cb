//! Block-tree document model for Coscribe.
//!
//! A document is an ordered tree of typed blocks (paragraphs, headings,
//! list items, ...) edited collaboratively. This crate is the synchronous
//! core shared by clients and the authoritative side:
//!
//! - **Data model**: [`Block`], [`BlockId`], inline styled runs, opaque
//!   per-type props. Sibling order uses fractional `f64` keys so an insert
//!   between neighbors touches one block.
//! - **Store**: [`BlockStore`], an arena keyed by id with validate-first
//!   mutation primitives and cascading delete.
//! - **Protocol**: [`PatchOp`]/[`PatchRequest`]/[`PatchResponse`], the JSON
//!   wire contract for incremental edits gated on a version token.
//! - **Codec**: [`diff`] between trees and [`Document::apply`], which
//!   applies requests atomically and bumps the version by exactly one.
//!
//! Concurrency is optimistic: a stale `base_version` is rejected with the
//! current version and the client rebases and resends. There is no CRDT
//! merge here; the sync layer (`coscribe-sync`) owns retry and rebase
//! policy, and nothing in this crate suspends.

mod block;
mod codec;
mod error;
mod ops;
mod store;

pub use block::{Block, BlockId, BlockType, InlineRun, PartialPatch, StyleSet};
pub use codec::{Applied, Document, diff};
pub use error::{PatchError, StoreError};
pub use ops::{PatchOp, PatchRequest, PatchResponse};
pub use store::{Anchor, BlockStore, ORDER_STEP, TreeSnapshot};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
