//! Client/session sync layer for Coscribe documents.
//!
//! Sits on top of `coscribe-model` and owns everything that involves time
//! or a wire:
//!
//! - [`EditScheduler`]: batches rapid local edits behind a quiescence
//!   window, at most one request in flight per document.
//! - [`SyncClient`]: bounded exponential backoff over a
//!   [`DocumentEndpoint`] transport; conflicts and validation rejections
//!   are never blindly retried.
//! - [`DocumentSession`]: the batch → send → reconcile loop, with one
//!   automatic rebase on version conflict and [`SyncError::EditConflict`]
//!   as the refresh escape hatch.
//! - [`PresenceChannel`] / [`PresenceHub`]: focus and blur intents over a
//!   shared connection, the online map rebuilt wholesale from every
//!   broadcast, TTL expiry on the authoritative side.
//! - [`InMemoryAuthority`]: the whole authoritative contract in-process,
//!   for tests and local setups.

mod client;
mod constants;
mod error;
mod hub;
mod memory;
mod presence;
mod scheduler;
mod session;

pub use client::{DocumentEndpoint, SyncClient};
pub use constants::{
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_PRESENCE_TTL,
    DEFAULT_QUIESCENCE_WINDOW, DEFAULT_SEND_ATTEMPTS, PING_INTERVAL, SyncConfig,
};
pub use error::{Result, SyncError};
pub use hub::PresenceHub;
pub use memory::{InMemoryAuthority, SharedAuthority};
pub use presence::{
    ClientMessage, EntityId, OnlineMap, PresenceChannel, PresenceEntry, PresenceTransport,
    RoomId, ServerMessage, ViewerId,
};
pub use scheduler::EditScheduler;
pub use session::DocumentSession;
