//! Presence hub — authoritative aggregation with time-based expiry.
//!
//! The hub is the server-side half of the presence channel: it folds focus,
//! blur, and disconnect events into per-entity viewer sets and rebuilds the
//! full online map for every broadcast. A repeated focus is a keep-alive
//! touch; entries untouched past the TTL are swept by `expire`, which
//! covers clients that vanished without a blur.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::{DEFAULT_PRESENCE_TTL, EntityId, OnlineMap, PresenceEntry, ServerMessage, ViewerId};

#[derive(Clone, Debug)]
struct HubEntry {
    focused_since: u64,
    last_seen: u64,
}

/// Authoritative presence state for one room.
#[derive(Clone, Debug)]
pub struct PresenceHub {
    ttl: Duration,
    entries: HashMap<EntityId, HashMap<ViewerId, HubEntry>>,
}

impl Default for PresenceHub {
    fn default() -> Self {
        Self::new(DEFAULT_PRESENCE_TTL)
    }
}

impl PresenceHub {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Record or refresh focus. A repeated focus refreshes `last_seen` but
    /// keeps the original `focused_since`.
    pub fn focus(&mut self, viewer: ViewerId, entity: EntityId, now_ms: u64) {
        self.entries
            .entry(entity)
            .or_default()
            .entry(viewer)
            .and_modify(|e| e.last_seen = now_ms)
            .or_insert(HubEntry {
                focused_since: now_ms,
                last_seen: now_ms,
            });
    }

    pub fn blur(&mut self, viewer: &ViewerId, entity: &EntityId) {
        if let Some(viewers) = self.entries.get_mut(entity) {
            viewers.remove(viewer);
            if viewers.is_empty() {
                self.entries.remove(entity);
            }
        }
    }

    /// Channel disconnect: drop every entry this viewer holds.
    pub fn disconnect(&mut self, viewer: &ViewerId) {
        self.entries.retain(|_, viewers| {
            viewers.remove(viewer);
            !viewers.is_empty()
        });
    }

    /// Sweep entries whose last touch is older than the TTL.
    pub fn expire(&mut self, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.ttl.as_millis() as u64);
        let before = self.entry_count();
        self.entries.retain(|_, viewers| {
            viewers.retain(|_, e| e.last_seen >= cutoff);
            !viewers.is_empty()
        });
        let swept = before - self.entry_count();
        if swept > 0 {
            debug!(swept, "expired stale presence entries");
        }
    }

    /// Drop every entry for entities that no longer exist, e.g. after a
    /// confirmed cascading delete.
    pub fn drop_entities(&mut self, entities: &[EntityId]) {
        for entity in entities {
            self.entries.remove(entity);
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    /// Rebuild the full map for broadcast. Deterministic entry order:
    /// oldest focus first, viewer id as tiebreak.
    pub fn online(&self) -> OnlineMap {
        self.entries
            .iter()
            .map(|(entity, viewers)| {
                let mut list: Vec<PresenceEntry> = viewers
                    .iter()
                    .map(|(viewer, e)| PresenceEntry {
                        viewer_id: viewer.clone(),
                        focused_since: e.focused_since,
                    })
                    .collect();
                list.sort_by(|a, b| {
                    a.focused_since
                        .cmp(&b.focused_since)
                        .then_with(|| a.viewer_id.cmp(&b.viewer_id))
                });
                (entity.clone(), list)
            })
            .collect()
    }

    pub fn broadcast(&self) -> ServerMessage {
        ServerMessage::PresenceState { online: self.online() }
    }
}
