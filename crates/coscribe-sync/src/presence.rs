//! Presence channel — who is looking at what, right now.
//!
//! Presence is soft state: the client sends focus/blur intents over one
//! shared connection and receives the full online map back in every
//! `presence_state` broadcast. The map is replaced wholesale, never merged
//! incrementally, so replayed or reordered broadcasts leave every observer
//! converged on the authoritative view.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smartstring::alias::String as SmartString;
use tracing::{debug, warn};

use crate::Result;

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(SmartString);

        impl $name {
            pub fn new(id: impl Into<SmartString>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.into())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id.into())
            }
        }
    };
}

id_newtype! {
    /// One multiplexed subscription scope (a document, a project board).
    RoomId
}

id_newtype! {
    /// The thing being viewed: a block, task, or document.
    EntityId
}

id_newtype! {
    /// A collaborator.
    ViewerId
}

// =============================================================================
// Wire messages
// =============================================================================

/// One viewer currently focused on one entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub viewer_id: ViewerId,
    /// Unix millis at which the focus began. A keep-alive touch does not
    /// reset this.
    pub focused_since: u64,
}

/// Aggregated presence keyed by entity. Owned by the authoritative side;
/// clients replace their copy wholesale on every broadcast.
pub type OnlineMap = HashMap<EntityId, Vec<PresenceEntry>>;

/// Client-to-server presence messages. JSON-tagged by `"type"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { room: RoomId },
    Unsubscribe { room: RoomId },
    Focus { entity_id: EntityId },
    Blur { entity_id: EntityId },
    Ping,
}

/// Server-to-client presence messages. JSON-tagged by `"type"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    PresenceState { online: OnlineMap },
    Pong,
}

/// Outbound half of the presence connection. One shared connection per
/// session, multiplexing every room.
#[allow(async_fn_in_trait)]
pub trait PresenceTransport {
    async fn send(&mut self, message: &ClientMessage) -> Result<()>;
}

// =============================================================================
// Channel
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FocusState {
    Focused,
    Blurred,
}

/// Client-side presence state over one transport.
pub struct PresenceChannel<T> {
    transport: T,
    rooms: BTreeSet<RoomId>,
    focused: BTreeMap<EntityId, FocusState>,
    online: Arc<OnlineMap>,
    synced: bool,
}

impl<T: PresenceTransport> PresenceChannel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            rooms: BTreeSet::new(),
            focused: BTreeMap::new(),
            online: Arc::new(OnlineMap::new()),
            synced: false,
        }
    }

    /// Subscribe to a room. Idempotent: an already-subscribed room sends
    /// nothing.
    pub async fn subscribe(&mut self, room: RoomId) -> Result<()> {
        if self.rooms.insert(room.clone()) {
            self.transport.send(&ClientMessage::Subscribe { room }).await?;
        }
        Ok(())
    }

    pub async fn unsubscribe(&mut self, room: &RoomId) -> Result<()> {
        if self.rooms.remove(room) {
            self.transport
                .send(&ClientMessage::Unsubscribe { room: room.clone() })
                .await?;
        }
        Ok(())
    }

    /// Announce focus on an entity. The online map is untouched until the
    /// authoritative broadcast comes back.
    pub async fn focus(&mut self, entity: EntityId) -> Result<()> {
        self.focused.insert(entity.clone(), FocusState::Focused);
        self.transport
            .send(&ClientMessage::Focus { entity_id: entity })
            .await
    }

    pub async fn blur(&mut self, entity: EntityId) -> Result<()> {
        self.focused.insert(entity.clone(), FocusState::Blurred);
        self.transport
            .send(&ClientMessage::Blur { entity_id: entity })
            .await
    }

    /// Heartbeat; the caller drives this on [`crate::PING_INTERVAL`].
    pub async fn ping(&mut self) -> Result<()> {
        self.transport.send(&ClientMessage::Ping).await
    }

    /// Handle one inbound message. `presence_state` replaces the whole map
    /// (copy-on-write: readers holding the previous `Arc` keep a consistent
    /// view).
    pub fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::PresenceState { online } => {
                debug!(entities = online.len(), "presence state replaced");
                self.online = Arc::new(online);
                self.synced = true;
            }
            ServerMessage::Pong => {}
        }
    }

    /// Viewers currently focused on `entity`. Unknown entities yield an
    /// empty list, never an error.
    pub fn viewers(&self, entity: &EntityId) -> &[PresenceEntry] {
        self.online.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Shared read-only view of the whole map.
    pub fn online_map(&self) -> Arc<OnlineMap> {
        Arc::clone(&self.online)
    }

    /// Whether the map reflects a broadcast received on the current
    /// connection.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Connection dropped. Everything held locally is stale; better to show
    /// nobody than to show ghosts.
    pub fn on_disconnected(&mut self) {
        warn!(rooms = self.rooms.len(), "presence transport lost, clearing online map");
        self.online = Arc::new(OnlineMap::new());
        self.synced = false;
    }

    /// Connection re-established. Resubscribes every room and re-announces
    /// focus; the map stays untrusted until a fresh broadcast arrives.
    pub async fn on_connected(&mut self) -> Result<()> {
        for room in self.rooms.clone() {
            self.transport.send(&ClientMessage::Subscribe { room }).await?;
        }
        for (entity, state) in self.focused.clone() {
            if state == FocusState::Focused {
                self.transport
                    .send(&ClientMessage::Focus { entity_id: entity })
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Transport that records every outbound message.
    #[derive(Clone, Default)]
    struct RecordingTransport {
        sent: Rc<RefCell<Vec<ClientMessage>>>,
    }

    impl PresenceTransport for RecordingTransport {
        async fn send(&mut self, message: &ClientMessage) -> Result<()> {
            self.sent.borrow_mut().push(message.clone());
            Ok(())
        }
    }

    fn channel() -> (PresenceChannel<RecordingTransport>, Rc<RefCell<Vec<ClientMessage>>>) {
        let transport = RecordingTransport::default();
        let sent = Rc::clone(&transport.sent);
        (PresenceChannel::new(transport), sent)
    }

    fn state(entries: &[(&str, &str, u64)]) -> ServerMessage {
        let mut online = OnlineMap::new();
        for (entity, viewer, since) in entries {
            online.entry(EntityId::from(*entity)).or_default().push(PresenceEntry {
                viewer_id: ViewerId::from(*viewer),
                focused_since: *since,
            });
        }
        ServerMessage::PresenceState { online }
    }

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let (mut channel, sent) = channel();
        channel.subscribe("doc:1".into()).await.unwrap();
        channel.subscribe("doc:1".into()).await.unwrap();
        assert_eq!(
            *sent.borrow(),
            vec![ClientMessage::Subscribe { room: "doc:1".into() }]
        );
    }

    #[tokio::test]
    async fn unsubscribe_only_when_subscribed() {
        let (mut channel, sent) = channel();
        channel.unsubscribe(&"doc:1".into()).await.unwrap();
        assert!(sent.borrow().is_empty());

        channel.subscribe("doc:1".into()).await.unwrap();
        channel.unsubscribe(&"doc:1".into()).await.unwrap();
        assert_eq!(
            sent.borrow().last(),
            Some(&ClientMessage::Unsubscribe { room: "doc:1".into() })
        );
    }

    #[tokio::test]
    async fn focus_sends_intent_without_touching_the_map() {
        let (mut channel, sent) = channel();
        channel.focus("b1".into()).await.unwrap();
        assert_eq!(
            *sent.borrow(),
            vec![ClientMessage::Focus { entity_id: "b1".into() }]
        );
        // Optimistic presence would show ghosts; wait for the broadcast.
        assert!(channel.viewers(&"b1".into()).is_empty());
        assert!(!channel.is_synced());

        channel.handle_message(state(&[("b1", "alice", 1000)]));
        assert!(channel.is_synced());
        assert_eq!(channel.viewers(&"b1".into()).len(), 1);
    }

    #[tokio::test]
    async fn broadcast_replaces_map_wholesale() {
        let (mut channel, _sent) = channel();
        channel.handle_message(state(&[("b1", "alice", 1000), ("b2", "bob", 2000)]));
        channel.handle_message(state(&[("b2", "bob", 2000)]));

        // b1 vanished with the new broadcast; nothing was merged.
        assert!(channel.viewers(&"b1".into()).is_empty());
        assert_eq!(channel.viewers(&"b2".into()).len(), 1);
    }

    #[tokio::test]
    async fn replayed_broadcast_is_idempotent() {
        let (mut channel, _sent) = channel();
        let broadcast = state(&[("b1", "alice", 1000)]);
        channel.handle_message(broadcast.clone());
        let first = channel.online_map();
        channel.handle_message(broadcast);
        assert_eq!(*channel.online_map(), *first);
    }

    #[tokio::test]
    async fn unknown_entity_yields_empty_list() {
        let (channel, _sent) = channel();
        assert!(channel.viewers(&"nowhere".into()).is_empty());
    }

    #[tokio::test]
    async fn old_map_readers_keep_their_view() {
        let (mut channel, _sent) = channel();
        channel.handle_message(state(&[("b1", "alice", 1000)]));
        let held = channel.online_map();
        channel.handle_message(state(&[]));

        assert!(channel.viewers(&"b1".into()).is_empty());
        assert_eq!(held.get(&"b1".into()).map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn reconnect_clears_resubscribes_and_refocuses() {
        let (mut channel, sent) = channel();
        channel.subscribe("doc:1".into()).await.unwrap();
        channel.subscribe("doc:2".into()).await.unwrap();
        channel.focus("b1".into()).await.unwrap();
        channel.focus("b2".into()).await.unwrap();
        channel.blur("b2".into()).await.unwrap();
        channel.handle_message(state(&[("b1", "me", 1000)]));

        channel.on_disconnected();
        assert!(channel.viewers(&"b1".into()).is_empty());
        assert!(!channel.is_synced());

        sent.borrow_mut().clear();
        channel.on_connected().await.unwrap();
        assert_eq!(
            *sent.borrow(),
            vec![
                ClientMessage::Subscribe { room: "doc:1".into() },
                ClientMessage::Subscribe { room: "doc:2".into() },
                // Only the still-focused entity is re-announced.
                ClientMessage::Focus { entity_id: "b1".into() },
            ]
        );
        // Still untrusted until a fresh broadcast lands.
        assert!(!channel.is_synced());
    }

    #[test]
    fn message_wire_shapes() {
        let focus: ClientMessage =
            serde_json::from_value(serde_json::json!({"type": "focus", "entity_id": "b7"}))
                .unwrap();
        assert_eq!(focus, ClientMessage::Focus { entity_id: "b7".into() });

        assert_eq!(
            serde_json::to_value(ClientMessage::Ping).unwrap(),
            serde_json::json!({"type": "ping"})
        );

        let broadcast: ServerMessage = serde_json::from_value(serde_json::json!({
            "type": "presence_state",
            "online": {"b1": [{"viewer_id": "alice", "focused_since": 1000}]}
        }))
        .unwrap();
        let ServerMessage::PresenceState { online } = broadcast else {
            panic!("expected presence_state");
        };
        assert_eq!(online[&"b1".into()][0].viewer_id, ViewerId::from("alice"));
    }
}
