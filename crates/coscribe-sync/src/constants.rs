//! Sync tuning constants.
//!
//! These are configuration, not protocol contract; deployments tune them
//! through [`SyncConfig`].

use std::time::Duration;

/// Idle period after which a pending edit batch is flushed.
pub const DEFAULT_QUIESCENCE_WINDOW: Duration = Duration::from_millis(300);

/// Total attempts for one logical send, first try included.
pub const DEFAULT_SEND_ATTEMPTS: u32 = 3;

/// First retry delay; doubles per attempt.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(250);

/// Retry delay ceiling.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Presence entries untouched for this long are expired by the hub.
pub const DEFAULT_PRESENCE_TTL: Duration = Duration::from_secs(60);

/// Heartbeat interval for presence transports.
pub const PING_INTERVAL: Duration = Duration::from_secs(20);

/// Per-session sync tunables.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub quiescence_window: Duration,
    pub send_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            quiescence_window: DEFAULT_QUIESCENCE_WINDOW,
            send_attempts: DEFAULT_SEND_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}
