//! Sync client — delivers patch requests to the authoritative store.
//!
//! Wraps a transport endpoint with bounded exponential backoff. Only
//! transport failures are retried; a version conflict means the document
//! moved and blind retries can never succeed, so it is surfaced distinctly
//! for the session to rebase on, and validation rejections are surfaced
//! verbatim.

use coscribe_model::{PatchRequest, PatchResponse, TreeSnapshot};
use tracing::{debug, warn};

use crate::{Result, SyncConfig, SyncError};

/// Transport to the authoritative document store.
///
/// Implementations return `Err` only for transport failures; protocol-level
/// rejection (conflict, validation) travels inside [`PatchResponse`].
#[allow(async_fn_in_trait)]
pub trait DocumentEndpoint {
    /// Submit one patch request for atomic application.
    async fn submit(&mut self, request: &PatchRequest) -> Result<PatchResponse>;

    /// Fetch the full authoritative tree and its version.
    async fn fetch_latest(&mut self) -> Result<(TreeSnapshot, u64)>;
}

/// Retrying client over a [`DocumentEndpoint`].
pub struct SyncClient<E> {
    endpoint: E,
    config: SyncConfig,
}

impl<E: DocumentEndpoint> SyncClient<E> {
    pub fn new(endpoint: E, config: SyncConfig) -> Self {
        Self { endpoint, config }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut E {
        &mut self.endpoint
    }

    /// Send one patch request and map the verdict.
    ///
    /// Returns the new version on success. Transport failures are retried
    /// with exponential backoff up to the configured attempt count.
    pub async fn send(&mut self, request: &PatchRequest) -> Result<u64> {
        let mut attempt = 1;
        let mut delay = self.config.initial_backoff;
        loop {
            match self.endpoint.submit(request).await {
                Ok(PatchResponse::Applied { version }) => return Ok(version),
                Ok(PatchResponse::Conflict { current_version }) => {
                    return Err(SyncError::VersionConflict {
                        current: current_version,
                    });
                }
                Ok(PatchResponse::ValidationError { index, message }) => {
                    return Err(SyncError::Validation { index, message });
                }
                Err(SyncError::Transport(reason)) => {
                    if attempt >= self.config.send_attempts {
                        warn!(%reason, attempt, "submit failed, retries exhausted");
                        return Err(SyncError::Transport(reason));
                    }
                    debug!(%reason, attempt, delay_ms = delay.as_millis() as u64, "submit failed, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    delay = (delay * 2).min(self.config.max_backoff);
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Fetch the authoritative tree, with the same retry policy as `send`.
    /// Used for initial load, conflict recovery, and explicit refresh.
    pub async fn fetch_latest(&mut self) -> Result<(TreeSnapshot, u64)> {
        let mut attempt = 1;
        let mut delay = self.config.initial_backoff;
        loop {
            match self.endpoint.fetch_latest().await {
                Ok(latest) => return Ok(latest),
                Err(SyncError::Transport(reason)) => {
                    if attempt >= self.config.send_attempts {
                        warn!(%reason, attempt, "fetch failed, retries exhausted");
                        return Err(SyncError::Transport(reason));
                    }
                    debug!(%reason, attempt, delay_ms = delay.as_millis() as u64, "fetch failed, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    delay = (delay * 2).min(self.config.max_backoff);
                }
                Err(other) => return Err(other),
            }
        }
    }
}
