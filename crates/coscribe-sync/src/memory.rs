//! In-memory authority — a version-gated document plus presence hub behind
//! the endpoint trait.
//!
//! Stands in for the real server in tests and single-process setups. It
//! serializes submissions (one `&mut` caller at a time), assigns versions,
//! and drops presence entries for cascade-deleted blocks, which is exactly
//! the contract a remote authority provides.

use std::cell::RefCell;
use std::rc::Rc;

use coscribe_model::{Document, PatchError, PatchRequest, PatchResponse, TreeSnapshot};
use tracing::debug;

use crate::{DocumentEndpoint, EntityId, PresenceHub, Result, SyncError};

pub struct InMemoryAuthority {
    document: Document,
    presence: PresenceHub,
    fail_next_submits: u32,
}

impl InMemoryAuthority {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            presence: PresenceHub::default(),
            fail_next_submits: 0,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn presence(&self) -> &PresenceHub {
        &self.presence
    }

    pub fn presence_mut(&mut self) -> &mut PresenceHub {
        &mut self.presence
    }

    /// Fail the next `n` submissions with a transport error.
    pub fn fail_next_submits(&mut self, n: u32) {
        self.fail_next_submits = n;
    }

    /// Apply one request under the authority's serialization and map the
    /// outcome onto the wire verdict.
    pub fn apply(&mut self, request: &PatchRequest) -> PatchResponse {
        match self.document.apply(request) {
            Ok(applied) => {
                if !applied.removed.is_empty() {
                    let entities: Vec<EntityId> = applied
                        .removed
                        .iter()
                        .map(|id| EntityId::from(id.as_str()))
                        .collect();
                    self.presence.drop_entities(&entities);
                }
                debug!(version = applied.version, "request applied");
                PatchResponse::Applied {
                    version: applied.version,
                }
            }
            Err(PatchError::VersionConflict { current }) => {
                PatchResponse::Conflict {
                    current_version: current,
                }
            }
            Err(PatchError::Validation { index, source }) => PatchResponse::ValidationError {
                index,
                message: source.to_string(),
            },
        }
    }

    fn take_injected_failure(&mut self) -> Option<SyncError> {
        if self.fail_next_submits > 0 {
            self.fail_next_submits -= 1;
            Some(SyncError::Transport("injected failure".into()))
        } else {
            None
        }
    }
}

impl DocumentEndpoint for InMemoryAuthority {
    async fn submit(&mut self, request: &PatchRequest) -> Result<PatchResponse> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        Ok(self.apply(request))
    }

    async fn fetch_latest(&mut self) -> Result<(TreeSnapshot, u64)> {
        Ok((self.document.snapshot(), self.document.version()))
    }
}

/// Shared handle letting several single-threaded sessions talk to one
/// authority.
#[derive(Clone)]
pub struct SharedAuthority(Rc<RefCell<InMemoryAuthority>>);

impl SharedAuthority {
    pub fn new(authority: InMemoryAuthority) -> Self {
        Self(Rc::new(RefCell::new(authority)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut InMemoryAuthority) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

impl DocumentEndpoint for SharedAuthority {
    async fn submit(&mut self, request: &PatchRequest) -> Result<PatchResponse> {
        let mut authority = self.0.borrow_mut();
        if let Some(err) = authority.take_injected_failure() {
            return Err(err);
        }
        Ok(authority.apply(request))
    }

    async fn fetch_latest(&mut self) -> Result<(TreeSnapshot, u64)> {
        let authority = self.0.borrow();
        Ok((authority.document.snapshot(), authority.document.version()))
    }
}
