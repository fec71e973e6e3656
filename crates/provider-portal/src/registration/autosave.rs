//! Debounced draft autosave.
//!
//! Every edit hands the full payload to [`DraftSyncController::save_draft`]. Only the last
//! payload inside the debounce window is sent to the [`DraftStore`]; earlier ones are
//! dropped, never queued. A fired upsert runs to completion even if the user keeps typing,
//! so two bursts can be in flight at once and their responses may arrive out of order.
//! [`ResponseOrdering`] decides whether such a stale response may still update the cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::draft::{Draft, DraftCache, DraftId, DraftStore, DraftStoreError, DraftUpsert};
use super::values::FormValues;
use crate::access::{IdentityProvider, UserId};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// How upsert responses are applied to the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseOrdering {
    /// Apply every response as it arrives; the last response to land wins.
    #[default]
    ArrivalOrder,
    /// Number each fired upsert and ignore responses older than one already applied.
    Sequenced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveSettings {
    pub debounce: Duration,
    pub ordering: ResponseOrdering,
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            ordering: ResponseOrdering::default(),
        }
    }
}

/// Transient, user-visible outcome of an autosave attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    DraftSaved { draft_id: DraftId },
    DraftFailed { message: String },
}

/// Toast sink for autosave outcomes.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

#[derive(Debug, thiserror::Error)]
pub enum AutosaveError {
    #[error("no authenticated user; draft not saved")]
    MissingIdentity,
    #[error(transparent)]
    Store(#[from] DraftStoreError),
}

const MISSING_IDENTITY_MESSAGE: &str = "Sign in again to keep saving your registration";

/// The payload waiting for its window to close, tagged with the generation of the save
/// that queued it. Every save and flush bumps the generation under the same lock, so a
/// timer can only take the payload its own save queued.
#[derive(Debug, Default)]
struct PendingSave {
    generation: u64,
    upsert: Option<DraftUpsert>,
}

impl PendingSave {
    fn replace(&mut self, upsert: DraftUpsert) -> u64 {
        self.generation += 1;
        self.upsert = Some(upsert);
        self.generation
    }

    fn take_if_current(&mut self, generation: u64) -> Option<DraftUpsert> {
        if self.generation == generation {
            self.upsert.take()
        } else {
            None
        }
    }

    fn take(&mut self) -> Option<DraftUpsert> {
        self.generation += 1;
        self.upsert.take()
    }
}

struct SyncState<S, I, N> {
    store: Arc<S>,
    identity: Arc<I>,
    notifier: Arc<N>,
    cache: DraftCache,
    settings: AutosaveSettings,
    pending: Mutex<PendingSave>,
    fired: AtomicU64,
    applied: AtomicU64,
}

/// Debounced, identity-scoped draft writer. Clones share the same timer and cache.
pub struct DraftSyncController<S, I, N> {
    state: Arc<SyncState<S, I, N>>,
}

impl<S, I, N> Clone for DraftSyncController<S, I, N> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<S, I, N> DraftSyncController<S, I, N>
where
    S: DraftStore + 'static,
    I: IdentityProvider + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<S>,
        identity: Arc<I>,
        notifier: Arc<N>,
        cache: DraftCache,
        settings: AutosaveSettings,
    ) -> Self {
        Self {
            state: Arc::new(SyncState {
                store,
                identity,
                notifier,
                cache,
                settings,
                pending: Mutex::new(PendingSave::default()),
                fired: AtomicU64::new(0),
                applied: AtomicU64::new(0),
            }),
        }
    }

    pub fn cache(&self) -> &DraftCache {
        &self.state.cache
    }

    pub fn settings(&self) -> AutosaveSettings {
        self.state.settings
    }

    /// Whether a payload is waiting for its debounce window to close.
    pub fn has_pending(&self) -> bool {
        self.state
            .pending
            .lock()
            .expect("autosave mutex poisoned")
            .upsert
            .is_some()
    }

    fn require_user(&self) -> Result<UserId, AutosaveError> {
        match self.state.identity.current_user() {
            Some(user_id) => Ok(user_id),
            None => {
                self.state.notifier.notify(Notification::DraftFailed {
                    message: MISSING_IDENTITY_MESSAGE.to_string(),
                });
                Err(AutosaveError::MissingIdentity)
            }
        }
    }

    /// Schedule `payload` to be saved once no further edit arrives for the debounce
    /// window. Must be called from within a Tokio runtime.
    pub fn save_draft(&self, payload: FormValues) -> Result<(), AutosaveError> {
        let user_id = self.require_user()?;
        let upsert = DraftUpsert { user_id, payload };

        let generation = self
            .state
            .pending
            .lock()
            .expect("autosave mutex poisoned")
            .replace(upsert);

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::time::sleep(state.settings.debounce).await;
            let upsert = state
                .pending
                .lock()
                .expect("autosave mutex poisoned")
                .take_if_current(generation);
            if let Some(upsert) = upsert {
                let _ = fire(&state, upsert).await;
            }
        });

        Ok(())
    }

    /// Send the pending payload now instead of waiting for the window to close.
    pub async fn flush(&self) -> Result<Option<Draft>, AutosaveError> {
        let upsert = self
            .state
            .pending
            .lock()
            .expect("autosave mutex poisoned")
            .take();
        match upsert {
            Some(upsert) => Ok(Some(fire(&self.state, upsert).await?)),
            None => Ok(None),
        }
    }

    /// Load the signed-in user's drafts into the cache and return the most recent one.
    pub async fn restore(&self) -> Result<Option<Draft>, AutosaveError> {
        let user_id = self.require_user()?;
        let drafts = self.state.store.for_user(&user_id).await?;
        let latest = drafts.first().cloned();
        self.state.cache.hydrate(drafts);
        Ok(latest)
    }
}

async fn fire<S, I, N>(
    state: &SyncState<S, I, N>,
    upsert: DraftUpsert,
) -> Result<Draft, DraftStoreError>
where
    S: DraftStore,
    N: Notifier,
{
    let sequence = state.fired.fetch_add(1, Ordering::SeqCst) + 1;
    let user_id = upsert.user_id.clone();
    debug!(%user_id, sequence, "sending draft upsert");

    match state.store.upsert(upsert).await {
        Ok(draft) => {
            let stale = state.settings.ordering == ResponseOrdering::Sequenced
                && state.applied.fetch_max(sequence, Ordering::SeqCst) > sequence;
            if stale {
                debug!(%user_id, sequence, "ignoring out-of-order draft response");
            } else {
                state.cache.prepend(draft.clone());
            }
            info!(%user_id, draft_id = %draft.id.0, sequence, "draft saved");
            state.notifier.notify(Notification::DraftSaved {
                draft_id: draft.id.clone(),
            });
            Ok(draft)
        }
        Err(err) => {
            warn!(%user_id, sequence, error = %err, "draft autosave failed");
            state.notifier.notify(Notification::DraftFailed {
                message: format!("Could not save your draft: {err}"),
            });
            Err(err)
        }
    }
}
