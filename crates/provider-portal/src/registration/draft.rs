use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::values::FormValues;
use crate::access::UserId;

/// Server assigned identifier of a stored draft.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(pub String);

/// Registration payload as last saved for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: DraftId,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub payload: FormValues,
    #[serde(rename = "created_Date")]
    pub created_date: DateTime<Utc>,
    #[serde(rename = "updated_Date")]
    pub updated_date: DateTime<Utc>,
}

/// Upsert request: the edited payload merged with the owner's identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftUpsert {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub payload: FormValues,
}

/// Persistence backend for drafts. Implementations keep one draft per user and return
/// drafts most recent first.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn upsert(&self, draft: DraftUpsert) -> Result<Draft, DraftStoreError>;
    async fn for_user(&self, user_id: &UserId) -> Result<Vec<Draft>, DraftStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DraftStoreError {
    #[error("draft backend rejected the request: {0}")]
    Rejected(String),
    #[error("draft backend unavailable: {0}")]
    Unavailable(String),
}

/// Client-side list of drafts returned by upserts, newest first. Entries are not
/// deduplicated, so repeated saves of the same draft appear repeatedly.
#[derive(Debug, Clone, Default)]
pub struct DraftCache {
    entries: Arc<Mutex<Vec<Draft>>>,
}

impl DraftCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prepend(&self, draft: Draft) {
        let mut guard = self.entries.lock().expect("draft cache mutex poisoned");
        guard.insert(0, draft);
    }

    /// Replace the cache contents, e.g. after loading drafts from the store.
    pub fn hydrate(&self, drafts: Vec<Draft>) {
        *self.entries.lock().expect("draft cache mutex poisoned") = drafts;
    }

    pub fn latest(&self) -> Option<Draft> {
        self.entries
            .lock()
            .expect("draft cache mutex poisoned")
            .first()
            .cloned()
    }

    pub fn snapshot(&self) -> Vec<Draft> {
        self.entries.lock().expect("draft cache mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("draft cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
