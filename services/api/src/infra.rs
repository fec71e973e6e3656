use async_trait::async_trait;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use provider_portal::access::{permissions, PermissionChecker, PermissionError, UserId};
use provider_portal::documents::{DocumentError, DocumentStore, StoredDocument};
use provider_portal::registration::{
    Draft, DraftId, DraftStore, DraftStoreError, DraftUpsert, Notification, Notifier,
    Registration, RegistrationNumber, RegistrationRepository, RegistrationStatus,
    RepositoryError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// One draft per user, replaced in place on every upsert.
#[derive(Default)]
pub(crate) struct InMemoryDraftStore {
    drafts: Mutex<HashMap<UserId, Draft>>,
    sequence: AtomicU64,
}

#[async_trait]
impl DraftStore for InMemoryDraftStore {
    async fn upsert(&self, draft: DraftUpsert) -> Result<Draft, DraftStoreError> {
        let mut guard = self.drafts.lock().expect("draft store mutex poisoned");
        let now = Utc::now();
        let stored = match guard.get(&draft.user_id) {
            Some(existing) => Draft {
                payload: draft.payload,
                updated_date: now,
                ..existing.clone()
            },
            None => {
                let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
                Draft {
                    id: DraftId(format!("draft-{id:06}")),
                    user_id: draft.user_id.clone(),
                    payload: draft.payload,
                    created_date: now,
                    updated_date: now,
                }
            }
        };
        guard.insert(stored.user_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn for_user(&self, user_id: &UserId) -> Result<Vec<Draft>, DraftStoreError> {
        let guard = self.drafts.lock().expect("draft store mutex poisoned");
        Ok(guard.get(user_id).cloned().into_iter().collect())
    }
}

/// Registrations kept newest first.
#[derive(Default)]
pub(crate) struct InMemoryRegistrationRepository {
    records: Mutex<Vec<Registration>>,
}

#[async_trait]
impl RegistrationRepository for InMemoryRegistrationRepository {
    async fn insert(&self, registration: Registration) -> Result<Registration, RepositoryError> {
        let mut guard = self.records.lock().expect("registration mutex poisoned");
        if guard
            .iter()
            .any(|record| record.number == registration.number)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(0, registration.clone());
        Ok(registration)
    }

    async fn update(&self, registration: Registration) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("registration mutex poisoned");
        match guard
            .iter_mut()
            .find(|record| record.number == registration.number)
        {
            Some(slot) => {
                *slot = registration;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn fetch(
        &self,
        number: &RegistrationNumber,
    ) -> Result<Option<Registration>, RepositoryError> {
        let guard = self.records.lock().expect("registration mutex poisoned");
        Ok(guard.iter().find(|record| &record.number == number).cloned())
    }

    async fn for_user(&self, user_id: &UserId) -> Result<Vec<Registration>, RepositoryError> {
        let guard = self.records.lock().expect("registration mutex poisoned");
        Ok(guard
            .iter()
            .filter(|record| &record.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn with_status(
        &self,
        status: RegistrationStatus,
        limit: usize,
    ) -> Result<Vec<Registration>, RepositoryError> {
        let guard = self.records.lock().expect("registration mutex poisoned");
        Ok(guard
            .iter()
            .filter(|record| record.status == status)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Grants every review permission to a fixed set of administrators.
#[derive(Debug, Default)]
pub(crate) struct AdminAllowList {
    admins: HashSet<UserId>,
}

impl AdminAllowList {
    pub(crate) fn new(admins: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PermissionChecker for AdminAllowList {
    async fn check(&self, user_id: &UserId, permission: &str) -> Result<bool, PermissionError> {
        let known = matches!(
            permission,
            permissions::REVIEW_REGISTRATIONS | permissions::VIEW_REGISTRATIONS
        );
        Ok(known && self.admins.contains(user_id))
    }
}

/// Uploaded bytes held in memory and served back under `{base_url}/files/{key}`.
pub(crate) struct InMemoryDocumentStore {
    base_url: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryDocumentStore {
    pub(crate) fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .expect("document mutex poisoned")
            .get(key)
            .cloned()
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/files/{}", self.base_url, key)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<StoredDocument, DocumentError> {
        let filename = key.rsplit('/').next().unwrap_or(key).to_string();
        self.objects
            .lock()
            .expect("document mutex poisoned")
            .insert(key.to_string(), bytes);
        Ok(StoredDocument {
            filename,
            url: self.url_for(key),
        })
    }

    async fn url(&self, key: &str) -> Result<String, DocumentError> {
        let guard = self.objects.lock().expect("document mutex poisoned");
        if guard.contains_key(key) {
            Ok(self.url_for(key))
        } else {
            Err(DocumentError::NotFound(key.to_string()))
        }
    }
}

/// Keeps every toast so the CLI can print them after a replay.
#[derive(Debug, Default)]
pub(crate) struct CollectingNotifier {
    events: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    pub(crate) fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notification: Notification) {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
    }
}
