//! Autosave scenarios driven the way the registration page drives them: every keystroke
//! updates the form state and hands the whole payload to the sync controller.

mod common {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;

    use provider_portal::access::{StaticIdentity, UserId};
    use provider_portal::registration::{
        AutosaveSettings, Draft, DraftCache, DraftId, DraftStore, DraftStoreError,
        DraftSyncController, DraftUpsert, Notification, Notifier,
    };

    #[derive(Default)]
    pub(super) struct RecordingStore {
        pub(super) upserts: Mutex<Vec<DraftUpsert>>,
        drafts: Mutex<HashMap<UserId, Draft>>,
    }

    #[async_trait]
    impl DraftStore for RecordingStore {
        async fn upsert(&self, draft: DraftUpsert) -> Result<Draft, DraftStoreError> {
            self.upserts.lock().unwrap().push(draft.clone());
            let mut guard = self.drafts.lock().unwrap();
            let now = Utc::now();
            let created = guard
                .get(&draft.user_id)
                .map(|existing| existing.created_date)
                .unwrap_or(now);
            let stored = Draft {
                id: DraftId(format!("draft-{}", draft.user_id)),
                user_id: draft.user_id.clone(),
                payload: draft.payload,
                created_date: created,
                updated_date: now,
            };
            guard.insert(draft.user_id, stored.clone());
            Ok(stored)
        }

        async fn for_user(&self, user_id: &UserId) -> Result<Vec<Draft>, DraftStoreError> {
            Ok(self
                .drafts
                .lock()
                .unwrap()
                .get(user_id)
                .cloned()
                .into_iter()
                .collect())
        }
    }

    #[derive(Default)]
    pub(super) struct Toasts(pub(super) Mutex<Vec<Notification>>);

    impl Notifier for Toasts {
        fn notify(&self, notification: Notification) {
            self.0.lock().unwrap().push(notification);
        }
    }

    pub(super) type Controller = DraftSyncController<RecordingStore, StaticIdentity, Toasts>;

    pub(super) fn controller(
        store: Arc<RecordingStore>,
        toasts: Arc<Toasts>,
        user: Option<&str>,
    ) -> Controller {
        DraftSyncController::new(
            store,
            Arc::new(StaticIdentity(user.map(UserId::from))),
            toasts,
            DraftCache::new(),
            AutosaveSettings::default(),
        )
    }
}

use std::sync::Arc;
use std::time::Duration;

use common::*;
use provider_portal::registration::{
    provider_registration_rules, AutosaveError, FormState, FormValues, Notification,
};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn typing_a_name_sends_one_upsert() {
    let store = Arc::new(RecordingStore::default());
    let toasts = Arc::new(Toasts::default());
    let sync = controller(store.clone(), toasts.clone(), Some("prov-100"));
    let mut form = FormState::with_rules(FormValues::new(), provider_registration_rules());

    let mut typed = String::new();
    for ch in "Lakeside".chars() {
        typed.push(ch);
        form.set_value("provider_Name", json!(typed));
        sync.save_draft(form.values().clone()).expect("queued");
        tokio::time::sleep(Duration::from_millis(120)).await;
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    let upserts = store.upserts.lock().unwrap().clone();
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].payload.0["provider_Name"], json!("Lakeside"));
    assert_eq!(toasts.0.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn three_calls_inside_the_window_send_the_last_payload() {
    let store = Arc::new(RecordingStore::default());
    let toasts = Arc::new(Toasts::default());
    let sync = controller(store.clone(), toasts, Some("prov-100"));

    for step in ["a", "ab", "abc"] {
        let mut values = FormValues::new();
        values.set("first_Name", json!(step));
        sync.save_draft(values).expect("queued");
    }
    tokio::time::sleep(Duration::from_millis(1001)).await;

    let upserts = store.upserts.lock().unwrap().clone();
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].payload.0["first_Name"], json!("abc"));
}

#[tokio::test(start_paused = true)]
async fn signed_out_user_gets_a_toast_and_no_request() {
    let store = Arc::new(RecordingStore::default());
    let toasts = Arc::new(Toasts::default());
    let sync = controller(store.clone(), toasts.clone(), None);

    let result = sync.save_draft(FormValues::new());
    assert!(matches!(result, Err(AutosaveError::MissingIdentity)));
    assert!(matches!(sync.restore().await, Err(AutosaveError::MissingIdentity)));
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(store.upserts.lock().unwrap().is_empty());
    let toasts = toasts.0.lock().unwrap();
    assert_eq!(toasts.len(), 2);
    assert!(toasts
        .iter()
        .all(|toast| matches!(toast, Notification::DraftFailed { .. })));
}

#[tokio::test(start_paused = true)]
async fn restore_returns_the_saved_draft() {
    let store = Arc::new(RecordingStore::default());
    let toasts = Arc::new(Toasts::default());
    let writer = controller(store.clone(), toasts.clone(), Some("prov-100"));

    let mut values = FormValues::new();
    values.set("address.city", json!("Des Moines"));
    writer.save_draft(values.clone()).expect("queued");
    writer.flush().await.expect("flushed");

    let reader = controller(store, toasts, Some("prov-100"));
    let restored = reader
        .restore()
        .await
        .expect("restore succeeds")
        .expect("draft on file");
    assert_eq!(restored.payload, values);
    assert_eq!(reader.cache().len(), 1);
}
