use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use crate::access::{PermissionChecker, PermissionError, UserId};
use crate::registration::draft::{Draft, DraftId, DraftStore, DraftStoreError, DraftUpsert};
use crate::registration::form::{provider_registration_rules, provider_registration_steps};
use crate::registration::router::PortalState;
use crate::registration::submission::{
    Registration, RegistrationNumber, RegistrationRepository, RegistrationService,
    RegistrationStatus, RepositoryError,
};
use crate::registration::values::FormValues;

#[derive(Default)]
pub(super) struct MemoryDrafts {
    drafts: Mutex<HashMap<UserId, Draft>>,
}

#[async_trait]
impl DraftStore for MemoryDrafts {
    async fn upsert(&self, draft: DraftUpsert) -> Result<Draft, DraftStoreError> {
        let mut guard = self.drafts.lock().unwrap();
        let now = Utc::now();
        let stored = match guard.get(&draft.user_id) {
            Some(existing) => Draft {
                payload: draft.payload,
                updated_date: now,
                ..existing.clone()
            },
            None => Draft {
                id: DraftId(format!("draft-{}", draft.user_id)),
                user_id: draft.user_id.clone(),
                payload: draft.payload,
                created_date: now,
                updated_date: now,
            },
        };
        guard.insert(stored.user_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn for_user(&self, user_id: &UserId) -> Result<Vec<Draft>, DraftStoreError> {
        let guard = self.drafts.lock().unwrap();
        Ok(guard.get(user_id).cloned().into_iter().collect())
    }
}

pub(super) struct OfflineDrafts;

#[async_trait]
impl DraftStore for OfflineDrafts {
    async fn upsert(&self, _: DraftUpsert) -> Result<Draft, DraftStoreError> {
        Err(DraftStoreError::Unavailable("graphql endpoint timed out".to_string()))
    }

    async fn for_user(&self, _: &UserId) -> Result<Vec<Draft>, DraftStoreError> {
        Err(DraftStoreError::Unavailable("graphql endpoint timed out".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryRegistrations {
    records: Mutex<Vec<Registration>>,
}

#[async_trait]
impl RegistrationRepository for MemoryRegistrations {
    async fn insert(&self, registration: Registration) -> Result<Registration, RepositoryError> {
        tokio::task::yield_now().await;
        let mut guard = self.records.lock().unwrap();
        if guard.iter().any(|r| r.number == registration.number) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(0, registration.clone());
        Ok(registration)
    }

    async fn update(&self, registration: Registration) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().unwrap();
        let slot = guard
            .iter_mut()
            .find(|r| r.number == registration.number)
            .ok_or(RepositoryError::NotFound)?;
        *slot = registration;
        Ok(())
    }

    async fn fetch(
        &self,
        number: &RegistrationNumber,
    ) -> Result<Option<Registration>, RepositoryError> {
        let guard = self.records.lock().unwrap();
        Ok(guard.iter().find(|r| &r.number == number).cloned())
    }

    async fn for_user(&self, user_id: &UserId) -> Result<Vec<Registration>, RepositoryError> {
        tokio::task::yield_now().await;
        let guard = self.records.lock().unwrap();
        Ok(guard.iter().filter(|r| &r.user_id == user_id).cloned().collect())
    }

    async fn with_status(
        &self,
        status: RegistrationStatus,
        limit: usize,
    ) -> Result<Vec<Registration>, RepositoryError> {
        let guard = self.records.lock().unwrap();
        Ok(guard
            .iter()
            .filter(|r| r.status == status)
            .take(limit)
            .cloned()
            .collect())
    }
}

pub(super) struct Grants(HashSet<(String, String)>);

impl Grants {
    pub(super) fn admin(user: &str) -> Self {
        Self(HashSet::from([
            (user.to_string(), "registrations:review".to_string()),
            (user.to_string(), "registrations:view".to_string()),
        ]))
    }
}

#[async_trait]
impl PermissionChecker for Grants {
    async fn check(&self, user_id: &UserId, permission: &str) -> Result<bool, PermissionError> {
        Ok(self.0.contains(&(user_id.0.clone(), permission.to_string())))
    }
}

pub(super) const PROVIDER: &str = "prov-100";
pub(super) const ADMIN: &str = "admin-1";

pub(super) type TestService = RegistrationService<MemoryDrafts, MemoryRegistrations, Grants>;

pub(super) fn build_service() -> (Arc<TestService>, Arc<MemoryDrafts>, Arc<MemoryRegistrations>) {
    let drafts = Arc::new(MemoryDrafts::default());
    let registrations = Arc::new(MemoryRegistrations::default());
    let service = Arc::new(RegistrationService::new(
        drafts.clone(),
        registrations.clone(),
        Arc::new(Grants::admin(ADMIN)),
        provider_registration_rules(),
    ));
    (service, drafts, registrations)
}

pub(super) fn build_state() -> (
    PortalState<MemoryDrafts, MemoryRegistrations, Grants>,
    Arc<MemoryDrafts>,
) {
    let (service, drafts, _) = build_service();
    let state = PortalState {
        steps: Arc::new(provider_registration_steps()),
        rules: Arc::new(provider_registration_rules()),
        drafts: drafts.clone(),
        registrations: service,
    };
    (state, drafts)
}

pub(super) fn complete_payload() -> FormValues {
    match json!({
        "provider_Name": "Lakeside Home Care",
        "provider_Type": "home_health_agency",
        "npi_Number": "1234567893",
        "tax_Id": "123456789",
        "first_Name": "Ada",
        "last_Name": "Okafor",
        "email": "ada@lakeside.example",
        "phone_Number": "5155550100",
        "address": {
            "street": "100 Court Ave",
            "city": "Des Moines",
            "state": "IA",
            "zip_Code": "50309"
        },
        "service_Counties": ["Polk", "Dallas"],
        "service_Types": ["skilled_nursing"],
        "bank": {
            "bank_Name": "First Federal",
            "account_Type": "checking",
            "account_Number": "00012345",
            "routing_Number": "073000228"
        },
        "w9_Document": "providers/prov-100/w9/w9.pdf",
        "license_Document": "providers/prov-100/license/license.pdf",
        "insurance_Document": "providers/prov-100/insurance/coi.pdf"
    }) {
        Value::Object(map) => FormValues(map),
        _ => unreachable!("fixture is an object"),
    }
}

pub(super) async fn seed_draft(drafts: &MemoryDrafts, user: &str, payload: FormValues) {
    drafts
        .upsert(DraftUpsert {
            user_id: UserId::from(user),
            payload,
        })
        .await
        .expect("draft stored");
}

pub(super) async fn read_json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
