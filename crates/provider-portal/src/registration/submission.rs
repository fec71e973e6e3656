use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use super::draft::{DraftStore, DraftStoreError};
use super::rules::RuleSet;
use super::values::{FormErrors, FormValues};
use crate::access::{permissions, require_permission, PermissionChecker, PermissionError, UserId};

/// Human facing registration number, e.g. `REG-000042`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationNumber(pub String);

impl fmt::Display for RegistrationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
    Acknowledged,
}

impl RegistrationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "Pending",
            RegistrationStatus::Approved => "Approved",
            RegistrationStatus::Rejected => "Rejected",
            RegistrationStatus::Acknowledged => "Acknowledged",
        }
    }

    /// Review moves a pending registration to a decision; approved registrations are
    /// then acknowledged. Nothing leaves `Rejected` or `Acknowledged`.
    pub fn can_transition_to(&self, next: RegistrationStatus) -> bool {
        matches!(
            (self, next),
            (RegistrationStatus::Pending, RegistrationStatus::Approved)
                | (RegistrationStatus::Pending, RegistrationStatus::Rejected)
                | (RegistrationStatus::Approved, RegistrationStatus::Acknowledged)
        )
    }
}

/// Finalized submission built from a user's draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub number: RegistrationNumber,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub payload: FormValues,
    pub status: RegistrationStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Storage abstraction for submitted registrations. `for_user` returns the most recent
/// registration first.
#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    async fn insert(&self, registration: Registration) -> Result<Registration, RepositoryError>;
    async fn update(&self, registration: Registration) -> Result<(), RepositoryError>;
    async fn fetch(
        &self,
        number: &RegistrationNumber,
    ) -> Result<Option<Registration>, RepositoryError>;
    async fn for_user(&self, user_id: &UserId) -> Result<Vec<Registration>, RepositoryError>;
    async fn with_status(
        &self,
        status: RegistrationStatus,
        limit: usize,
    ) -> Result<Vec<Registration>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("no saved draft to submit")]
    NoDraft,
    #[error("draft has {} invalid field(s)", .errors.len())]
    Incomplete { errors: FormErrors },
    #[error("registration {number} is already on file")]
    AlreadySubmitted { number: RegistrationNumber },
    #[error("registration {0} not found")]
    NotFound(RegistrationNumber),
    #[error("cannot move registration from {} to {}", .from.label(), .to.label())]
    InvalidTransition {
        from: RegistrationStatus,
        to: RegistrationStatus,
    },
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error(transparent)]
    Drafts(#[from] DraftStoreError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Service turning drafts into registrations and applying administrator review.
pub struct RegistrationService<D, R, P> {
    drafts: Arc<D>,
    registrations: Arc<R>,
    permissions: Arc<P>,
    rules: RuleSet,
    sequence: AtomicU64,
    /// One lock per user with a submission in progress; removed once the last holder leaves.
    submitting: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl<D, R, P> RegistrationService<D, R, P>
where
    D: DraftStore + 'static,
    R: RegistrationRepository + 'static,
    P: PermissionChecker + 'static,
{
    pub fn new(drafts: Arc<D>, registrations: Arc<R>, permissions: Arc<P>, rules: RuleSet) -> Self {
        Self {
            drafts,
            registrations,
            permissions,
            rules,
            sequence: AtomicU64::new(1),
            submitting: Mutex::new(HashMap::new()),
        }
    }

    fn next_number(&self) -> RegistrationNumber {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        RegistrationNumber(format!("REG-{id:06}"))
    }

    fn submit_lock(&self, user_id: &UserId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.submitting.lock().expect("submission mutex poisoned");
        Arc::clone(locks.entry(user_id.clone()).or_default())
    }

    fn release_submit_lock(&self, user_id: &UserId, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self.submitting.lock().expect("submission mutex poisoned");
        if Arc::strong_count(&lock) == 2 {
            locks.remove(user_id);
        }
    }

    /// Submit the user's most recent draft. A user may resubmit only after a rejection.
    /// Submissions for the same user run one at a time, so the duplicate check and the
    /// insert cannot interleave.
    pub async fn submit(&self, user_id: &UserId) -> Result<Registration, RegistrationError> {
        let lock = self.submit_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.submit_exclusive(user_id).await
        };
        self.release_submit_lock(user_id, lock);
        result
    }

    async fn submit_exclusive(&self, user_id: &UserId) -> Result<Registration, RegistrationError> {
        if let Some(existing) = self.latest_for_user(user_id).await? {
            if existing.status != RegistrationStatus::Rejected {
                return Err(RegistrationError::AlreadySubmitted {
                    number: existing.number,
                });
            }
        }

        let draft = self
            .drafts
            .for_user(user_id)
            .await?
            .into_iter()
            .next()
            .ok_or(RegistrationError::NoDraft)?;

        let errors = self.rules.validate(&draft.payload);
        if !errors.is_empty() {
            return Err(RegistrationError::Incomplete { errors });
        }

        let registration = Registration {
            number: self.next_number(),
            user_id: user_id.clone(),
            payload: draft.payload,
            status: RegistrationStatus::Pending,
            submitted_at: Utc::now(),
            reviewed_by: None,
            reviewed_at: None,
        };

        let stored = self.registrations.insert(registration).await?;
        info!(%user_id, number = %stored.number, "registration submitted");
        Ok(stored)
    }

    /// Most recent registration on file for the user.
    pub async fn latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Registration>, RegistrationError> {
        Ok(self.registrations.for_user(user_id).await?.into_iter().next())
    }

    /// Registrations awaiting review, for administrators.
    pub async fn pending(
        &self,
        reviewer: &UserId,
        limit: usize,
    ) -> Result<Vec<Registration>, RegistrationError> {
        require_permission(
            self.permissions.as_ref(),
            reviewer,
            permissions::VIEW_REGISTRATIONS,
        )
        .await?;
        Ok(self
            .registrations
            .with_status(RegistrationStatus::Pending, limit)
            .await?)
    }

    /// Apply an administrator's status decision.
    pub async fn review(
        &self,
        reviewer: &UserId,
        number: &RegistrationNumber,
        status: RegistrationStatus,
    ) -> Result<Registration, RegistrationError> {
        require_permission(
            self.permissions.as_ref(),
            reviewer,
            permissions::REVIEW_REGISTRATIONS,
        )
        .await?;

        let mut registration = self
            .registrations
            .fetch(number)
            .await?
            .ok_or_else(|| RegistrationError::NotFound(number.clone()))?;

        if !registration.status.can_transition_to(status) {
            return Err(RegistrationError::InvalidTransition {
                from: registration.status,
                to: status,
            });
        }

        registration.status = status;
        registration.reviewed_by = Some(reviewer.clone());
        registration.reviewed_at = Some(Utc::now());
        self.registrations.update(registration.clone()).await?;

        info!(
            %reviewer,
            %number,
            status = status.label(),
            "registration reviewed"
        );
        Ok(registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_review_flow() {
        use RegistrationStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Acknowledged));
        assert!(!Pending.can_transition_to(Acknowledged));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Acknowledged.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Approved));
    }

    #[test]
    fn status_serializes_as_label() {
        let raw = serde_json::to_string(&RegistrationStatus::Acknowledged).expect("serializes");
        assert_eq!(raw, "\"Acknowledged\"");
    }

    #[test]
    fn invalid_transition_message_names_both_states() {
        let err = RegistrationError::InvalidTransition {
            from: RegistrationStatus::Rejected,
            to: RegistrationStatus::Approved,
        };
        assert_eq!(err.to_string(), "cannot move registration from Rejected to Approved");
    }
}
