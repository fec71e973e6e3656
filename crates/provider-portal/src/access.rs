//! Caller identity and permission gating for administrator-only operations.

use std::fmt;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Header carrying the identity resolved by the upstream authentication layer.
pub const USER_HEADER: &str = "x-user-id";

/// Identifier of an authenticated portal user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Resolves the signed-in user, if authentication has completed.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
}

/// Fixed identity, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(pub Option<UserId>);

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.0.clone()
    }
}

/// Extractor for the authenticated caller; rejects with 401 when the header is absent.
#[derive(Debug, Clone)]
pub struct CallerId(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match caller {
            Some(user_id) => Ok(CallerId(UserId(user_id.to_string()))),
            None => {
                let payload = json!({ "error": format!("missing {USER_HEADER} header") });
                Err((StatusCode::UNAUTHORIZED, Json(payload)).into_response())
            }
        }
    }
}

/// Permission names checked against the access service.
pub mod permissions {
    pub const REVIEW_REGISTRATIONS: &str = "registrations:review";
    pub const VIEW_REGISTRATIONS: &str = "registrations:view";
}

/// Remote permission lookup returning `{allowed: bool}` for a user and permission.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn check(&self, user_id: &UserId, permission: &str) -> Result<bool, PermissionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("user {user_id} lacks permission '{permission}'")]
    Denied { user_id: UserId, permission: String },
    #[error("permission service unavailable: {0}")]
    Unavailable(String),
}

/// Fail with [`PermissionError::Denied`] unless the checker allows the permission.
pub async fn require_permission<P>(
    checker: &P,
    user_id: &UserId,
    permission: &str,
) -> Result<(), PermissionError>
where
    P: PermissionChecker + ?Sized,
{
    let allowed = checker.check(user_id, permission).await?;
    debug!(%user_id, permission, allowed, "permission check");
    if allowed {
        Ok(())
    } else {
        Err(PermissionError::Denied {
            user_id: user_id.clone(),
            permission: permission.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Grants(HashSet<(String, String)>);

    #[async_trait]
    impl PermissionChecker for Grants {
        async fn check(&self, user_id: &UserId, permission: &str) -> Result<bool, PermissionError> {
            Ok(self
                .0
                .contains(&(user_id.0.clone(), permission.to_string())))
        }
    }

    struct Offline;

    #[async_trait]
    impl PermissionChecker for Offline {
        async fn check(&self, _: &UserId, _: &str) -> Result<bool, PermissionError> {
            Err(PermissionError::Unavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn user_id_from_owned_and_borrowed_agree() {
        let owned: Option<UserId> = Some("prov-3".to_string()).map(UserId::from);
        assert_eq!(owned, Some(UserId::from("prov-3")));
    }

    #[tokio::test]
    async fn allows_granted_permission() {
        let grants = Grants(HashSet::from([(
            "admin-1".to_string(),
            permissions::REVIEW_REGISTRATIONS.to_string(),
        )]));
        require_permission(&grants, &UserId::from("admin-1"), permissions::REVIEW_REGISTRATIONS)
            .await
            .expect("granted");
    }

    #[tokio::test]
    async fn denies_missing_permission() {
        let grants = Grants(HashSet::new());
        match require_permission(&grants, &UserId::from("prov-7"), permissions::REVIEW_REGISTRATIONS)
            .await
        {
            Err(PermissionError::Denied { user_id, permission }) => {
                assert_eq!(user_id.as_str(), "prov-7");
                assert_eq!(permission, "registrations:review");
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn propagates_unavailable_service() {
        let result =
            require_permission(&Offline, &UserId::from("admin-1"), permissions::VIEW_REGISTRATIONS)
                .await;
        assert!(matches!(result, Err(PermissionError::Unavailable(_))));
    }
}
