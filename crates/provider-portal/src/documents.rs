//! Supporting documents uploaded by providers, stored under identity-scoped keys.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::access::{CallerId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    W9,
    License,
    Insurance,
    Claim,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::W9 => "w9",
            DocumentCategory::License => "license",
            DocumentCategory::Insurance => "insurance",
            DocumentCategory::Claim => "claim",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "w9" => Some(Self::W9),
            "license" => Some(Self::License),
            "insurance" => Some(Self::Insurance),
            "claim" | "claims" => Some(Self::Claim),
            _ => None,
        }
    }
}

/// Result of a successful upload: the durable file name and a fetchable URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub filename: String,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("file name '{0}' has no usable characters")]
    InvalidFileName(String),
    #[error("user id '{0}' cannot be used in a storage key")]
    InvalidOwner(String),
    #[error("unknown document category '{0}'")]
    UnknownCategory(String),
    #[error("document '{0}' not found")]
    NotFound(String),
    #[error("file storage unavailable: {0}")]
    Unavailable(String),
}

/// Object storage for uploaded documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<StoredDocument, DocumentError>;
    async fn url(&self, key: &str) -> Result<String, DocumentError>;
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
}

/// `providers/{user}/`, the prefix every key owned by `user_id` starts with. User ids
/// must be a single segment of key characters that does not start with a dot.
pub fn owner_prefix(user_id: &UserId) -> Result<String, DocumentError> {
    let raw = user_id.as_str();
    if raw.is_empty() || raw.starts_with('.') || !raw.chars().all(is_key_char) {
        return Err(DocumentError::InvalidOwner(raw.to_string()));
    }
    Ok(format!("providers/{raw}/"))
}

/// `providers/{user}/{category}/{file}`; the file name is reduced to ASCII letters,
/// digits, `.`, `-` and `_`, and leading dots are dropped.
pub fn document_key(
    user_id: &UserId,
    category: DocumentCategory,
    file_name: &str,
) -> Result<String, DocumentError> {
    let prefix = owner_prefix(user_id)?;
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if is_key_char(c) {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        return Err(DocumentError::InvalidFileName(file_name.to_string()));
    }
    Ok(format!("{prefix}{}/{cleaned}", category.as_str()))
}

/// Router exposing upload and URL lookup for the caller's own documents.
pub fn document_router<F>(store: Arc<F>) -> Router
where
    F: DocumentStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/documents/:category/:file_name",
            post(upload_handler::<F>).get(url_handler::<F>),
        )
        .with_state(store)
}

fn resolve_key(
    user_id: &UserId,
    category: &str,
    file_name: &str,
) -> Result<String, DocumentError> {
    let category = DocumentCategory::parse(category)
        .ok_or_else(|| DocumentError::UnknownCategory(category.to_string()))?;
    document_key(user_id, category, file_name)
}

fn error_response(error: DocumentError) -> Response {
    let status = match error {
        DocumentError::InvalidFileName(_)
        | DocumentError::InvalidOwner(_)
        | DocumentError::UnknownCategory(_) => {
            StatusCode::BAD_REQUEST
        }
        DocumentError::NotFound(_) => StatusCode::NOT_FOUND,
        DocumentError::Unavailable(_) => StatusCode::BAD_GATEWAY,
    };
    (status, axum::Json(json!({ "error": error.to_string() }))).into_response()
}

pub(crate) async fn upload_handler<F>(
    State(store): State<Arc<F>>,
    CallerId(user_id): CallerId,
    Path((category, file_name)): Path<(String, String)>,
    body: Bytes,
) -> Response
where
    F: DocumentStore + 'static,
{
    let key = match resolve_key(&user_id, &category, &file_name) {
        Ok(key) => key,
        Err(error) => return error_response(error),
    };
    match store.upload(&key, body.to_vec()).await {
        Ok(stored) => {
            info!(%user_id, key, bytes = body.len(), "document uploaded");
            (StatusCode::CREATED, axum::Json(stored)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn url_handler<F>(
    State(store): State<Arc<F>>,
    CallerId(user_id): CallerId,
    Path((category, file_name)): Path<(String, String)>,
) -> Response
where
    F: DocumentStore + 'static,
{
    let key = match resolve_key(&user_id, &category, &file_name) {
        Ok(key) => key,
        Err(error) => return error_response(error),
    };
    match store.url(&key).await {
        Ok(url) => (StatusCode::OK, axum::Json(json!({ "url": url }))).into_response(),
        Err(error) => error_response(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_scoped_to_user_and_category() {
        let key = document_key(&UserId::from("prov-12"), DocumentCategory::W9, "W-9 2026.pdf")
            .expect("valid name");
        assert_eq!(key, "providers/prov-12/w9/W-9_2026.pdf");
    }

    #[test]
    fn key_strips_directories_and_hidden_prefix() {
        let key = document_key(
            &UserId::from("prov-12"),
            DocumentCategory::License,
            "../../etc/.passwd",
        )
        .expect("valid name");
        assert_eq!(key, "providers/prov-12/license/passwd");
    }

    #[test]
    fn key_rejects_unusable_names() {
        assert!(matches!(
            document_key(&UserId::from("prov-12"), DocumentCategory::Claim, "???"),
            Err(DocumentError::InvalidFileName(_))
        ));
        assert!(matches!(
            document_key(&UserId::from("prov-12"), DocumentCategory::Claim, "dir/"),
            Err(DocumentError::InvalidFileName(_))
        ));
    }

    #[test]
    fn key_rejects_user_ids_that_change_its_shape() {
        for user in ["prov-1/../prov-2", "..", ".hidden", "a b", ""] {
            assert!(
                matches!(
                    document_key(&UserId::from(user), DocumentCategory::W9, "w9.pdf"),
                    Err(DocumentError::InvalidOwner(_))
                ),
                "user id {user:?} should be rejected"
            );
        }
        assert_eq!(
            owner_prefix(&UserId::from("prov_12.a")).expect("plain id"),
            "providers/prov_12.a/"
        );
    }

    #[tokio::test]
    async fn upload_route_rejects_slash_in_user_header() {
        use axum::body::Body;
        use axum::http::Request;
        use std::collections::HashMap;
        use std::sync::Mutex;
        use tower::ServiceExt;

        #[derive(Default)]
        struct Keys(Mutex<HashMap<String, usize>>);

        #[async_trait]
        impl DocumentStore for Keys {
            async fn upload(
                &self,
                key: &str,
                bytes: Vec<u8>,
            ) -> Result<StoredDocument, DocumentError> {
                self.0.lock().unwrap().insert(key.to_string(), bytes.len());
                Ok(StoredDocument {
                    filename: key.to_string(),
                    url: format!("memory://{key}"),
                })
            }

            async fn url(&self, key: &str) -> Result<String, DocumentError> {
                Err(DocumentError::NotFound(key.to_string()))
            }
        }

        let store = Arc::new(Keys::default());
        let response = document_router(store.clone())
            .oneshot(
                Request::post("/api/v1/documents/w9/w9.pdf")
                    .header("x-user-id", "prov-2/w9")
                    .body(Body::from("%PDF"))
                    .unwrap(),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(store.0.lock().unwrap().is_empty());
    }

    #[test]
    fn categories_parse_case_insensitively() {
        assert_eq!(DocumentCategory::parse("Insurance"), Some(DocumentCategory::Insurance));
        assert_eq!(DocumentCategory::parse("claims"), Some(DocumentCategory::Claim));
        assert_eq!(DocumentCategory::parse("tax"), None);
    }
}
