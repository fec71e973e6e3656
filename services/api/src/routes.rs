use crate::infra::{AppState, InMemoryDocumentStore};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Extension;
use axum::{Json, Router};
use provider_portal::access::{CallerId, PermissionChecker};
use provider_portal::documents::{document_router, owner_prefix};
use provider_portal::registration::{
    registration_router, DraftStore, PortalState, RegistrationRepository,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_portal_routes<D, R, P>(
    state: PortalState<D, R, P>,
    documents: Arc<InMemoryDocumentStore>,
) -> Router
where
    D: DraftStore + 'static,
    R: RegistrationRepository + 'static,
    P: PermissionChecker + 'static,
{
    let files = Router::new()
        .route("/files/*key", get(file_endpoint))
        .with_state(documents.clone());

    registration_router(state)
        .merge(document_router(documents))
        .merge(files)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Serves documents uploaded to the in-memory store at the URLs it hands out. Callers
/// only read keys under their own `providers/{user}/` prefix.
pub(crate) async fn file_endpoint(
    State(documents): State<Arc<InMemoryDocumentStore>>,
    CallerId(user_id): CallerId,
    Path(key): Path<String>,
) -> Response {
    let owned = owner_prefix(&user_id).is_ok_and(|prefix| key.starts_with(&prefix));
    if !owned {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": format!("{user_id} may not read '{key}'") })),
        )
            .into_response();
    }

    match documents.get(&key) {
        Some(bytes) => {
            let content_type = mime_guess::from_path(&key)
                .first_or_octet_stream()
                .to_string();
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no document stored at '{key}'") })),
        )
            .into_response(),
    }
}
