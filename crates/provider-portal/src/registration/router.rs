use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use super::draft::{DraftStore, DraftUpsert};
use super::form::FormStep;
use super::progress::{progress_breakdown, ProgressBreakdown};
use super::rules::RuleSet;
use super::submission::{
    RegistrationError, RegistrationNumber, RegistrationRepository, RegistrationService,
    RegistrationStatus, RepositoryError,
};
use super::values::{FormErrors, FormValues};
use crate::access::{CallerId, PermissionChecker, PermissionError};

/// Upper bound on the pending review queue returned in one response.
const PENDING_PAGE_SIZE: usize = 100;

/// Shared handler state: the form schema plus the draft and registration backends.
pub struct PortalState<D, R, P> {
    pub steps: Arc<Vec<FormStep>>,
    pub rules: Arc<RuleSet>,
    pub drafts: Arc<D>,
    pub registrations: Arc<RegistrationService<D, R, P>>,
}

impl<D, R, P> Clone for PortalState<D, R, P> {
    fn clone(&self) -> Self {
        Self {
            steps: Arc::clone(&self.steps),
            rules: Arc::clone(&self.rules),
            drafts: Arc::clone(&self.drafts),
            registrations: Arc::clone(&self.registrations),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub values: FormValues,
    /// Errors from the client's own validation pass; computed from the rule set if absent.
    #[serde(default)]
    pub errors: Option<FormErrors>,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    #[serde(flatten)]
    pub breakdown: ProgressBreakdown,
    pub first_incomplete_step: Option<usize>,
    pub errors: FormErrors,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: RegistrationStatus,
}

/// Router builder exposing progress, draft, and registration endpoints.
pub fn registration_router<D, R, P>(state: PortalState<D, R, P>) -> Router
where
    D: DraftStore + 'static,
    R: RegistrationRepository + 'static,
    P: PermissionChecker + 'static,
{
    Router::new()
        .route(
            "/api/v1/registration/progress",
            post(progress_handler::<D, R, P>),
        )
        .route(
            "/api/v1/drafts",
            put(upsert_draft_handler::<D, R, P>).get(list_drafts_handler::<D, R, P>),
        )
        .route(
            "/api/v1/registrations",
            post(submit_handler::<D, R, P>).get(latest_handler::<D, R, P>),
        )
        .route(
            "/api/v1/admin/registrations/pending",
            get(pending_handler::<D, R, P>),
        )
        .route(
            "/api/v1/admin/registrations/:number/status",
            post(review_handler::<D, R, P>),
        )
        .with_state(state)
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}

pub(crate) fn registration_error_response(error: RegistrationError) -> Response {
    let status = match &error {
        RegistrationError::Incomplete { errors } => {
            let payload = json!({
                "error": error.to_string(),
                "fields": errors,
            });
            return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
        }
        RegistrationError::NoDraft | RegistrationError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistrationError::AlreadySubmitted { .. }
        | RegistrationError::InvalidTransition { .. }
        | RegistrationError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        RegistrationError::Permission(PermissionError::Denied { .. }) => StatusCode::FORBIDDEN,
        RegistrationError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        RegistrationError::Permission(PermissionError::Unavailable(_))
        | RegistrationError::Drafts(_) => StatusCode::BAD_GATEWAY,
        RegistrationError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    if status.is_server_error() {
        warn!(error = %error, "registration request failed");
    }
    error_body(status, error.to_string())
}

pub(crate) async fn progress_handler<D, R, P>(
    State(state): State<PortalState<D, R, P>>,
    axum::Json(request): axum::Json<ProgressRequest>,
) -> Response
where
    D: DraftStore + 'static,
    R: RegistrationRepository + 'static,
    P: PermissionChecker + 'static,
{
    let ProgressRequest { values, errors } = request;
    let errors = errors.unwrap_or_else(|| state.rules.validate(&values));
    let breakdown = progress_breakdown(&state.steps, &values, &errors);
    let first_incomplete_step = breakdown.first_incomplete_step();

    let body = ProgressResponse {
        breakdown,
        first_incomplete_step,
        errors,
    };
    (StatusCode::OK, axum::Json(body)).into_response()
}

pub(crate) async fn upsert_draft_handler<D, R, P>(
    State(state): State<PortalState<D, R, P>>,
    CallerId(user_id): CallerId,
    axum::Json(payload): axum::Json<FormValues>,
) -> Response
where
    D: DraftStore + 'static,
    R: RegistrationRepository + 'static,
    P: PermissionChecker + 'static,
{
    match state.drafts.upsert(DraftUpsert { user_id, payload }).await {
        Ok(draft) => (StatusCode::OK, axum::Json(draft)).into_response(),
        Err(error) => {
            warn!(error = %error, "draft upsert failed");
            error_body(StatusCode::BAD_GATEWAY, error.to_string())
        }
    }
}

pub(crate) async fn list_drafts_handler<D, R, P>(
    State(state): State<PortalState<D, R, P>>,
    CallerId(user_id): CallerId,
) -> Response
where
    D: DraftStore + 'static,
    R: RegistrationRepository + 'static,
    P: PermissionChecker + 'static,
{
    match state.drafts.for_user(&user_id).await {
        Ok(drafts) => (StatusCode::OK, axum::Json(drafts)).into_response(),
        Err(error) => error_body(StatusCode::BAD_GATEWAY, error.to_string()),
    }
}

pub(crate) async fn submit_handler<D, R, P>(
    State(state): State<PortalState<D, R, P>>,
    CallerId(user_id): CallerId,
) -> Response
where
    D: DraftStore + 'static,
    R: RegistrationRepository + 'static,
    P: PermissionChecker + 'static,
{
    match state.registrations.submit(&user_id).await {
        Ok(registration) => (StatusCode::CREATED, axum::Json(registration)).into_response(),
        Err(error) => registration_error_response(error),
    }
}

pub(crate) async fn latest_handler<D, R, P>(
    State(state): State<PortalState<D, R, P>>,
    CallerId(user_id): CallerId,
) -> Response
where
    D: DraftStore + 'static,
    R: RegistrationRepository + 'static,
    P: PermissionChecker + 'static,
{
    match state.registrations.latest_for_user(&user_id).await {
        Ok(Some(registration)) => (StatusCode::OK, axum::Json(registration)).into_response(),
        Ok(None) => error_body(StatusCode::NOT_FOUND, "no registration on file".to_string()),
        Err(error) => registration_error_response(error),
    }
}

pub(crate) async fn pending_handler<D, R, P>(
    State(state): State<PortalState<D, R, P>>,
    CallerId(reviewer): CallerId,
) -> Response
where
    D: DraftStore + 'static,
    R: RegistrationRepository + 'static,
    P: PermissionChecker + 'static,
{
    match state
        .registrations
        .pending(&reviewer, PENDING_PAGE_SIZE)
        .await
    {
        Ok(registrations) => (StatusCode::OK, axum::Json(registrations)).into_response(),
        Err(error) => registration_error_response(error),
    }
}

pub(crate) async fn review_handler<D, R, P>(
    State(state): State<PortalState<D, R, P>>,
    CallerId(reviewer): CallerId,
    Path(number): Path<String>,
    axum::Json(request): axum::Json<ReviewRequest>,
) -> Response
where
    D: DraftStore + 'static,
    R: RegistrationRepository + 'static,
    P: PermissionChecker + 'static,
{
    let number = RegistrationNumber(number);
    match state
        .registrations
        .review(&reviewer, &number, request.status)
        .await
    {
        Ok(registration) => (StatusCode::OK, axum::Json(registration)).into_response(),
        Err(error) => registration_error_response(error),
    }
}
