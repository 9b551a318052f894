use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::credential::CredentialModel;
use super::domain::{
    CheckKind, Subject, SubjectId, SubjectKind, TenantContext, VerificationFlags,
};
use super::evidence::EvidenceStore;
use super::gateway::{ProviderError, ProviderTransport, VerificationGateway, WatchlistVerdict};
use super::orchestrator::{ValidationError, ValidationService};
use super::repository::{AuditRepository, RepositoryError, SubjectRepository};
use super::session::{SelfServiceSession, SessionState};

/// Shared state behind the identity routes.
pub struct IdentityState<T, A, E, S> {
    pub service: ValidationService<T, A, E, S>,
    pub gateway: Arc<VerificationGateway<T, A, E>>,
    pub subjects: Arc<S>,
    /// Fallback credentials when the request carries no tenant headers.
    pub tenant: TenantContext,
}

impl<T, A, E, S> IdentityState<T, A, E, S> {
    /// Tenant credentials from `x-tenant-id` / bearer headers, falling back
    /// to the configured default. Always an explicit value, never ambient.
    fn tenant_for(&self, headers: &HeaderMap) -> TenantContext {
        let tenant_id = headers
            .get("x-tenant-id")
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty());
        let api_key = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        match (tenant_id, api_key) {
            (Some(tenant_id), Some(api_key)) => TenantContext {
                tenant_id: tenant_id.to_string(),
                api_key: api_key.to_string(),
            },
            _ => self.tenant.clone(),
        }
    }
}

/// Router builder exposing the staff validation flow, the manual screening
/// path, the reset action, and the anonymous self-service session.
pub fn identity_router<T, A, E, S>(state: Arc<IdentityState<T, A, E, S>>) -> Router
where
    T: ProviderTransport + 'static,
    A: AuditRepository + 'static,
    E: EvidenceStore + 'static,
    S: SubjectRepository + 'static,
{
    Router::new()
        .route("/api/v1/identity/subjects", post(register_handler::<T, A, E, S>))
        .route(
            "/api/v1/identity/subjects/:subject_id",
            get(subject_handler::<T, A, E, S>),
        )
        .route(
            "/api/v1/identity/subjects/:subject_id/validation",
            post(run_handler::<T, A, E, S>),
        )
        .route(
            "/api/v1/identity/subjects/:subject_id/validation/reset",
            post(reset_handler::<T, A, E, S>),
        )
        .route(
            "/api/v1/identity/watchlist",
            post(watchlist_handler::<T, A, E, S>),
        )
        .route(
            "/api/v1/identity/verify/:token",
            get(session_resolve_handler::<T, A, E, S>),
        )
        .route(
            "/api/v1/identity/verify/:token/submit",
            post(session_submit_handler::<T, A, E, S>),
        )
        .with_state(state)
}

/// Boundary registration: the contact layer owns subject CRUD; this endpoint
/// only mints a verification-ready subject with its single-use link token.
#[derive(Debug, Deserialize)]
pub struct RegisterSubjectRequest {
    pub full_name: String,
    #[serde(default = "default_kind")]
    pub kind: SubjectKind,
    #[serde(default)]
    pub id_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub elector_key: Option<String>,
    #[serde(default)]
    pub emission_number: Option<String>,
    #[serde(default)]
    pub ocr_number: Option<String>,
    #[serde(default)]
    pub cic: Option<String>,
    #[serde(default)]
    pub citizen_id: Option<String>,
    #[serde(default)]
    pub mrz: Option<String>,
    #[serde(default)]
    pub issuance_year: Option<i32>,
    #[serde(default)]
    pub credential_model: Option<CredentialModel>,
    #[serde(default)]
    pub front_image: Option<String>,
    #[serde(default)]
    pub back_image: Option<String>,
}

fn default_kind() -> SubjectKind {
    SubjectKind::Natural
}

/// Flags snapshot exposed to staff screens; raw images stay server-side.
#[derive(Debug, Serialize)]
pub struct SubjectView {
    pub id: SubjectId,
    pub kind: SubjectKind,
    pub full_name: String,
    pub flags: VerificationFlags,
}

impl SubjectView {
    fn from_subject(subject: &Subject) -> Self {
        Self {
            id: subject.id.clone(),
            kind: subject.kind,
            full_name: subject.full_name.clone(),
            flags: subject.flags.clone(),
        }
    }
}

async fn register_handler<T, A, E, S>(
    State(state): State<Arc<IdentityState<T, A, E, S>>>,
    axum::Json(request): axum::Json<RegisterSubjectRequest>,
) -> Response
where
    T: ProviderTransport + 'static,
    A: AuditRepository + 'static,
    E: EvidenceStore + 'static,
    S: SubjectRepository + 'static,
{
    let mut subject = Subject::new(
        SubjectId(uuid::Uuid::new_v4().to_string()),
        request.kind,
        request.full_name,
    );
    subject.id_number = request.id_number.unwrap_or_default();
    subject.address = request.address.unwrap_or_default();
    subject.email = request.email.unwrap_or_default();
    subject.phone = request.phone.unwrap_or_default();
    subject.elector_key = request.elector_key;
    subject.emission_number = request.emission_number;
    subject.ocr_number = request.ocr_number;
    subject.cic = request.cic;
    subject.citizen_id = request.citizen_id;
    subject.mrz = request.mrz;
    subject.issuance_year = request.issuance_year;
    subject.credential_model = request.credential_model;
    subject.front_image = request.front_image;
    subject.back_image = request.back_image;
    subject.verification_token = Some(uuid::Uuid::new_v4().to_string());

    match state.subjects.insert(subject) {
        Ok(stored) => {
            let payload = json!({
                "id": stored.id.0,
                "verification_token": stored.verification_token,
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(err) => repository_error_response(err),
    }
}

async fn subject_handler<T, A, E, S>(
    State(state): State<Arc<IdentityState<T, A, E, S>>>,
    Path(subject_id): Path<String>,
) -> Response
where
    T: ProviderTransport + 'static,
    A: AuditRepository + 'static,
    E: EvidenceStore + 'static,
    S: SubjectRepository + 'static,
{
    match state.service.subject(&SubjectId(subject_id)) {
        Ok(subject) => {
            (StatusCode::OK, axum::Json(SubjectView::from_subject(&subject))).into_response()
        }
        Err(err) => validation_error_response(err),
    }
}

async fn run_handler<T, A, E, S>(
    State(state): State<Arc<IdentityState<T, A, E, S>>>,
    Path(subject_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    T: ProviderTransport + 'static,
    A: AuditRepository + 'static,
    E: EvidenceStore + 'static,
    S: SubjectRepository + 'static,
{
    let tenant = state.tenant_for(&headers);
    match state.service.run(&SubjectId(subject_id), &tenant).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => validation_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub check: CheckKind,
    /// Destructive action: must be explicitly confirmed by the caller.
    #[serde(default)]
    pub confirm: bool,
}

async fn reset_handler<T, A, E, S>(
    State(state): State<Arc<IdentityState<T, A, E, S>>>,
    Path(subject_id): Path<String>,
    axum::Json(request): axum::Json<ResetRequest>,
) -> Response
where
    T: ProviderTransport + 'static,
    A: AuditRepository + 'static,
    E: EvidenceStore + 'static,
    S: SubjectRepository + 'static,
{
    if !request.confirm {
        let payload = json!({ "error": "reset must be confirmed" });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    }

    match state.service.reset(&SubjectId(subject_id), request.check) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => validation_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct WatchlistRequest {
    pub subject_id: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

async fn watchlist_handler<T, A, E, S>(
    State(state): State<Arc<IdentityState<T, A, E, S>>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<WatchlistRequest>,
) -> Response
where
    T: ProviderTransport + 'static,
    A: AuditRepository + 'static,
    E: EvidenceStore + 'static,
    S: SubjectRepository + 'static,
{
    let tenant = state.tenant_for(&headers);
    let outcome = state
        .service
        .manual_watchlist(
            &SubjectId(request.subject_id),
            request.full_name.as_deref(),
            &tenant,
        )
        .await;

    match outcome {
        Ok((verdict, flags)) => {
            let payload = match verdict {
                WatchlistVerdict::Clean { record } => json!({
                    "outcome": "clean",
                    "record_id": record.id.0,
                    "flags": flags,
                }),
                WatchlistVerdict::Risk { record, matches } => json!({
                    "outcome": "risk",
                    "record_id": record.id.0,
                    "matches": matches,
                    "warning": "subject matched a sanction/watch list entry",
                    "flags": flags,
                }),
                WatchlistVerdict::Unchecked { reason } => json!({
                    "outcome": "unchecked",
                    "warning": reason,
                    "flags": flags,
                }),
            };
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => validation_error_response(err),
    }
}

async fn session_resolve_handler<T, A, E, S>(
    State(state): State<Arc<IdentityState<T, A, E, S>>>,
    Path(token): Path<String>,
) -> Response
where
    T: ProviderTransport + 'static,
    A: AuditRepository + 'static,
    E: EvidenceStore + 'static,
    S: SubjectRepository + 'static,
{
    let mut session =
        SelfServiceSession::new(state.gateway.clone(), state.subjects.clone(), token);
    let resolved = session.start();

    if resolved == SessionState::Error {
        let payload = json!({ "error": session.failure().unwrap_or("link invalid") });
        return (StatusCode::NOT_FOUND, axum::Json(payload)).into_response();
    }

    let payload = json!({
        "state": resolved.label(),
        "subject_name": session.subject_name(),
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct SessionSubmitRequest {
    pub selfie: String,
    pub ine_front: String,
    pub ine_back: String,
}

/// One-shot capture bundle: drives the session through its capture states and
/// the single biometric call to a terminal state.
async fn session_submit_handler<T, A, E, S>(
    State(state): State<Arc<IdentityState<T, A, E, S>>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<SessionSubmitRequest>,
) -> Response
where
    T: ProviderTransport + 'static,
    A: AuditRepository + 'static,
    E: EvidenceStore + 'static,
    S: SubjectRepository + 'static,
{
    let tenant = state.tenant_for(&headers);
    let mut session =
        SelfServiceSession::new(state.gateway.clone(), state.subjects.clone(), token);

    if session.start() == SessionState::Error {
        let payload = json!({ "error": session.failure().unwrap_or("link invalid") });
        return (StatusCode::NOT_FOUND, axum::Json(payload)).into_response();
    }

    session.capture(request.selfie);
    session.capture(request.ine_front);
    session.capture(request.ine_back);
    let terminal = session.submit(&tenant).await;

    let payload = json!({
        "state": terminal.label(),
        "similarity": session.similarity(),
        "error": session.failure(),
    });
    let status = if terminal == SessionState::Success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, axum::Json(payload)).into_response()
}

fn validation_error_response(err: ValidationError) -> Response {
    let (status, message) = match &err {
        ValidationError::SubjectNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        ValidationError::ScreeningNameTooShort => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        ValidationError::Provider(ProviderError::Unavailable(_)) => {
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
        ValidationError::Provider(_) => (StatusCode::BAD_GATEWAY, err.to_string()),
        ValidationError::Repository(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    (status, axum::Json(json!({ "error": message }))).into_response()
}

fn repository_error_response(err: RepositoryError) -> Response {
    let status = match err {
        RepositoryError::Conflict => StatusCode::CONFLICT,
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, axum::Json(json!({ "error": err.to_string() }))).into_response()
}
