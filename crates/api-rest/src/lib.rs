//! # API REST
//!
//! REST API implementation for the laboratory exam results service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS)
//!
//! Uses `api-shared` for the error envelope and bearer-token extraction; all
//! business rules live in `lers-core`.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use api_shared::{auth::bearer_token, ApiError, ApiResult, HealthRes, HealthService};
use lers_core::{
    exam::DEFAULT_PAGE_SIZE, AuditEntry, AuditFilter, AuditService, AuthService,
    BulkFinalizeOutcome, CoreConfig, ExamFilter, ExamResult, ExamService, NewExamResult,
    PageParams, Paginated, Patient, PatientService, Principal, TokenGrant,
};
use lers_types::ExamStatus;
use sqlx::PgPool;
use uuid::Uuid;

/// Application state shared by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    auth_service: AuthService,
    patient_service: PatientService,
    exam_service: ExamService,
    audit_service: AuditService,
}

impl AppState {
    pub fn new(pool: PgPool, cfg: Arc<CoreConfig>) -> Self {
        Self {
            auth_service: AuthService::new(pool.clone(), cfg),
            patient_service: PatientService::new(pool.clone()),
            exam_service: ExamService::new(pool.clone()),
            audit_service: AuditService::new(pool.clone()),
            pool,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        issue_token,
        validate_token,
        cleanup_tokens,
        enrol_patient,
        register_result,
        get_result,
        list_results,
        finalize_result,
        bulk_finalize_results,
        delete_result,
        restore_result,
        result_counts,
        audit_trail,
    ),
    components(schemas(
        HealthRes,
        api_shared::error::ErrorBody,
        TokenReq,
        TokenRes,
        ValidateRes,
        CleanupRes,
        EnrolPatientReq,
        PatientRes,
        RegisterResultReq,
        FinalizeResultReq,
        BulkFinalizeReq,
        BulkFinalizeRes,
        BulkSkipRes,
        ExamResultRes,
        ResultPageRes,
        StatusCountRes,
        AuditEntryRes,
        AuditPageRes,
        ExamStatus,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Builds the application router with every endpoint mounted.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/token", post(issue_token))
        .route("/auth/validate", post(validate_token))
        .route("/auth/cleanup", delete(cleanup_tokens))
        .route("/patients", post(enrol_patient))
        .route("/results", post(register_result))
        .route("/results", get(list_results))
        .route("/results/:id", get(get_result))
        .route("/results/:id", delete(delete_result))
        .route("/results/:id/finalize", post(finalize_result))
        .route("/results/:id/restore", post(restore_result))
        .route("/results/bulk-finalize", post(bulk_finalize_results))
        .route("/stats/results", get(result_counts))
        .route("/audit", get(audit_trail))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Resolves the bearer token on a request to an authenticated principal.
async fn authenticate(
    state: &AppState,
    headers: &axum::http::HeaderMap,
) -> Result<Principal, ApiError> {
    let token = bearer_token(headers)?;
    Ok(state.auth_service.authenticate(token).await?)
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

/// Credentials for token issuance. Supply either the submitter pair
/// (`client_id` + `client_secret`) or the patient pair (`patient_id` +
/// `access_code`).
#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct TokenReq {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub patient_id: Option<Uuid>,
    pub access_code: Option<String>,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct TokenRes {
    pub access_token: String,
    pub token_type: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}

impl From<TokenGrant> for TokenRes {
    fn from(grant: TokenGrant) -> Self {
        Self {
            access_token: grant.token,
            token_type: "bearer".into(),
            role: grant.role,
            expires_at: grant.expires_at,
        }
    }
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ValidateRes {
    pub valid: bool,
    pub role: String,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct CleanupRes {
    pub deleted: u64,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct EnrolPatientReq {
    pub full_name: String,
    pub email: String,
    /// Plaintext access code; only its SHA-256 digest is stored.
    pub access_code: String,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct PatientRes {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<Patient> for PatientRes {
    fn from(p: Patient) -> Self {
        Self {
            id: p.id,
            full_name: p.full_name,
            email: p.email,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct RegisterResultReq {
    /// Optional client-supplied identifier; reusing a registered id is a
    /// conflict.
    pub id: Option<Uuid>,
    pub patient_id: Uuid,
    pub exam_type: String,
    /// Structured result payload. Required when the status is `finalized`.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Defaults to `finalized`.
    pub status: Option<ExamStatus>,
    pub requested_at: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct FinalizeResultReq {
    /// Completed payload; omit to finalize with the payload already stored.
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ExamResultRes {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub exam_type: String,
    pub payload: serde_json::Value,
    pub status: ExamStatus,
    pub requested_at: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ExamResult> for ExamResultRes {
    fn from(r: ExamResult) -> Self {
        Self {
            id: r.id,
            patient_id: r.patient_id,
            exam_type: r.exam_type,
            payload: r.payload,
            status: r.status,
            requested_at: r.requested_at,
            notes: r.notes,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ResultPageRes {
    pub items: Vec<ExamResultRes>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl From<Paginated<ExamResult>> for ResultPageRes {
    fn from(page: Paginated<ExamResult>) -> Self {
        Self {
            items: page.items.into_iter().map(ExamResultRes::from).collect(),
            total_count: page.total_count,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages,
        }
    }
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct StatusCountRes {
    pub status: ExamStatus,
    pub count: i64,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct BulkFinalizeReq {
    /// Result identifiers to finalize, at most 100 per request.
    pub ids: Vec<Uuid>,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct BulkSkipRes {
    pub id: Uuid,
    pub reason: String,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct BulkFinalizeRes {
    pub finalized: Vec<Uuid>,
    pub skipped: Vec<BulkSkipRes>,
}

impl From<BulkFinalizeOutcome> for BulkFinalizeRes {
    fn from(outcome: BulkFinalizeOutcome) -> Self {
        Self {
            finalized: outcome.finalized,
            skipped: outcome
                .skipped
                .into_iter()
                .map(|s| BulkSkipRes {
                    id: s.id,
                    reason: s.reason,
                })
                .collect(),
        }
    }
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct AuditEntryRes {
    pub id: Uuid,
    pub result_id: Uuid,
    pub action: String,
    pub actor_role: String,
    pub actor_client_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl From<AuditEntry> for AuditEntryRes {
    fn from(e: AuditEntry) -> Self {
        Self {
            id: e.id,
            result_id: e.result_id,
            action: e.action.to_string(),
            actor_role: e.actor_role,
            actor_client_id: e.actor_client_id,
            recorded_at: e.recorded_at,
        }
    }
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct AuditPageRes {
    pub items: Vec<AuditEntryRes>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl From<Paginated<AuditEntry>> for AuditPageRes {
    fn from(page: Paginated<AuditEntry>) -> Self {
        Self {
            items: page.items.into_iter().map(AuditEntryRes::from).collect(),
            total_count: page.total_count,
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages,
        }
    }
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct AuditQuery {
    pub result_id: Option<Uuid>,
    /// Inclusive lower bound on the recorded date (YYYY-MM-DD).
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the recorded date (YYYY-MM-DD).
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct ListResultsQuery {
    /// 1-based page number.
    pub page: Option<u32>,
    /// Results per page, at most 100.
    pub page_size: Option<u32>,
    pub exam_type: Option<String>,
    pub status: Option<ExamStatus>,
    /// Inclusive lower bound on the request date (YYYY-MM-DD).
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the request date (YYYY-MM-DD).
    pub to: Option<NaiveDate>,
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct CountsQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database are healthy", body = HealthRes),
        (status = 503, description = "Database unreachable", body = HealthRes)
    )
)]
/// Health check endpoint.
///
/// Probes the database so that a healthy answer also vouches for storage
/// connectivity. Used by monitoring and load balancers.
#[axum::debug_handler]
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthRes>) {
    let report = HealthService::check(&state.pool).await;
    let status = if report.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[utoipa::path(
    post,
    path = "/auth/token",
    request_body = TokenReq,
    responses(
        (status = 200, description = "Token issued", body = TokenRes),
        (status = 400, description = "Neither credential pair supplied", body = api_shared::error::ErrorBody),
        (status = 401, description = "Invalid credentials", body = api_shared::error::ErrorBody)
    )
)]
/// Issues a bearer token.
///
/// Accepts either the lab submitter's `client_id`/`client_secret` or a
/// patient's `patient_id`/`access_code`.
///
/// # Errors
/// Returns `400` when no complete credential pair is supplied and `401` when
/// the credentials do not match.
#[axum::debug_handler]
async fn issue_token(
    State(state): State<AppState>,
    Json(req): Json<TokenReq>,
) -> ApiResult<Json<TokenRes>> {
    let grant = match (&req.client_id, &req.client_secret, req.patient_id, &req.access_code) {
        (Some(client_id), Some(client_secret), None, None) => {
            state
                .auth_service
                .issue_submitter_token(client_id, client_secret)
                .await?
        }
        (None, None, Some(patient_id), Some(access_code)) => {
            state
                .auth_service
                .issue_patient_token(patient_id, access_code)
                .await?
        }
        _ => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "supply either client_id and client_secret, or patient_id and access_code",
            ))
        }
    };
    Ok(Json(grant.into()))
}

#[utoipa::path(
    post,
    path = "/auth/validate",
    responses(
        (status = 200, description = "Token is valid", body = ValidateRes),
        (status = 401, description = "Missing, invalid or expired token", body = api_shared::error::ErrorBody)
    ),
    security(("bearer" = []))
)]
/// Validates the presented bearer token.
#[axum::debug_handler]
async fn validate_token(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> ApiResult<Json<ValidateRes>> {
    let principal = authenticate(&state, &headers).await?;
    Ok(Json(ValidateRes {
        valid: true,
        role: principal.role().to_owned(),
    }))
}

#[utoipa::path(
    delete,
    path = "/auth/cleanup",
    responses(
        (status = 200, description = "Expired tokens removed", body = CleanupRes),
        (status = 401, description = "Missing, invalid or expired token", body = api_shared::error::ErrorBody),
        (status = 403, description = "Caller is not a submitter", body = api_shared::error::ErrorBody)
    ),
    security(("bearer" = []))
)]
/// Removes expired tokens. Submitter only.
#[axum::debug_handler]
async fn cleanup_tokens(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> ApiResult<Json<CleanupRes>> {
    let principal = authenticate(&state, &headers).await?;
    let deleted = state.auth_service.cleanup_expired(&principal).await?;
    Ok(Json(CleanupRes { deleted }))
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = EnrolPatientReq,
    responses(
        (status = 201, description = "Patient enrolled", body = PatientRes),
        (status = 400, description = "Invalid name, email or access code", body = api_shared::error::ErrorBody),
        (status = 403, description = "Caller is not a submitter", body = api_shared::error::ErrorBody),
        (status = 409, description = "Email already enrolled", body = api_shared::error::ErrorBody)
    ),
    security(("bearer" = []))
)]
/// Enrols a new patient. Submitter only.
#[axum::debug_handler]
async fn enrol_patient(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<EnrolPatientReq>,
) -> ApiResult<(StatusCode, Json<PatientRes>)> {
    let principal = authenticate(&state, &headers).await?;
    let patient = state
        .patient_service
        .enrol(&principal, &req.full_name, &req.email, &req.access_code)
        .await?;
    Ok((StatusCode::CREATED, Json(patient.into())))
}

#[utoipa::path(
    post,
    path = "/results",
    request_body = RegisterResultReq,
    responses(
        (status = 201, description = "Exam result registered", body = ExamResultRes),
        (status = 400, description = "Invalid input or unknown patient", body = api_shared::error::ErrorBody),
        (status = 403, description = "Caller is not a submitter", body = api_shared::error::ErrorBody),
        (status = 409, description = "Result id already registered", body = api_shared::error::ErrorBody)
    ),
    security(("bearer" = []))
)]
/// Registers an exam result. Submitter only.
///
/// Results default to `finalized`; submit `"status": "pending"` for work
/// whose payload is not yet complete.
#[axum::debug_handler]
async fn register_result(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<RegisterResultReq>,
) -> ApiResult<(StatusCode, Json<ExamResultRes>)> {
    let principal = authenticate(&state, &headers).await?;
    let new = NewExamResult {
        id: req.id,
        patient_id: req.patient_id,
        exam_type: req.exam_type,
        payload: req.payload,
        status: req.status,
        requested_at: req.requested_at,
        notes: req.notes,
    };
    let created = state.exam_service.register(&principal, new).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

#[utoipa::path(
    get,
    path = "/results/{id}",
    params(("id" = Uuid, Path, description = "Exam result identifier")),
    responses(
        (status = 200, description = "The patient's own exam result", body = ExamResultRes),
        (status = 403, description = "Result belongs to another patient", body = api_shared::error::ErrorBody),
        (status = 404, description = "No such result", body = api_shared::error::ErrorBody)
    ),
    security(("bearer" = []))
)]
/// Downloads one exam result. Patients only see their own.
#[axum::debug_handler]
async fn get_result(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    AxumPath(id): AxumPath<Uuid>,
) -> ApiResult<Json<ExamResultRes>> {
    let principal = authenticate(&state, &headers).await?;
    let result = state.exam_service.get_owned(&principal, id).await?;
    Ok(Json(result.into()))
}

#[utoipa::path(
    get,
    path = "/results",
    params(ListResultsQuery),
    responses(
        (status = 200, description = "One page of the patient's results", body = ResultPageRes),
        (status = 400, description = "Invalid pagination or filter", body = api_shared::error::ErrorBody),
        (status = 403, description = "Caller is not a patient", body = api_shared::error::ErrorBody)
    ),
    security(("bearer" = []))
)]
/// Lists the calling patient's exam results, filtered and paginated.
#[axum::debug_handler]
async fn list_results(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Query(query): Query<ListResultsQuery>,
) -> ApiResult<Json<ResultPageRes>> {
    let principal = authenticate(&state, &headers).await?;

    let params = PageParams::new(
        query.page.unwrap_or(1),
        query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    )
    .map_err(ApiError::from)?;
    let filter = ExamFilter {
        exam_type: query.exam_type,
        status: query.status,
        from: query.from,
        to: query.to,
    };

    let page = state
        .exam_service
        .list_owned(&principal, filter, params)
        .await?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    post,
    path = "/results/{id}/finalize",
    params(("id" = Uuid, Path, description = "Exam result identifier")),
    request_body = FinalizeResultReq,
    responses(
        (status = 200, description = "Result finalized", body = ExamResultRes),
        (status = 400, description = "Finalizing without a payload", body = api_shared::error::ErrorBody),
        (status = 403, description = "Caller is not a submitter", body = api_shared::error::ErrorBody),
        (status = 404, description = "No such result", body = api_shared::error::ErrorBody),
        (status = 409, description = "Result already finalized", body = api_shared::error::ErrorBody)
    ),
    security(("bearer" = []))
)]
/// Finalizes a pending result. Submitter only.
#[axum::debug_handler]
async fn finalize_result(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    AxumPath(id): AxumPath<Uuid>,
    Json(req): Json<FinalizeResultReq>,
) -> ApiResult<Json<ExamResultRes>> {
    let principal = authenticate(&state, &headers).await?;
    let updated = state
        .exam_service
        .finalize(&principal, id, req.payload)
        .await?;
    Ok(Json(updated.into()))
}

#[utoipa::path(
    post,
    path = "/results/bulk-finalize",
    request_body = BulkFinalizeReq,
    responses(
        (status = 200, description = "Batch processed; per-id skips carry a reason", body = BulkFinalizeRes),
        (status = 400, description = "Empty or oversized id batch", body = api_shared::error::ErrorBody),
        (status = 403, description = "Caller is not a submitter", body = api_shared::error::ErrorBody)
    ),
    security(("bearer" = []))
)]
/// Finalizes a batch of pending results with their stored payloads.
/// Submitter only.
#[axum::debug_handler]
async fn bulk_finalize_results(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(req): Json<BulkFinalizeReq>,
) -> ApiResult<Json<BulkFinalizeRes>> {
    let principal = authenticate(&state, &headers).await?;
    let outcome = state
        .exam_service
        .bulk_finalize(&principal, &req.ids)
        .await?;
    Ok(Json(outcome.into()))
}

#[utoipa::path(
    delete,
    path = "/results/{id}",
    params(("id" = Uuid, Path, description = "Exam result identifier")),
    responses(
        (status = 204, description = "Result soft-deleted"),
        (status = 403, description = "Caller is not a submitter", body = api_shared::error::ErrorBody),
        (status = 404, description = "No such result", body = api_shared::error::ErrorBody)
    ),
    security(("bearer" = []))
)]
/// Soft-deletes a result. Submitter only.
#[axum::debug_handler]
async fn delete_result(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    AxumPath(id): AxumPath<Uuid>,
) -> ApiResult<StatusCode> {
    let principal = authenticate(&state, &headers).await?;
    state.exam_service.delete(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/results/{id}/restore",
    params(("id" = Uuid, Path, description = "Exam result identifier")),
    responses(
        (status = 200, description = "Result restored", body = ExamResultRes),
        (status = 403, description = "Caller is not a submitter", body = api_shared::error::ErrorBody),
        (status = 404, description = "No such deleted result", body = api_shared::error::ErrorBody)
    ),
    security(("bearer" = []))
)]
/// Restores a soft-deleted result. Submitter only.
#[axum::debug_handler]
async fn restore_result(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    AxumPath(id): AxumPath<Uuid>,
) -> ApiResult<Json<ExamResultRes>> {
    let principal = authenticate(&state, &headers).await?;
    let restored = state.exam_service.restore(&principal, id).await?;
    Ok(Json(restored.into()))
}

#[utoipa::path(
    get,
    path = "/stats/results",
    params(CountsQuery),
    responses(
        (status = 200, description = "Result counts per status", body = [StatusCountRes]),
        (status = 403, description = "Caller is not a submitter", body = api_shared::error::ErrorBody)
    ),
    security(("bearer" = []))
)]
/// Counts non-deleted results by status. Submitter only.
#[axum::debug_handler]
async fn result_counts(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Query(query): Query<CountsQuery>,
) -> ApiResult<Json<Vec<StatusCountRes>>> {
    let principal = authenticate(&state, &headers).await?;
    let counts = state
        .exam_service
        .counts_by_status(&principal, query.from, query.to)
        .await?;
    Ok(Json(
        counts
            .into_iter()
            .map(|c| StatusCountRes {
                status: c.status,
                count: c.count,
            })
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "One page of audit entries, newest first", body = AuditPageRes),
        (status = 400, description = "Invalid pagination or filter", body = api_shared::error::ErrorBody),
        (status = 403, description = "Caller is not a submitter", body = api_shared::error::ErrorBody)
    ),
    security(("bearer" = []))
)]
/// Lists the audit trail of result mutations. Submitter only.
#[axum::debug_handler]
async fn audit_trail(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<AuditPageRes>> {
    let principal = authenticate(&state, &headers).await?;

    let params = PageParams::new(
        query.page.unwrap_or(1),
        query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
    )?;
    let filter = AuditFilter {
        result_id: query.result_id,
        from: query.from,
        to: query.to,
    };

    let page = state.audit_service.trail(&principal, filter, params).await?;
    Ok(Json(page.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use lers_core::repositories::schema;
    use lers_core::DbConfig;
    use tower::ServiceExt;

    /// State backed by a lazy pool pointing at a port nothing listens on.
    /// Handlers that reach the database report a storage failure; handlers
    /// that fail earlier never notice.
    fn test_state() -> AppState {
        let db = DbConfig {
            host: "127.0.0.1".into(),
            port: 1,
            user: "lers".into(),
            password: "unused".into(),
            name: "lers".into(),
            timezone: "UTC".into(),
        };
        let cfg = CoreConfig::new(
            "127.0.0.1:0".into(),
            db,
            "lab-system".into(),
            "0123456789abcdef0123456789abcdef".into(),
            900,
        )
        .unwrap();
        let pool = schema::connect_lazy(&cfg);
        AppState::new(pool, Arc::new(cfg))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_unavailable_when_db_is_down() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["ok"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn missing_bearer_token_is_unauthorized() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/results").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn token_request_without_credentials_is_bad_request() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::post("/auth/token")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wrong_submitter_credentials_are_unauthorized() {
        // Credential comparison happens against config, before any query.
        let app = router(test_state());
        let body = serde_json::json!({
            "client_id": "lab-system",
            "client_secret": "not-the-configured-secret-at-all!!"
        });
        let response = app
            .oneshot(
                Request::post("/auth/token")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(
            body["detail"],
            serde_json::json!("invalid client_id or client_secret")
        );
    }

    #[tokio::test]
    async fn audit_trail_requires_a_bearer_token() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/audit").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bulk_finalize_requires_a_bearer_token() {
        let app = router(test_state());
        let body = serde_json::json!({ "ids": [uuid::Uuid::new_v4()] });
        let response = app
            .oneshot(
                Request::post("/results/bulk-finalize")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn basic_scheme_is_rejected() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::post("/auth/validate")
                    .header("authorization", "Basic dXNlcjpwYXNz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
