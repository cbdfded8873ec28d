use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{InvoiceData, OrganizationId, ReviewAction, SubmissionId, UserId};
use super::export::ExportError;
use super::files::UploadedFile;
use super::repository::{MembershipDirectory, StoreError, SubmissionStore};
use super::service::{ReviewError, ReviewOutcome};
use super::submission::{CreateSubmission, Resubmission, SubmissionError};
use super::workflow::{AccessError, ReviewWorkflow};

/// Header carrying the authenticated user's id, set by the upstream gateway.
pub const ACTOR_HEADER: &str = "x-user-id";

#[derive(Debug, Deserialize)]
pub struct CreateSubmissionRequest {
    pub organization_id: String,
    pub invoice_data: InvoiceData,
    pub file_name: String,
    pub file_base64: String,
    #[serde(default)]
    pub reviewer_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RequestChangesRequest {
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct AddReviewerRequest {
    pub reviewer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResubmitRequest {
    pub invoice_data: InvoiceData,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_base64: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub organization_id: String,
}

/// Router builder exposing submission, review and export endpoints.
pub fn review_router<S, D>(workflow: Arc<ReviewWorkflow<S, D>>) -> Router
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/submissions",
            post(create_handler::<S, D>).get(list_handler::<S, D>),
        )
        .route("/api/v1/submissions/:submission_id", get(detail_handler::<S, D>))
        .route(
            "/api/v1/submissions/:submission_id/approve",
            post(approve_handler::<S, D>),
        )
        .route(
            "/api/v1/submissions/:submission_id/reject",
            post(reject_handler::<S, D>),
        )
        .route(
            "/api/v1/submissions/:submission_id/request-changes",
            post(request_changes_handler::<S, D>),
        )
        .route(
            "/api/v1/submissions/:submission_id/reviewers",
            post(add_reviewer_handler::<S, D>),
        )
        .route(
            "/api/v1/submissions/:submission_id/resubmit",
            post(resubmit_handler::<S, D>),
        )
        .route(
            "/api/v1/submissions/:submission_id/export",
            post(export_handler::<S, D>),
        )
        .route(
            "/api/v1/submissions/:submission_id/delete",
            post(delete_handler::<S, D>),
        )
        .with_state(workflow)
}

pub(crate) async fn create_handler<S, D>(
    State(workflow): State<Arc<ReviewWorkflow<S, D>>>,
    headers: HeaderMap,
    Json(request): Json<CreateSubmissionRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    let actor = match actor(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let bytes = match STANDARD.decode(request.file_base64.as_bytes()) {
        Ok(bytes) => bytes,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "file_base64 is not valid base64"),
    };

    let create = CreateSubmission {
        organization: OrganizationId(request.organization_id),
        invoice_data: request.invoice_data,
        file: UploadedFile::new(request.file_name, bytes),
        reviewer_ids: request.reviewer_ids.into_iter().map(UserId).collect(),
    };
    match workflow.submissions.create(&actor, create) {
        Ok(record) => (
            StatusCode::CREATED,
            Json(ReviewOutcome::snapshot(&record, &actor)),
        )
            .into_response(),
        Err(err) => submission_failure(err),
    }
}

pub(crate) async fn list_handler<S, D>(
    State(workflow): State<Arc<ReviewWorkflow<S, D>>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    let actor = match actor(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let organization = OrganizationId(query.organization_id);
    match workflow.submissions.list(&organization, &actor) {
        Ok(submissions) => Json(json!({ "submissions": submissions })).into_response(),
        Err(err) => submission_failure(err),
    }
}

pub(crate) async fn detail_handler<S, D>(
    State(workflow): State<Arc<ReviewWorkflow<S, D>>>,
    Path(submission_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    let actor = match actor(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match workflow.submissions.get(SubmissionId(submission_id), &actor) {
        Ok(detail) => Json(detail).into_response(),
        Err(err) => submission_failure(err),
    }
}

pub(crate) async fn approve_handler<S, D>(
    State(workflow): State<Arc<ReviewWorkflow<S, D>>>,
    Path(submission_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    decide(&workflow, submission_id, &headers, ReviewAction::Approve, "")
}

pub(crate) async fn reject_handler<S, D>(
    State(workflow): State<Arc<ReviewWorkflow<S, D>>>,
    Path(submission_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    decide(&workflow, submission_id, &headers, ReviewAction::Reject, "")
}

pub(crate) async fn request_changes_handler<S, D>(
    State(workflow): State<Arc<ReviewWorkflow<S, D>>>,
    Path(submission_id): Path<u64>,
    headers: HeaderMap,
    Json(request): Json<RequestChangesRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    decide(
        &workflow,
        submission_id,
        &headers,
        ReviewAction::RequestChanges,
        &request.comment,
    )
}

fn decide<S, D>(
    workflow: &ReviewWorkflow<S, D>,
    submission_id: u64,
    headers: &HeaderMap,
    action: ReviewAction,
    comment: &str,
) -> Response
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    let actor = match actor(headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = SubmissionId(submission_id);
    let submission = match workflow.admin_access(id, &actor) {
        Ok(submission) => submission,
        Err(err) => return access_failure(err),
    };
    if !submission.status.accepts(action) {
        return error_response(
            StatusCode::CONFLICT,
            format!(
                "cannot {} a submission that is {}",
                action.label(),
                submission.status.label()
            ),
        );
    }

    let result = match action {
        ReviewAction::Approve => workflow.reviews.approve(id, &actor),
        ReviewAction::Reject => workflow.reviews.reject(id, &actor),
        ReviewAction::RequestChanges => workflow.reviews.request_changes(id, &actor, comment),
    };
    match result {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => review_failure(err),
    }
}

pub(crate) async fn add_reviewer_handler<S, D>(
    State(workflow): State<Arc<ReviewWorkflow<S, D>>>,
    Path(submission_id): Path<u64>,
    headers: HeaderMap,
    Json(request): Json<AddReviewerRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    let actor = match actor(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = SubmissionId(submission_id);
    let submission = match workflow.admin_access(id, &actor) {
        Ok(submission) => submission,
        Err(err) => return access_failure(err),
    };
    if !submission.status.accepts_new_reviewers() {
        return error_response(
            StatusCode::CONFLICT,
            "reviewers can only be added to pending or approved submissions",
        );
    }

    match workflow
        .reviews
        .add_reviewer(id, &UserId(request.reviewer_id), &actor)
    {
        Ok(added) => Json(added).into_response(),
        Err(err) => review_failure(err),
    }
}

pub(crate) async fn resubmit_handler<S, D>(
    State(workflow): State<Arc<ReviewWorkflow<S, D>>>,
    Path(submission_id): Path<u64>,
    headers: HeaderMap,
    Json(request): Json<ResubmitRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    let actor = match actor(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = SubmissionId(submission_id);
    let (submission, _) = match workflow.access(id, &actor) {
        Ok(access) => access,
        Err(err) => return access_failure(err),
    };
    if !submission.status.accepts_resubmission() {
        return error_response(
            StatusCode::CONFLICT,
            format!("a {} submission cannot be resubmitted", submission.status.label()),
        );
    }

    let file = match (request.file_name, request.file_base64) {
        (_, None) => None,
        (name, Some(encoded)) => match STANDARD.decode(encoded.as_bytes()) {
            Ok(bytes) => Some(UploadedFile::new(name.unwrap_or_default(), bytes)),
            Err(_) => {
                return error_response(StatusCode::BAD_REQUEST, "file_base64 is not valid base64")
            }
        },
    };
    let resubmission = Resubmission {
        invoice_data: request.invoice_data,
        file,
        comment: request.comment,
    };
    match workflow.submissions.resubmit(id, &actor, resubmission) {
        Ok(record) => Json(ReviewOutcome::snapshot(&record, &actor)).into_response(),
        Err(err) => submission_failure(err),
    }
}

pub(crate) async fn export_handler<S, D>(
    State(workflow): State<Arc<ReviewWorkflow<S, D>>>,
    Path(submission_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    let actor = match actor(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = SubmissionId(submission_id);
    if let Err(err) = workflow.access(id, &actor) {
        return access_failure(err);
    }
    match workflow.exports.export(id, &actor) {
        Ok(receipt) => Json(receipt).into_response(),
        Err(err) => export_failure(err),
    }
}

pub(crate) async fn delete_handler<S, D>(
    State(workflow): State<Arc<ReviewWorkflow<S, D>>>,
    Path(submission_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    let actor = match actor(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match workflow.submissions.delete(SubmissionId(submission_id), &actor) {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(err) => submission_failure(err),
    }
}

fn actor(headers: &HeaderMap) -> Result<UserId, Response> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| UserId(value.to_string()))
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "authentication required"))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({ "error": message.into() });
    (status, Json(payload)).into_response()
}

fn internal_error(context: &str, err: &dyn std::error::Error) -> Response {
    error!(error = %err, "{context}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

fn store_failure(err: StoreError) -> Response {
    match err {
        StoreError::NotFound => error_response(StatusCode::NOT_FOUND, err.to_string()),
        StoreError::Contention => error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        other => internal_error("review store failure", &other),
    }
}

fn access_failure(err: AccessError) -> Response {
    match err {
        AccessError::NotFound => error_response(StatusCode::NOT_FOUND, err.to_string()),
        AccessError::AdminRequired => error_response(StatusCode::FORBIDDEN, err.to_string()),
        AccessError::Store(err) => store_failure(err),
    }
}

fn review_failure(err: ReviewError) -> Response {
    match err {
        ReviewError::NotAssigned => error_response(StatusCode::FORBIDDEN, err.to_string()),
        ReviewError::InvalidAction { .. } => error_response(StatusCode::CONFLICT, err.to_string()),
        ReviewError::SelfAssignment
        | ReviewError::InvalidReviewer
        | ReviewError::MissingComment => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        ReviewError::Store(err) => store_failure(err),
    }
}

fn submission_failure(err: SubmissionError) -> Response {
    match err {
        SubmissionError::NotMember | SubmissionError::AccessDenied => {
            error_response(StatusCode::FORBIDDEN, err.to_string())
        }
        SubmissionError::NotFound => error_response(StatusCode::NOT_FOUND, err.to_string()),
        SubmissionError::SelfAssignment | SubmissionError::InvalidReviewer => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        SubmissionError::FileUpload => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        SubmissionError::Store(err) => store_failure(err),
    }
}

fn export_failure(err: ExportError) -> Response {
    match err {
        ExportError::NotApproved | ExportError::AlreadyExported | ExportError::InProgress => {
            error_response(StatusCode::CONFLICT, err.to_string())
        }
        ExportError::PermissionDenied => error_response(StatusCode::FORBIDDEN, err.to_string()),
        ExportError::MissingInvoiceData | ExportError::MissingCredentials => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        ExportError::Sink(_) => {
            error!(error = %err, "export destination failure");
            error_response(StatusCode::BAD_GATEWAY, err.to_string())
        }
        ExportError::Store(err) => store_failure(err),
    }
}
