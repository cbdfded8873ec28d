use crate::infra::AppState;
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use invoice_review::error::AppError;
use invoice_review::workflows::intake::{ExtractionId, FieldMap};
use invoice_review::workflows::vat::{classify, ScenarioFamily, VatScenario};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
pub(crate) struct ClassifyResponse {
    pub(crate) scenario: Option<VatScenario>,
    pub(crate) family: Option<ScenarioFamily>,
}

pub(crate) fn with_service_routes(review: Router) -> Router {
    review
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/classify", post(classify_endpoint))
        .route("/api/v1/extractions", post(submit_extraction_endpoint))
        .route(
            "/api/v1/extractions/:extraction_id",
            get(extraction_status_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<Value> {
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

/// Classify a field map synchronously. `scenario` is `null` when the fields do not
/// determine a treatment.
pub(crate) async fn classify_endpoint(
    Json(payload): Json<Value>,
) -> Result<Json<ClassifyResponse>, AppError> {
    let fields = FieldMap::from_extraction(&payload)?;
    let scenario = classify(&fields);
    Ok(Json(ClassifyResponse {
        scenario,
        family: scenario.map(VatScenario::family),
    }))
}

pub(crate) async fn submit_extraction_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<Value>,
) -> Response {
    let id = state.intake.submit(payload);
    (
        StatusCode::ACCEPTED,
        Json(json!({ "extraction_id": id })),
    )
        .into_response()
}

pub(crate) async fn extraction_status_endpoint(
    Extension(state): Extension<AppState>,
    Path(extraction_id): Path<String>,
) -> Response {
    match state.intake.status(&ExtractionId(extraction_id)) {
        Some(status) => Json(status).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "extraction not found" })),
        )
            .into_response(),
    }
}
