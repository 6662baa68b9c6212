use actix_web::{HttpResponse, Responder, web};

#[allow(unused_imports)]
use crate::engine::{
    approval::BatchOutcome,
    regularization::{PendingPage, RegularizationReceipt},
};
use crate::engine::{
    AttendanceEngine,
    approval::ApprovalBatch,
    regularization::{PendingFilter, RegularizationRequest},
};

/* =========================
Request a correction
========================= */
#[utoipa::path(
    put,
    path = "/api/schools/{school_id}/attendance/regularization",
    params(("school_id" = u64, Path, description = "School id")),
    request_body(
        content = RegularizationRequest,
        description = "Correction for a past day",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Request is pending approval", body = RegularizationReceipt),
        (status = 400, description = "Missing field or date not in the past", body = Object, example = json!({
            "error": "INVALID_DATE",
            "message": "regularization is only allowed for past dates (2024-01-10 is not before 2024-01-10)",
            "context": { "date": "2024-01-10", "today": "2024-01-10" }
        })),
        (status = 409, description = "Record already approved or rejected"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Regularization"
)]
pub async fn request_regularization(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<u64>,
    payload: web::Json<RegularizationRequest>,
) -> actix_web::Result<impl Responder> {
    let receipt = engine
        .request_regularization(path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(receipt))
}

/* =========================
List requests
========================= */
#[utoipa::path(
    get,
    path = "/api/schools/{school_id}/attendance/regularization",
    params(("school_id" = u64, Path, description = "School id"), PendingFilter),
    responses(
        (status = 200, description = "Paginated regularization requests", body = PendingPage),
        (status = 400, description = "Unknown status literal"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Regularization"
)]
pub async fn list_regularizations(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<u64>,
    query: web::Query<PendingFilter>,
) -> actix_web::Result<impl Responder> {
    let page = engine
        .list_pending(path.into_inner(), query.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/* =========================
Approve / reject in bulk
========================= */
#[utoipa::path(
    post,
    path = "/api/schools/{school_id}/attendance/regularization",
    params(("school_id" = u64, Path, description = "School id")),
    request_body = ApprovalBatch,
    responses(
        (status = 200, description = "Batch committed", body = BatchOutcome, example = json!({
            "approved": [{ "attendance_id": 41, "user_id": 1000, "date": "2024-01-10" }],
            "rejected": [],
            "failed": [{
                "attendance_id": 99,
                "reason": "UNAUTHORIZED",
                "message": "attendance record 99 belongs to school 2, not 1"
            }]
        })),
        (status = 400, description = "Unknown action or empty batch"),
        (status = 409, description = "A record in the batch was already decided"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Regularization"
)]
pub async fn process_approvals(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<u64>,
    payload: web::Json<ApprovalBatch>,
) -> actix_web::Result<impl Responder> {
    let outcome = engine
        .process_approvals(path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}
