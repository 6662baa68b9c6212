use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[allow(unused_imports)]
use crate::model::attendance::AttendanceRecord;
use crate::engine::{AttendanceEngine, ledger::Capture};

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FindQuery {
    /// User whose ledger rows are listed
    pub user_id: u64,
    #[param(value_type = String, format = Date, example = "2024-01-01")]
    pub start_date: NaiveDate,
    #[param(value_type = String, format = Date, example = "2024-01-31")]
    pub end_date: NaiveDate,
}

#[derive(Deserialize, ToSchema)]
pub struct SelfMark {
    #[schema(example = 1000)]
    pub user_id: u64,
    #[schema(example = "Biometric device offline")]
    pub remarks: Option<String>,
}

/// Capture or overwrite one attendance mark
#[utoipa::path(
    post,
    path = "/api/schools/{school_id}/attendance",
    params(("school_id" = u64, Path, description = "School id")),
    request_body(content = Capture, content_type = "application/json"),
    responses(
        (status = 200, description = "Stored attendance record", body = AttendanceRecord),
        (status = 400, description = "Malformed payload"),
        (status = 409, description = "Record already approved or rejected"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn capture_attendance(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<u64>,
    payload: web::Json<Capture>,
) -> actix_web::Result<impl Responder> {
    let record = engine
        .capture_or_upsert(path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(record))
}

/// List one user's attendance in a date range
#[utoipa::path(
    get,
    path = "/api/schools/{school_id}/attendance",
    params(("school_id" = u64, Path, description = "School id"), FindQuery),
    responses(
        (status = 200, description = "Records ordered by date", body = Vec<AttendanceRecord>),
        (status = 400, description = "Invalid range"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn find_attendance(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<u64>,
    query: web::Query<FindQuery>,
) -> actix_web::Result<impl Responder> {
    let query = query.into_inner();
    let records = engine
        .find(path.into_inner(), query.user_id, query.start_date, query.end_date)
        .await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/schools/{school_id}/attendance/check-in",
    params(("school_id" = u64, Path, description = "School id")),
    request_body = SelfMark,
    responses(
        (status = 200, description = "Checked in successfully", body = AttendanceRecord),
        (status = 400, description = "Today is not a working day", body = Object, example = json!({
            "error": "NOT_WORKING_DAY",
            "message": "2024-01-26 is not a working day (HOLIDAY)",
            "context": { "date": "2024-01-26", "day_type": "HOLIDAY" }
        })),
        (status = 409, description = "Already checked in today"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<u64>,
    payload: web::Json<SelfMark>,
) -> actix_web::Result<impl Responder> {
    let SelfMark { user_id, remarks } = payload.into_inner();
    let record = engine.check_in(path.into_inner(), user_id, remarks).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/schools/{school_id}/attendance/check-out",
    params(("school_id" = u64, Path, description = "School id")),
    request_body = SelfMark,
    responses(
        (status = 200, description = "Checked out successfully", body = AttendanceRecord),
        (status = 409, description = "No check-in today or already checked out", body = Object, example = json!({
            "error": "NO_CHECK_IN",
            "message": "no check-in found for 2024-01-10",
            "context": { "date": "2024-01-10" }
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<u64>,
    payload: web::Json<SelfMark>,
) -> actix_web::Result<impl Responder> {
    let SelfMark { user_id, remarks } = payload.into_inner();
    let record = engine.check_out(path.into_inner(), user_id, remarks).await?;
    Ok(HttpResponse::Ok().json(record))
}
