use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[allow(unused_imports)]
use crate::engine::{
    dashboard::Dashboard,
    stats::{RecalculateSummary, UserStats},
};
use crate::engine::{AttendanceEngine, dashboard::DashboardFilter, stats::RecalculateRequest};

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    #[param(example = 1)]
    pub month: Option<u32>,
    #[param(example = 2024)]
    pub year: Option<i32>,
}

#[derive(Serialize, ToSchema)]
pub struct StreakResponse {
    #[schema(example = 1000)]
    pub user_id: u64,
    #[schema(example = 12)]
    pub streak: u32,
    #[schema(example = "2024-01-10", format = "date", value_type = String)]
    pub as_of: chrono::NaiveDate,
}

#[utoipa::path(
    get,
    path = "/api/schools/{school_id}/attendance/dashboard",
    params(("school_id" = u64, Path, description = "School id"), DashboardFilter),
    responses(
        (status = 200, description = "Dashboard for the day or range", body = Dashboard),
        (status = 400, description = "Incomplete or inverted range"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Dashboard"
)]
pub async fn dashboard(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<u64>,
    query: web::Query<DashboardFilter>,
) -> actix_web::Result<impl Responder> {
    let dashboard = engine
        .dashboard(path.into_inner(), query.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(&*dashboard))
}

#[utoipa::path(
    get,
    path = "/api/schools/{school_id}/attendance/streak/{user_id}",
    params(
        ("school_id" = u64, Path, description = "School id"),
        ("user_id" = u64, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "Consecutive present days ending today", body = StreakResponse),
        (status = 500, description = "Internal server error")
    ),
    tag = "Dashboard"
)]
pub async fn streak(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<(u64, u64)>,
) -> actix_web::Result<impl Responder> {
    let (school_id, user_id) = path.into_inner();
    let streak = engine.streak(school_id, user_id).await?;
    Ok(HttpResponse::Ok().json(StreakResponse {
        user_id,
        streak,
        as_of: engine.today(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/schools/{school_id}/attendance/stats/{user_id}",
    params(
        ("school_id" = u64, Path, description = "School id"),
        ("user_id" = u64, Path, description = "User id"),
        StatsQuery
    ),
    responses(
        (status = 200, description = "Monthly and yearly statistics", body = UserStats),
        (status = 404, description = "No active academic year"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Statistics"
)]
pub async fn user_stats(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<(u64, u64)>,
    query: web::Query<StatsQuery>,
) -> actix_web::Result<impl Responder> {
    let (school_id, user_id) = path.into_inner();
    let StatsQuery { month, year } = query.into_inner();
    let stats = engine.user_stats(school_id, user_id, month, year).await?;
    Ok(HttpResponse::Ok().json(stats))
}

#[utoipa::path(
    post,
    path = "/api/schools/{school_id}/attendance/stats/recalculate",
    params(("school_id" = u64, Path, description = "School id")),
    request_body = RecalculateRequest,
    responses(
        (status = 200, description = "Rows rewritten", body = RecalculateSummary),
        (status = 400, description = "Invalid month"),
        (status = 404, description = "No active academic year"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Statistics"
)]
pub async fn recalculate(
    engine: web::Data<AttendanceEngine>,
    path: web::Path<u64>,
    payload: web::Json<RecalculateRequest>,
) -> actix_web::Result<impl Responder> {
    let summary = engine
        .recalculate(path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(summary))
}
