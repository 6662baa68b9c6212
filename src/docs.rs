use crate::api::{
    attendance::SelfMark,
    dashboard::StreakResponse,
};
use crate::engine::{
    approval::{ApprovalBatch, BatchOutcome, DecidedItem, FailedItem, FailureReason},
    dashboard::{
        ClassBreakdown, Dashboard, DashboardWindow, LowAttendanceAlert, RecordPage, RecordView,
        RoleBreakdown, StatusCounts, TodayOverview, TrendPoint,
    },
    ledger::Capture,
    regularization::{
        Pagination, PendingItem, PendingPage, RegularizationReceipt, RegularizationRequest,
    },
    stats::{RecalculateRequest, RecalculateSummary, UserStats, YearSummary},
};
use crate::model::{
    attendance::{
        ApprovalStatus, AttendanceRecord, AttendanceStatus, CaptureAttrs, NewDocument,
        RegularizationDocument,
    },
    calendar::{AcademicYear, DayType},
    member::Member,
    role::Role,
    stats::AttendanceStatsMonthly,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Engine API",
        version = "0.1.0",
        description = r#"
## Attendance Ledger & Regularization Engine

Day-by-day attendance for every member of a school, with a correction
workflow for past days and the read models built on top of it.

### 🔹 Key Features
- **Ledger**
  - Capture marks, self check-in and check-out, per-user history
- **Regularization**
  - Request corrections for past days, list them, approve or reject in bulk
- **Statistics**
  - Monthly statistics per academic year, streaks, forced recompute
- **Dashboard**
  - Daily or ranged overview, role and class breakdowns, low attendance alerts

### 📦 Response Format
- JSON-based RESTful responses
- Errors carry `error`, `message` and `context`
- Pagination supported for the regularization list and the dashboard records

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::capture_attendance,
        crate::api::attendance::find_attendance,
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,

        crate::api::regularization::request_regularization,
        crate::api::regularization::list_regularizations,
        crate::api::regularization::process_approvals,

        crate::api::dashboard::dashboard,
        crate::api::dashboard::streak,
        crate::api::dashboard::user_stats,
        crate::api::dashboard::recalculate
    ),
    components(
        schemas(
            AttendanceRecord,
            AttendanceStatus,
            ApprovalStatus,
            CaptureAttrs,
            Capture,
            SelfMark,
            NewDocument,
            RegularizationDocument,
            RegularizationRequest,
            RegularizationReceipt,
            PendingItem,
            PendingPage,
            Pagination,
            Member,
            Role,
            DayType,
            AcademicYear,
            ApprovalBatch,
            BatchOutcome,
            DecidedItem,
            FailedItem,
            FailureReason,
            AttendanceStatsMonthly,
            RecalculateRequest,
            RecalculateSummary,
            YearSummary,
            UserStats,
            StreakResponse,
            Dashboard,
            DashboardWindow,
            TodayOverview,
            StatusCounts,
            RoleBreakdown,
            ClassBreakdown,
            TrendPoint,
            LowAttendanceAlert,
            RecordView,
            RecordPage
        )
    ),
    tags(
        (name = "Attendance", description = "Attendance ledger APIs"),
        (name = "Regularization", description = "Correction requests and approvals"),
        (name = "Statistics", description = "Monthly statistics APIs"),
        (name = "Dashboard", description = "Dashboard and streak APIs"),
    )
)]
pub struct ApiDoc;
