use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Materialized monthly view over the ledger. Never edited by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceStatsMonthly {
    pub user_id: u64,
    pub school_id: u64,
    pub academic_year_id: u64,
    #[schema(example = 1)]
    pub month: u32,
    #[schema(example = 2024)]
    pub year: i32,
    pub total_present: u32,
    pub total_absent: u32,
    pub total_half_day: u32,
    pub total_late: u32,
    pub total_leaves: u32,
    #[schema(example = 87.5)]
    pub attendance_percentage: f64,
    #[schema(value_type = String, format = "date-time")]
    pub last_calculated: DateTime<Utc>,
}

impl AttendanceStatsMonthly {
    pub fn total_days(&self) -> u32 {
        self.total_present + self.total_absent + self.total_half_day + self.total_late + self.total_leaves
    }
}
