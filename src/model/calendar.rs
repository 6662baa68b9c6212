use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DayType {
    WorkingDay,
    Holiday,
    Weekend,
    Vacation,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DayInfo {
    pub day_type: DayType,
    #[schema(example = "Republic Day", nullable = true)]
    pub holiday_name: Option<String>,
}

impl DayInfo {
    pub fn working() -> Self {
        Self {
            day_type: DayType::WorkingDay,
            holiday_name: None,
        }
    }

    pub fn is_working_day(&self) -> bool {
        self.day_type == DayType::WorkingDay
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct AcademicYear {
    pub id: u64,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
}
