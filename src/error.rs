use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::NaiveDate;
use serde_json::json;
use thiserror::Error;

use crate::model::{attendance::ApprovalStatus, calendar::DayType};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("attendance record {id} not found")]
    NotFound { id: u64 },
    #[error("attendance record {id} belongs to school {actual_school}, not {expected_school}")]
    Authorization {
        id: u64,
        expected_school: u64,
        actual_school: u64,
    },
    #[error("regularization is only allowed for past dates ({date} is not before {today})")]
    InvalidDate { date: NaiveDate, today: NaiveDate },
    #[error("attendance record {id} is already {approval_status}")]
    Conflict {
        id: u64,
        approval_status: ApprovalStatus,
    },
    #[error("invalid action {action:?}, expected APPROVE or REJECT")]
    InvalidAction { action: String },
    #[error("school {school_id} has no active academic year")]
    NoActiveAcademicYear { school_id: u64 },
    #[error("{date} is not a working day ({day_type})")]
    NotWorkingDay { date: NaiveDate, day_type: DayType },
    #[error("already checked in on {date}")]
    AlreadyCheckedIn { date: NaiveDate },
    #[error("no check-in found for {date}")]
    NoCheckIn { date: NaiveDate },
    #[error("already checked out on {date}")]
    AlreadyCheckedOut { date: NaiveDate },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "VALIDATION_ERROR",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::Authorization { .. } => "AUTHORIZATION_ERROR",
            EngineError::InvalidDate { .. } => "INVALID_DATE",
            EngineError::Conflict { .. } => "CONFLICT",
            EngineError::InvalidAction { .. } => "INVALID_ACTION",
            EngineError::NoActiveAcademicYear { .. } => "NO_ACTIVE_ACADEMIC_YEAR",
            EngineError::NotWorkingDay { .. } => "NOT_WORKING_DAY",
            EngineError::AlreadyCheckedIn { .. } => "ALREADY_CHECKED_IN",
            EngineError::NoCheckIn { .. } => "NO_CHECK_IN",
            EngineError::AlreadyCheckedOut { .. } => "ALREADY_CHECKED_OUT",
            EngineError::Database(_) => "DATABASE_ERROR",
            EngineError::Unavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    /// Errors a batch approval records per item instead of aborting.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. } | EngineError::Authorization { .. }
        )
    }

    pub fn is_infrastructure(&self) -> bool {
        matches!(self, EngineError::Database(_) | EngineError::Unavailable(_))
    }

    fn context(&self) -> serde_json::Value {
        match self {
            EngineError::Validation { field, .. } => json!({ "field": field }),
            EngineError::NotFound { id } => json!({ "id": id }),
            EngineError::Authorization {
                id,
                expected_school,
                actual_school,
            } => json!({
                "id": id,
                "expected_school": expected_school,
                "actual_school": actual_school,
            }),
            EngineError::InvalidDate { date, today } => json!({ "date": date, "today": today }),
            EngineError::Conflict {
                id,
                approval_status,
            } => json!({ "id": id, "approval_status": approval_status }),
            EngineError::InvalidAction { action } => json!({ "action": action }),
            EngineError::NoActiveAcademicYear { school_id } => json!({ "school_id": school_id }),
            EngineError::NotWorkingDay { date, day_type } => {
                json!({ "date": date, "day_type": day_type })
            }
            EngineError::AlreadyCheckedIn { date }
            | EngineError::NoCheckIn { date }
            | EngineError::AlreadyCheckedOut { date } => json!({ "date": date }),
            EngineError::Database(_) | EngineError::Unavailable(_) => json!({}),
        }
    }
}

impl ResponseError for EngineError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation { .. }
            | EngineError::InvalidDate { .. }
            | EngineError::InvalidAction { .. }
            | EngineError::NotWorkingDay { .. } => StatusCode::BAD_REQUEST,
            EngineError::Authorization { .. } => StatusCode::FORBIDDEN,
            EngineError::NotFound { .. } | EngineError::NoActiveAcademicYear { .. } => {
                StatusCode::NOT_FOUND
            }
            EngineError::Conflict { .. }
            | EngineError::AlreadyCheckedIn { .. }
            | EngineError::NoCheckIn { .. }
            | EngineError::AlreadyCheckedOut { .. } => StatusCode::CONFLICT,
            EngineError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Driver messages stay in the logs.
        let message = if self.is_infrastructure() {
            tracing::error!(error = %self, "Attendance store failure");
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": self.kind(),
            "message": message,
            "context": self.context(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lookup_failures_are_item_level() {
        assert!(EngineError::NotFound { id: 1 }.is_item_level());
        assert!(
            EngineError::Authorization {
                id: 1,
                expected_school: 1,
                actual_school: 2
            }
            .is_item_level()
        );
        assert!(
            !EngineError::Conflict {
                id: 1,
                approval_status: ApprovalStatus::Approved
            }
            .is_item_level()
        );
        assert!(!EngineError::Unavailable("down".into()).is_item_level());
    }

    #[test]
    fn status_codes_follow_error_class() {
        assert_eq!(
            EngineError::validation("reason", "is required").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::Conflict {
                id: 9,
                approval_status: ApprovalStatus::Rejected
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EngineError::Unavailable("pool closed".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
