use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    HalfDay,
    OnLeave,
}

impl AttendanceStatus {
    /// Statuses that keep a consecutive-presence streak alive.
    pub fn counts_as_present(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    None,
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    /// Approved and rejected records are frozen against further edits.
    pub fn is_terminal(self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 41)]
    pub id: u64,
    #[schema(example = 1)]
    pub school_id: u64,
    #[schema(example = 1000)]
    pub user_id: u64,
    #[schema(example = "2024-01-10", value_type = String, format = "date")]
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub marked_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub marked_at: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out_time: Option<DateTime<Utc>>,
    pub working_hours: Option<f64>,
    pub is_late_check_in: bool,
    pub late_by_minutes: Option<u32>,
    pub remarks: Option<String>,
    pub requires_approval: bool,
    pub approval_status: ApprovalStatus,
    pub approved_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_remarks: Option<String>,
}

/// Row to be inserted into the ledger; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub school_id: u64,
    pub user_id: u64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub marked_by: u64,
    pub marked_at: DateTime<Utc>,
    pub attrs: CaptureAttrs,
    pub requires_approval: bool,
    pub approval_status: ApprovalStatus,
}

impl NewAttendance {
    pub fn into_record(self, id: u64) -> AttendanceRecord {
        AttendanceRecord {
            id,
            school_id: self.school_id,
            user_id: self.user_id,
            date: self.date,
            status: self.status,
            marked_by: self.marked_by,
            marked_at: self.marked_at,
            check_in_time: self.attrs.check_in_time,
            check_out_time: self.attrs.check_out_time,
            working_hours: self.attrs.working_hours,
            is_late_check_in: self.attrs.is_late_check_in.unwrap_or(false),
            late_by_minutes: self.attrs.late_by_minutes,
            remarks: self.attrs.remarks,
            requires_approval: self.requires_approval,
            approval_status: self.approval_status,
            approved_by: None,
            approved_at: None,
            approval_remarks: None,
        }
    }
}

/// Optional telemetry carried by a capture. `None` means "not supplied":
/// the stored value is kept.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, ToSchema)]
pub struct CaptureAttrs {
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in_time: Option<DateTime<Utc>>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out_time: Option<DateTime<Utc>>,
    pub working_hours: Option<f64>,
    pub is_late_check_in: Option<bool>,
    pub late_by_minutes: Option<u32>,
    pub remarks: Option<String>,
}

impl CaptureAttrs {
    /// Overlays the supplied fields onto an existing record.
    pub fn apply_to(&self, record: &mut AttendanceRecord) {
        if let Some(t) = self.check_in_time {
            record.check_in_time = Some(t);
        }
        if let Some(t) = self.check_out_time {
            record.check_out_time = Some(t);
        }
        if let Some(h) = self.working_hours {
            record.working_hours = Some(h);
        }
        if let Some(late) = self.is_late_check_in {
            record.is_late_check_in = late;
        }
        if let Some(m) = self.late_by_minutes {
            record.late_by_minutes = Some(m);
        }
        if let Some(r) = &self.remarks {
            record.remarks = Some(r.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct RegularizationDocument {
    pub id: u64,
    pub attendance_id: u64,
    #[schema(example = "MEDICAL_CERTIFICATE")]
    pub document_type: String,
    #[schema(example = "https://files.example.com/cert.pdf")]
    pub file_url: String,
    #[schema(example = "cert.pdf")]
    pub file_name: String,
    #[schema(value_type = String, format = "date-time")]
    pub uploaded_at: DateTime<Utc>,
}

/// Evidence supplied with a regularization request.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
pub struct NewDocument {
    #[serde(rename = "type")]
    #[schema(example = "MEDICAL_CERTIFICATE")]
    pub document_type: String,
    #[schema(example = "https://files.example.com/cert.pdf")]
    pub url: String,
    #[schema(example = "cert.pdf")]
    pub name: String,
}
