use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    LeaveApproved,
    LeaveRejected,
}

/// Outbox row picked up by the external dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceNotification {
    pub id: u64,
    pub school_id: u64,
    pub user_id: u64,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[schema(value_type = String, format = "date-time")]
    pub scheduled_for: DateTime<Utc>,
    #[schema(example = "PENDING")]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub school_id: u64,
    pub user_id: u64,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub scheduled_for: DateTime<Utc>,
}

impl NewNotification {
    pub fn into_notification(self, id: u64) -> AttendanceNotification {
        AttendanceNotification {
            id,
            school_id: self.school_id,
            user_id: self.user_id,
            notification_type: self.notification_type,
            title: self.title,
            message: self.message,
            scheduled_for: self.scheduled_for,
            status: "PENDING".to_string(),
        }
    }
}
