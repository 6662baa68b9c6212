use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize, Display,
    EnumString, EnumIter, ToSchema,
)]
pub enum Role {
    Admin = 1,
    TeachingStaff = 2,
    NonTeachingStaff = 3,
    Student = 4,
    Parent = 5,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::TeachingStaff),
            3 => Some(Role::NonTeachingStaff),
            4 => Some(Role::Student),
            5 => Some(Role::Parent),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Roles whose members are expected to mark attendance.
    pub fn tracks_attendance(self) -> bool {
        !matches!(self, Role::Parent)
    }
}
