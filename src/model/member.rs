use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::role::Role;

/// Directory view of a school user, used to enrich ledger rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Member {
    #[schema(example = 1000)]
    pub user_id: u64,
    #[schema(example = "Asha Rao")]
    pub name: String,
    pub role: Role,
    #[schema(example = 7, nullable = true)]
    pub class_id: Option<u64>,
    #[schema(example = "Grade 5", nullable = true)]
    pub class_name: Option<String>,
    #[schema(example = "B", nullable = true)]
    pub section: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct SchoolClass {
    #[schema(example = 7)]
    pub id: u64,
    #[schema(example = "Grade 5")]
    pub class_name: String,
}
