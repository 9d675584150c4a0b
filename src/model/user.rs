use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Login account as exposed over the API (no password hash)
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct User {
    #[schema(example = 7)]
    pub id: u64,
    #[schema(example = "j.doe")]
    pub username: String,
    #[schema(example = 3)]
    pub role_id: u8,
    #[schema(nullable = true)]
    pub employee_id: Option<u64>,
    pub is_active: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_login_at: Option<DateTime<Utc>>,
}
