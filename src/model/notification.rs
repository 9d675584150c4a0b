use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Payslip,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Notification {
    #[schema(example = 501)]
    pub id: u64,
    #[schema(example = 7)]
    pub user_id: u64,
    #[schema(example = "Payslip ready")]
    pub title: String,
    #[schema(example = "Your payslip for February 2025 is available.")]
    pub message: String,
    #[schema(example = "payslip")]
    pub kind: String,
    #[schema(example = false)]
    pub is_read: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
