use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EmployeeStatus {
    Active,
    Inactive,
    Terminated,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "employee_code": "EMP-001",
        "first_name": "John",
        "last_name": "Doe",
        "email": "john.doe@company.com",
        "phone": "+8801712345678",
        "org_unit_id": 10,
        "position": "Line Supervisor",
        "base_salary": 42000.0,
        "allowances": 3500.0,
        "deductions": 1200.0,
        "hire_date": "2024-01-01",
        "status": "active",
        "created_at": "2024-01-01T08:00:00Z"
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "EMP-001")]
    pub employee_code: String,

    #[schema(example = "John")]
    pub first_name: String,

    #[schema(example = "Doe")]
    pub last_name: String,

    #[schema(example = "john.doe@company.com")]
    pub email: String,

    #[schema(example = "+8801712345678", nullable = true)]
    pub phone: Option<String>,

    #[schema(example = 10, nullable = true)]
    pub org_unit_id: Option<u64>,

    #[schema(example = "Line Supervisor", nullable = true)]
    pub position: Option<String>,

    #[schema(example = 42000.0)]
    pub base_salary: f64,

    #[schema(example = 3500.0)]
    pub allowances: f64,

    #[schema(example = 1200.0)]
    pub deductions: f64,

    #[schema(
        example = "2024-01-01",
        value_type = String,
        format = "date"
    )]
    pub hire_date: NaiveDate,

    #[schema(example = "active")]
    pub status: String,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
