use crate::{
    auth::auth::AuthUser,
    bind_values,
    db::TenantDb,
    model::employee::{Employee, EmployeeStatus},
    utils::{
        db_utils::{Filters, Pagination, SqlValue, build_update_sql, execute_update},
        response::{self, ApiError, Page},
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

/// Columns a client may change through `PUT /employees/{id}`
const UPDATABLE_COLUMNS: &[&str] = &[
    "employee_code",
    "first_name",
    "last_name",
    "email",
    "phone",
    "org_unit_id",
    "position",
    "base_salary",
    "allowances",
    "deductions",
    "hire_date",
    "status",
];

const MONEY_COLUMNS: &[&str] = &["base_salary", "allowances", "deductions"];

/// NOT NULL text columns that may not be cleared by an update
const REQUIRED_TEXT_COLUMNS: &[&str] = &["employee_code", "first_name", "last_name"];

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "EMP-3000")]
    pub employee_code: String,
    #[schema(example = "Nusrat")]
    pub first_name: String,
    #[schema(example = "Jahan")]
    pub last_name: String,
    #[schema(example = "nusrat@company.com", format = "email")]
    pub email: String,
    #[schema(example = "+8801712345678")]
    pub phone: Option<String>,
    #[schema(example = 4)]
    pub org_unit_id: Option<u64>,
    #[schema(example = "Quality Inspector")]
    pub position: Option<String>,
    #[schema(example = 38000.0)]
    pub base_salary: f64,
    #[serde(default)]
    #[schema(example = 2500.0)]
    pub allowances: f64,
    #[serde(default)]
    #[schema(example = 800.0)]
    pub deductions: f64,
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub hire_date: NaiveDate,
}

impl CreateEmployee {
    fn validate(&self) -> Result<(), ApiError> {
        if self.employee_code.trim().is_empty()
            || self.first_name.trim().is_empty()
            || self.last_name.trim().is_empty()
        {
            return Err(ApiError::bad_request(
                "employee_code, first_name and last_name are required",
            ));
        }
        if !is_plausible_email(&self.email) {
            return Err(ApiError::bad_request("email is not valid"));
        }
        if [self.base_salary, self.allowances, self.deductions]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(ApiError::bad_request("Salary components must be zero or positive"));
        }
        Ok(())
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

/// Extra checks on the partial update payload beyond the column whitelist
fn validate_update(body: &Value) -> Result<(), ApiError> {
    let Some(obj) = body.as_object() else {
        return Ok(());
    };

    for column in REQUIRED_TEXT_COLUMNS {
        if let Some(value) = obj.get(*column) {
            if value.as_str().map(str::trim).unwrap_or("").is_empty() {
                return Err(ApiError::bad_request(format!("{} cannot be empty", column)));
            }
        }
    }

    if let Some(value) = obj.get("hire_date") {
        let parsed = value
            .as_str()
            .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
            .unwrap_or(false);
        if !parsed {
            return Err(ApiError::bad_request("hire_date must be a date in YYYY-MM-DD format"));
        }
    }

    for column in MONEY_COLUMNS {
        if let Some(value) = obj.get(*column) {
            match value.as_f64() {
                Some(v) if v >= 0.0 => {}
                _ => {
                    return Err(ApiError::bad_request(format!(
                        "{} must be a non-negative number",
                        column
                    )));
                }
            }
        }
    }

    if let Some(status) = obj.get("status") {
        let valid = status
            .as_str()
            .map(|s| s.parse::<EmployeeStatus>().is_ok())
            .unwrap_or(false);
        if !valid {
            return Err(ApiError::bad_request(
                "status must be one of: active, inactive, terminated",
            ));
        }
    }

    if let Some(email) = obj.get("email") {
        if !email.as_str().map(is_plausible_email).unwrap_or(false) {
            return Err(ApiError::bad_request("email is not valid"));
        }
    }

    Ok(())
}

/// Documents the accepted fields; the handler takes a raw JSON object
#[derive(Deserialize, ToSchema)]
pub struct UpdateEmployee {
    pub employee_code: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub org_unit_id: Option<u64>,
    pub position: Option<String>,
    pub base_salary: Option<f64>,
    pub allowances: Option<f64>,
    pub deductions: Option<f64>,
    #[schema(example = "2026-01-01", value_type = Option<String>, format = "date")]
    pub hire_date: Option<NaiveDate>,
    #[schema(example = "inactive")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeQuery {
    /// Page number (1-based)
    pub page: Option<u32>,
    /// Items per page (max 100)
    pub per_page: Option<u32>,
    /// Filter by organization unit
    pub org_unit_id: Option<u64>,
    /// Filter by status
    pub status: Option<String>,
    /// Search by name, email or employee code
    pub search: Option<String>,
}

impl EmployeeQuery {
    fn filters(&self) -> Filters {
        let mut filters = Filters::new();
        filters
            .push_opt("org_unit_id = ?", self.org_unit_id)
            .push_opt("status = ?", self.status.clone());

        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let like = format!("%{}%", search);
            filters.push(
                "(first_name LIKE ? OR last_name LIKE ? OR email LIKE ? OR employee_code LIKE ?)",
                vec![
                    SqlValue::String(like.clone()),
                    SqlValue::String(like.clone()),
                    SqlValue::String(like.clone()),
                    SqlValue::String(like),
                ],
            );
        }
        filters
    }
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub items: Vec<Employee>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 10)]
    pub total: i64,
}

pub(crate) const EMPLOYEE_COLUMNS: &str = "id, employee_code, first_name, last_name, email, phone, \
     org_unit_id, position, base_salary, allowances, deductions, hire_date, status, created_at";

pub(crate) async fn fetch_employee(
    pool: &sqlx::MySqlPool,
    employee_id: u64,
) -> Result<Option<Employee>, sqlx::Error> {
    sqlx::query_as::<_, Employee>(&format!(
        "SELECT {} FROM employees WHERE id = ?",
        EMPLOYEE_COLUMNS
    ))
    .bind(employee_id)
    .fetch_optional(pool)
    .await
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created successfully", body = Object, example = json!({
            "success": true,
            "data": { "id": 12 },
            "message": "Employee created successfully"
        })),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Employee code or email already exists"),
        (status = 500, description = "Internal server error", body = Object, example = json!({
            "success": false,
            "data": null,
            "message": "Something went wrong, Contact with system admin"
        }))
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_employee(
    auth: AuthUser,
    db: TenantDb,
    payload: web::Json<CreateEmployee>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;
    payload.validate()?;

    let result = sqlx::query(
        r#"
        INSERT INTO employees
        (employee_code, first_name, last_name, email, phone, org_unit_id, position,
         base_salary, allowances, deductions, hire_date)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_code.trim())
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(payload.email.trim())
    .bind(&payload.phone)
    .bind(payload.org_unit_id)
    .bind(&payload.position)
    .bind(payload.base_salary)
    .bind(payload.allowances)
    .bind(payload.deductions)
    .bind(payload.hire_date)
    .execute(&db.pool)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => {
            ApiError::conflict("Employee code or email already exists, or org unit is unknown")
        }
        other => other,
    })?;

    let id = result.last_insert_id();
    info!(employee_id = id, tenant = %db.tenant, "Employee created");

    Ok(response::created(json!({ "id": id }), "Employee created successfully"))
}

// -------------------- Handler --------------------

#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse),
        (status = 403, description = "HR/Admin only")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_employees(
    auth: AuthUser,
    db: TenantDb,
    query: web::Query<EmployeeQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;

    let paging = Pagination::new(query.page, query.per_page, 20);
    let filters = query.filters();
    let where_clause = filters.where_clause();

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) FROM employees {}", where_clause);
    debug!(sql = %count_sql, bindings = ?filters.values(), "Counting employees");

    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), filters.values())
        .fetch_one(&db.pool)
        .await?;

    // ---------- data query ----------
    let data_sql = format!(
        "SELECT {} FROM employees {} ORDER BY id DESC LIMIT ? OFFSET ?",
        EMPLOYEE_COLUMNS, where_clause
    );
    debug!(sql = %data_sql, page = paging.page, per_page = paging.per_page, "Fetching employees");

    let items = bind_values!(sqlx::query_as::<_, Employee>(&data_sql), filters.values())
        .bind(paging.limit())
        .bind(paging.offset())
        .fetch_all(&db.pool)
        .await?;

    Ok(response::ok(Page {
        items,
        page: paging.page,
        per_page: paging.per_page,
        total,
    }))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}",
    params(
        ("employee_id" = u64, Path, description = "Employee ID")
    ),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated successfully", body = Object, example = json!({
            "success": true,
            "data": null,
            "message": "Employee updated successfully"
        })),
        (status = 400, description = "Unknown or invalid field"),
        (status = 404, description = "Employee not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_employee(
    auth: AuthUser,
    db: TenantDb,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();

    validate_update(&body)?;
    let update = build_update_sql("employees", &body, UPDATABLE_COLUMNS, "id", employee_id)?;

    let affected = execute_update(&db.pool, update).await?;

    // MySQL reports 0 rows for a no-op update as well, so double check
    if affected == 0 && fetch_employee(&db.pool, employee_id).await?.is_none() {
        return Err(ApiError::not_found("Employee"));
    }

    Ok(response::message("Employee updated successfully"))
}

/// Delete Employee
#[utoipa::path(
    delete,
    path = "/api/employees/{employee_id}",
    params(
        ("employee_id" = u64, Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Employee still has payslips"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_employee(
    auth: AuthUser,
    db: TenantDb,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();

    let result = sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(employee_id)
        .execute(&db.pool)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => {
                ApiError::conflict("Employee is referenced by payslips or org units")
            }
            other => other,
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Employee"));
    }

    info!(employee_id, tenant = %db.tenant, "Employee deleted");
    Ok(response::message("Successfully deleted"))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(
        ("employee_id" = u64, Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 403, description = "Not your record"),
        (status = 404, description = "Employee not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_employee(
    auth: AuthUser,
    db: TenantDb,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = path.into_inner();
    auth.require_employee_access(employee_id)?;

    match fetch_employee(&db.pool, employee_id).await? {
        Some(emp) => Ok(response::ok(emp)),
        None => Err(ApiError::not_found("Employee")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> CreateEmployee {
        CreateEmployee {
            employee_code: "EMP-1".into(),
            first_name: "Rafi".into(),
            last_name: "Karim".into(),
            email: "rafi@acme.test".into(),
            phone: None,
            org_unit_id: Some(2),
            position: None,
            base_salary: 30000.0,
            allowances: 0.0,
            deductions: 0.0,
            hire_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        }
    }

    #[test]
    fn create_payload_validation() {
        assert!(payload().validate().is_ok());

        let mut p = payload();
        p.first_name = "  ".into();
        assert!(p.validate().is_err());

        let mut p = payload();
        p.email = "rafi.acme.test".into();
        assert!(p.validate().is_err());

        let mut p = payload();
        p.deductions = -1.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn email_shape() {
        assert!(is_plausible_email("a@b.co"));
        assert!(!is_plausible_email("@b.co"));
        assert!(!is_plausible_email("a@b"));
        assert!(!is_plausible_email("a@b."));
    }

    #[test]
    fn update_payload_checks_money_status_and_email() {
        assert!(validate_update(&json!({ "base_salary": 100.5, "status": "inactive" })).is_ok());
        assert!(validate_update(&json!({ "allowances": -5 })).is_err());
        assert!(validate_update(&json!({ "deductions": "lots" })).is_err());
        assert!(validate_update(&json!({ "status": "retired" })).is_err());
        assert!(validate_update(&json!({ "email": "nope" })).is_err());
    }

    #[test]
    fn update_payload_cannot_clear_required_columns() {
        assert!(validate_update(&json!({ "first_name": "Nadia", "hire_date": "2025-02-10" })).is_ok());
        assert!(validate_update(&json!({ "first_name": "" })).is_err());
        assert!(validate_update(&json!({ "last_name": "   " })).is_err());
        assert!(validate_update(&json!({ "employee_code": null })).is_err());
        assert!(validate_update(&json!({ "hire_date": null })).is_err());
        assert!(validate_update(&json!({ "hire_date": "yesterday" })).is_err());
        assert!(validate_update(&json!({ "hire_date": "2025-02-30" })).is_err());
    }

    #[test]
    fn query_builds_search_over_four_columns() {
        let query = EmployeeQuery {
            page: None,
            per_page: None,
            org_unit_id: Some(3),
            status: None,
            search: Some(" jah ".into()),
        };
        let filters = query.filters();
        assert!(filters.where_clause().starts_with("WHERE org_unit_id = ? AND (first_name LIKE ?"));
        assert_eq!(filters.values().len(), 5);
        assert_eq!(filters.values()[1], SqlValue::String("%jah%".into()));
    }

    #[test]
    fn blank_search_is_ignored() {
        let query = EmployeeQuery {
            page: None,
            per_page: None,
            org_unit_id: None,
            status: None,
            search: Some("   ".into()),
        };
        assert_eq!(query.filters().where_clause(), "");
    }
}
