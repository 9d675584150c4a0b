use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    bind_values,
    db::TenantDb,
    model::payroll_period::{
        PayrollPeriod, PeriodAction, PeriodStatus, default_name, resolve_dates, validate_dates,
    },
    utils::{
        db_utils::{Filters, Pagination, double_option},
        response::{self, ApiError, Page},
    },
};

pub(crate) const PERIOD_COLUMNS: &str =
    "id, code, name, start_date, end_date, pay_date, status, created_at";

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreatePeriod {
    #[schema(example = "2025-02")]
    pub code: String,
    /// Defaults to the month name, e.g. "February 2025"
    pub name: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    #[schema(example = "2025-03-05", value_type = Option<String>, format = "date")]
    pub pay_date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePeriod {
    pub name: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub start_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<NaiveDate>,
    /// `null` clears the pay date
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = "date")]
    pub pay_date: Option<Option<NaiveDate>>,
}

#[derive(Deserialize, IntoParams)]
pub struct PeriodQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// draft, open or closed
    pub status: Option<String>,
}

pub(crate) async fn fetch_period(
    pool: &MySqlPool,
    period_id: u64,
) -> Result<Option<PayrollPeriod>, sqlx::Error> {
    sqlx::query_as::<_, PayrollPeriod>(&format!(
        "SELECT {} FROM payroll_periods WHERE id = ?",
        PERIOD_COLUMNS
    ))
    .bind(period_id)
    .fetch_optional(pool)
    .await
}

/// Load a period and parse its status; unknown stored values are a server error
pub(crate) async fn period_with_status(
    pool: &MySqlPool,
    period_id: u64,
) -> Result<(PayrollPeriod, PeriodStatus), ApiError> {
    let period = fetch_period(pool, period_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Payroll period"))?;

    let status = period.status().ok_or_else(|| {
        tracing::error!(period_id, status = %period.status, "Unknown payroll period status");
        ApiError::internal()
    })?;

    Ok((period, status))
}

/// Create Payroll Period
#[utoipa::path(
    post,
    path = "/api/payroll-periods",
    request_body = CreatePeriod,
    responses(
        (status = 201, description = "Period created as draft"),
        (status = 400, description = "Invalid code or dates"),
        (status = 409, description = "Period code already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn create_period(
    auth: AuthUser,
    db: TenantDb,
    payload: web::Json<CreatePeriod>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;

    let code = payload.code.trim();
    let (start, end) = resolve_dates(code, payload.start_date, payload.end_date, payload.pay_date)
        .map_err(ApiError::bad_request)?;

    let name = match payload.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => default_name(start),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO payroll_periods (code, name, start_date, end_date, pay_date, status)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(code)
    .bind(&name)
    .bind(start)
    .bind(end)
    .bind(payload.pay_date)
    .bind(PeriodStatus::Draft.to_string())
    .execute(&db.pool)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict(format!("Payroll period {} already exists", code)),
        other => other,
    })?;

    info!(period_id = result.last_insert_id(), code, tenant = %db.tenant, "Payroll period created");

    Ok(response::created(
        json!({ "id": result.last_insert_id(), "name": name }),
        "Payroll period created",
    ))
}

/// List Payroll Periods
#[utoipa::path(
    get,
    path = "/api/payroll-periods",
    params(PeriodQuery),
    responses(
        (status = 200, description = "Paginated periods, newest first"),
        (status = 400, description = "Unknown status")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_periods(
    db: TenantDb,
    query: web::Query<PeriodQuery>,
) -> Result<HttpResponse, ApiError> {
    let paging = Pagination::new(query.page, query.per_page, 20);

    let mut filters = Filters::new();
    if let Some(status) = query.status.as_deref() {
        let status: PeriodStatus = status
            .parse()
            .map_err(|_| ApiError::bad_request(format!("Unknown period status '{}'", status)))?;
        filters.push("status = ?", vec![status.to_string().into()]);
    }
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM payroll_periods {}", where_clause);
    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), filters.values())
        .fetch_one(&db.pool)
        .await?;

    let data_sql = format!(
        "SELECT {} FROM payroll_periods {} ORDER BY start_date DESC, id DESC LIMIT ? OFFSET ?",
        PERIOD_COLUMNS, where_clause
    );
    let items = bind_values!(sqlx::query_as::<_, PayrollPeriod>(&data_sql), filters.values())
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

#[utoipa::path(
    get,
    path = "/api/payroll-periods/{period_id}",
    params(("period_id" = u64, Path, description = "Payroll period ID")),
    responses(
        (status = 200, body = PayrollPeriod),
        (status = 404, description = "Period not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn get_period(db: TenantDb, path: web::Path<u64>) -> Result<HttpResponse, ApiError> {
    match fetch_period(&db.pool, path.into_inner()).await? {
        Some(period) => Ok(response::ok(period)),
        None => Err(ApiError::not_found("Payroll period")),
    }
}

#[utoipa::path(
    put,
    path = "/api/payroll-periods/{period_id}",
    params(("period_id" = u64, Path, description = "Payroll period ID")),
    request_body = UpdatePeriod,
    responses(
        (status = 200, description = "Period updated"),
        (status = 400, description = "Invalid dates"),
        (status = 404, description = "Period not found"),
        (status = 409, description = "Period is closed")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn update_period(
    auth: AuthUser,
    db: TenantDb,
    path: web::Path<u64>,
    payload: web::Json<UpdatePeriod>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;
    let period_id = path.into_inner();

    let (current, status) = period_with_status(&db.pool, period_id).await?;
    if !status.is_editable() {
        return Err(ApiError::conflict("Closed payroll periods cannot be edited"));
    }

    let payload = payload.into_inner();
    let name = match payload.name.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::bad_request("name cannot be empty")),
        Some(name) => name.to_string(),
        None => current.name,
    };
    let start = payload.start_date.unwrap_or(current.start_date);
    let end = payload.end_date.unwrap_or(current.end_date);
    let pay_date = payload.pay_date.unwrap_or(current.pay_date);

    validate_dates(start, end, pay_date).map_err(ApiError::bad_request)?;

    sqlx::query(
        "UPDATE payroll_periods SET name = ?, start_date = ?, end_date = ?, pay_date = ? WHERE id = ?",
    )
    .bind(name)
    .bind(start)
    .bind(end)
    .bind(pay_date)
    .bind(period_id)
    .execute(&db.pool)
    .await?;

    Ok(response::message("Payroll period updated"))
}

#[utoipa::path(
    delete,
    path = "/api/payroll-periods/{period_id}",
    params(("period_id" = u64, Path, description = "Payroll period ID")),
    responses(
        (status = 200, description = "Period deleted"),
        (status = 404, description = "Period not found"),
        (status = 409, description = "Period is not a draft or has payslips")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn delete_period(
    auth: AuthUser,
    db: TenantDb,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;
    let period_id = path.into_inner();

    let (_, status) = period_with_status(&db.pool, period_id).await?;
    if status != PeriodStatus::Draft {
        return Err(ApiError::conflict(format!(
            "Only draft periods can be deleted; this one is {}",
            status
        )));
    }

    let payslips = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payslips WHERE period_id = ?")
        .bind(period_id)
        .fetch_one(&db.pool)
        .await?;
    if payslips > 0 {
        return Err(ApiError::conflict(format!(
            "Payroll period has {} payslip(s)",
            payslips
        )));
    }

    sqlx::query("DELETE FROM payroll_periods WHERE id = ?")
        .bind(period_id)
        .execute(&db.pool)
        .await?;

    Ok(response::message("Payroll period deleted"))
}

fn transition_error(from: PeriodStatus, action: PeriodAction) -> ApiError {
    let target = match action {
        PeriodAction::Open | PeriodAction::Reopen => PeriodStatus::Open,
        PeriodAction::Close => PeriodStatus::Closed,
    };
    ApiError::conflict(format!(
        "Cannot move payroll period from {} to {}",
        from, target
    ))
}

async fn transition(
    db: &TenantDb,
    period_id: u64,
    action: PeriodAction,
) -> Result<HttpResponse, ApiError> {
    let (period, status) = period_with_status(&db.pool, period_id).await?;
    let next = status
        .apply(action)
        .ok_or_else(|| transition_error(status, action))?;

    // guard against a concurrent transition
    let result = sqlx::query("UPDATE payroll_periods SET status = ? WHERE id = ? AND status = ?")
        .bind(next.to_string())
        .bind(period_id)
        .bind(status.to_string())
        .execute(&db.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::conflict("Payroll period changed concurrently, retry"));
    }

    info!(period_id, code = %period.code, from = %status, to = %next, tenant = %db.tenant, "Payroll period status changed");

    Ok(HttpResponse::Ok().json(
        response::ApiResponse::success(json!({ "id": period_id, "status": next }))
            .with_message(format!("Payroll period is now {}", next)),
    ))
}

#[utoipa::path(
    post,
    path = "/api/payroll-periods/{period_id}/open",
    params(("period_id" = u64, Path, description = "Payroll period ID")),
    responses(
        (status = 200, description = "Period opened"),
        (status = 409, description = "Period is not a draft")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn open_period(
    auth: AuthUser,
    db: TenantDb,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;
    transition(&db, path.into_inner(), PeriodAction::Open).await
}

#[utoipa::path(
    post,
    path = "/api/payroll-periods/{period_id}/close",
    params(("period_id" = u64, Path, description = "Payroll period ID")),
    responses(
        (status = 200, description = "Period closed"),
        (status = 409, description = "Period is not open")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn close_period(
    auth: AuthUser,
    db: TenantDb,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;
    transition(&db, path.into_inner(), PeriodAction::Close).await
}

#[utoipa::path(
    post,
    path = "/api/payroll-periods/{period_id}/reopen",
    params(("period_id" = u64, Path, description = "Payroll period ID")),
    responses(
        (status = 200, description = "Period reopened"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Period is not closed")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn reopen_period(
    auth: AuthUser,
    db: TenantDb,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    transition(&db, path.into_inner(), PeriodAction::Reopen).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_errors_name_both_states() {
        assert_eq!(
            transition_error(PeriodStatus::Draft, PeriodAction::Close),
            ApiError::conflict("Cannot move payroll period from draft to closed")
        );
        assert_eq!(
            transition_error(PeriodStatus::Open, PeriodAction::Reopen),
            ApiError::conflict("Cannot move payroll period from open to open")
        );
    }

    #[test]
    fn pay_date_can_be_cleared() {
        let update: UpdatePeriod = serde_json::from_value(json!({ "pay_date": null })).unwrap();
        assert_eq!(update.pay_date, Some(None));

        let update: UpdatePeriod = serde_json::from_value(json!({ "pay_date": "2025-03-05" })).unwrap();
        assert_eq!(update.pay_date, Some(NaiveDate::from_ymd_opt(2025, 3, 5)));
    }
}
