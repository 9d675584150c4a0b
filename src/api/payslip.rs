use std::collections::BTreeSet;

use actix_web::{HttpResponse, http::header, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{notification::notify_employee, payroll_period::period_with_status},
    auth::auth::AuthUser,
    bind_values,
    config::Config,
    db::TenantDb,
    model::{
        notification::NotificationKind,
        payroll_period::{PayrollPeriod, PeriodStatus},
        payslip::{PayBreakdown, Payslip, PayslipDetail, PayslipStatus, compute_pay},
    },
    utils::{
        db_utils::{Filters, Pagination, SqlValue},
        pdf::{Font, PAGE_HEIGHT, PAGE_WIDTH, PdfPage},
        response::{self, ApiError, Page},
    },
};

const PAYSLIP_COLUMNS: &str = "id, employee_id, period_id, base_salary, allowances, gross_pay, \
                               deductions, tax, net_pay, status, generated_at";

const DETAIL_SELECT: &str = r#"
    SELECT p.id, p.employee_id, p.period_id, p.base_salary, p.allowances, p.gross_pay,
           p.deductions, p.tax, p.net_pay, p.status, p.generated_at,
           e.employee_code, CONCAT(e.first_name, ' ', e.last_name) AS employee_name, e.position,
           pp.code AS period_code, pp.name AS period_name,
           pp.start_date AS period_start, pp.end_date AS period_end, pp.pay_date
    FROM payslips p
    JOIN employees e ON e.id = p.employee_id
    JOIN payroll_periods pp ON pp.id = p.period_id
"#;

// -------------------- Generation --------------------

#[derive(Deserialize, Serialize, ToSchema, Default)]
pub struct GenerateRequest {
    /// Limit generation to these employees; all active employees when omitted
    #[schema(example = json!([1, 2, 3]))]
    pub employee_ids: Option<Vec<u64>>,
    /// Recompute payslips that already exist for the period
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct GenerateError {
    pub employee_id: u64,
    pub message: String,
}

#[derive(Debug, Default, Serialize, ToSchema, PartialEq)]
pub struct GenerateSummary {
    pub processed: u32,
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
    pub errors: Vec<GenerateError>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Outcome {
    Created,
    Updated,
    Skipped,
}

impl GenerateSummary {
    fn record(&mut self, employee_id: u64, outcome: Result<Outcome, String>) {
        self.processed += 1;
        match outcome {
            Ok(Outcome::Created) => self.created += 1,
            Ok(Outcome::Updated) => self.updated += 1,
            Ok(Outcome::Skipped) => self.skipped += 1,
            Err(message) => {
                self.failed += 1;
                self.errors.push(GenerateError { employee_id, message });
            }
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PayInput {
    id: u64,
    base_salary: f64,
    allowances: f64,
    deductions: f64,
}

fn check_amounts(values: &[(&str, Option<f64>)]) -> Result<(), ApiError> {
    for (name, value) in values {
        if let Some(v) = value {
            if !v.is_finite() || *v < 0.0 {
                return Err(ApiError::bad_request(format!("{} must be a non-negative number", name)));
            }
        }
    }
    Ok(())
}

/// What generation does with one employee's payslip for the period
#[derive(Debug, Clone, Copy, PartialEq)]
enum Plan {
    Create,
    Overwrite(u64),
    Skip,
}

fn plan(existing: Option<u64>, overwrite: bool) -> Plan {
    match existing {
        None => Plan::Create,
        Some(payslip_id) if overwrite => Plan::Overwrite(payslip_id),
        Some(_) => Plan::Skip,
    }
}

/// Requested ids that matched no active employee, in ascending order
fn unmatched_ids(requested: Option<&BTreeSet<u64>>, seen: &BTreeSet<u64>) -> Vec<u64> {
    requested
        .map(|ids| ids.difference(seen).copied().collect())
        .unwrap_or_default()
}

fn log_clamped(employee_id: u64, pay: &PayBreakdown) {
    if pay.clamped {
        warn!(
            employee_id,
            gross = pay.gross_pay,
            deductions = pay.deductions,
            tax = pay.tax,
            "Deductions exceed gross pay, net pay set to 0"
        );
    }
}

async fn generate_one(
    pool: &MySqlPool,
    period: &PayrollPeriod,
    input: &PayInput,
    overwrite: bool,
    tax_rate: f64,
) -> Result<Outcome, sqlx::Error> {
    let existing = sqlx::query_scalar::<_, u64>(
        "SELECT id FROM payslips WHERE employee_id = ? AND period_id = ?",
    )
    .bind(input.id)
    .bind(period.id)
    .fetch_optional(pool)
    .await?;

    let plan = plan(existing, overwrite);
    if plan == Plan::Skip {
        return Ok(Outcome::Skipped);
    }

    let pay = compute_pay(input.base_salary, input.allowances, input.deductions, tax_rate);
    log_clamped(input.id, &pay);

    let outcome = match plan {
        Plan::Overwrite(payslip_id) => {
            sqlx::query(
                r#"
                UPDATE payslips
                SET base_salary = ?, allowances = ?, gross_pay = ?, deductions = ?, tax = ?,
                    net_pay = ?, status = ?, generated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(pay.base_salary)
            .bind(pay.allowances)
            .bind(pay.gross_pay)
            .bind(pay.deductions)
            .bind(pay.tax)
            .bind(pay.net_pay)
            .bind(PayslipStatus::Generated.to_string())
            .bind(payslip_id)
            .execute(pool)
            .await?;
            Outcome::Updated
        }
        Plan::Create | Plan::Skip => {
            sqlx::query(
                r#"
                INSERT INTO payslips
                    (employee_id, period_id, base_salary, allowances, gross_pay, deductions, tax, net_pay, status)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(input.id)
            .bind(period.id)
            .bind(pay.base_salary)
            .bind(pay.allowances)
            .bind(pay.gross_pay)
            .bind(pay.deductions)
            .bind(pay.tax)
            .bind(pay.net_pay)
            .bind(PayslipStatus::Generated.to_string())
            .execute(pool)
            .await?;
            Outcome::Created
        }
    };

    let title = "Payslip ready";
    let message = format!("Your payslip for {} is available.", period.name);
    if let Err(e) = notify_employee(pool, input.id, NotificationKind::Payslip, title, &message).await {
        warn!(error = %e, employee_id = input.id, "Failed to notify employee about payslip");
    }

    Ok(outcome)
}

/// Generate Payslips
#[utoipa::path(
    post,
    path = "/api/payroll-periods/{period_id}/payslips/generate",
    params(("period_id" = u64, Path, description = "Payroll period ID")),
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Generation summary", body = GenerateSummary),
        (status = 404, description = "Period not found"),
        (status = 409, description = "Period is not open")
    ),
    security(("bearer_auth" = [])),
    tag = "Payslips"
)]
#[instrument(skip(auth, db, config, payload), fields(tenant = %db.tenant))]
pub async fn generate_payslips(
    auth: AuthUser,
    db: TenantDb,
    config: web::Data<Config>,
    path: web::Path<u64>,
    payload: Option<web::Json<GenerateRequest>>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;
    let period_id = path.into_inner();
    let request = payload.map(web::Json::into_inner).unwrap_or_default();

    let (period, status) = period_with_status(&db.pool, period_id).await?;
    if status != PeriodStatus::Open {
        return Err(ApiError::conflict(format!(
            "Payslips can only be generated for open periods; this one is {}",
            status
        )));
    }

    let mut filters = Filters::new();
    filters.push("status = ?", vec!["active".into()]);

    let requested: Option<BTreeSet<u64>> = request.employee_ids.map(|ids| ids.into_iter().collect());
    if let Some(ids) = &requested {
        if ids.is_empty() {
            return Err(ApiError::bad_request("employee_ids cannot be empty"));
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        filters.push(
            &format!("id IN ({})", placeholders),
            ids.iter().map(|id| SqlValue::U64(*id)).collect(),
        );
    }

    let sql = format!(
        "SELECT id, base_salary, allowances, deductions FROM employees {} ORDER BY id",
        filters.where_clause()
    );
    debug!(sql = %sql, "Loading employees for payslip generation");

    // Loaded up front so the per-employee writes never wait on the read's connection
    let inputs = bind_values!(sqlx::query_as::<_, PayInput>(&sql), filters.values())
        .fetch_all(&db.pool)
        .await?;

    let mut summary = GenerateSummary::default();
    let mut seen = BTreeSet::new();

    for input in &inputs {
        seen.insert(input.id);

        let outcome = generate_one(&db.pool, &period, input, request.overwrite, config.payslip_tax_rate)
            .await
            .map_err(|e| {
                warn!(error = %e, employee_id = input.id, "Payslip generation failed");
                "Could not save payslip".to_string()
            });
        summary.record(input.id, outcome);
    }

    for missing in unmatched_ids(requested.as_ref(), &seen) {
        summary.record(missing, Err("Employee not found or not active".to_string()));
    }

    info!(
        period_id,
        processed = summary.processed,
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        failed = summary.failed,
        "Payslip generation finished"
    );

    Ok(response::ok(summary))
}

// -------------------- CRUD --------------------

#[derive(Deserialize, IntoParams)]
pub struct PayslipQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub period_id: Option<u64>,
    pub employee_id: Option<u64>,
    /// generated or issued
    pub status: Option<String>,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UpdatePayslip {
    #[schema(example = 4000.0)]
    pub allowances: Option<f64>,
    #[schema(example = 1500.0)]
    pub deductions: Option<f64>,
}

async fn fetch_payslip(pool: &MySqlPool, payslip_id: u64) -> Result<Payslip, ApiError> {
    sqlx::query_as::<_, Payslip>(&format!("SELECT {} FROM payslips WHERE id = ?", PAYSLIP_COLUMNS))
        .bind(payslip_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Payslip"))
}

async fn fetch_detail(pool: &MySqlPool, payslip_id: u64) -> Result<PayslipDetail, ApiError> {
    sqlx::query_as::<_, PayslipDetail>(&format!("{} WHERE p.id = ?", DETAIL_SELECT))
        .bind(payslip_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Payslip"))
}

/// 409 unless the payslip's period still accepts changes
async fn ensure_period_editable(pool: &MySqlPool, period_id: u64) -> Result<(), ApiError> {
    let (_, status) = period_with_status(pool, period_id).await?;
    if status.is_editable() {
        Ok(())
    } else {
        Err(ApiError::conflict("Payroll period is closed"))
    }
}

#[utoipa::path(
    get,
    path = "/api/payslips",
    params(PayslipQuery),
    responses(
        (status = 200, description = "Paginated payslips"),
        (status = 403, description = "No employee record linked")
    ),
    security(("bearer_auth" = [])),
    tag = "Payslips"
)]
pub async fn list_payslips(
    auth: AuthUser,
    db: TenantDb,
    query: web::Query<PayslipQuery>,
) -> Result<HttpResponse, ApiError> {
    let paging = Pagination::new(query.page, query.per_page, 20);

    let employee_id = if auth.is_hr_or_admin() {
        query.employee_id
    } else {
        Some(auth.employee_id.ok_or_else(|| {
            ApiError::Forbidden("No employee record linked to this account".into())
        })?)
    };

    let mut filters = Filters::new();
    filters
        .push_opt("period_id = ?", query.period_id)
        .push_opt("employee_id = ?", employee_id);
    if let Some(status) = query.status.as_deref() {
        let status: PayslipStatus = status
            .parse()
            .map_err(|_| ApiError::bad_request(format!("Unknown payslip status '{}'", status)))?;
        filters.push("status = ?", vec![status.to_string().into()]);
    }
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM payslips {}", where_clause);
    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), filters.values())
        .fetch_one(&db.pool)
        .await?;

    let data_sql = format!(
        "SELECT {} FROM payslips {} ORDER BY period_id DESC, employee_id LIMIT ? OFFSET ?",
        PAYSLIP_COLUMNS, where_clause
    );
    let items = bind_values!(sqlx::query_as::<_, Payslip>(&data_sql), filters.values())
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
    path = "/api/payslips/{payslip_id}",
    params(("payslip_id" = u64, Path, description = "Payslip ID")),
    responses(
        (status = 200, body = PayslipDetail),
        (status = 403, description = "Not your payslip"),
        (status = 404, description = "Payslip not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payslips"
)]
pub async fn get_payslip(
    auth: AuthUser,
    db: TenantDb,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let detail = fetch_detail(&db.pool, path.into_inner()).await?;
    auth.require_employee_access(detail.payslip.employee_id)?;
    Ok(response::ok(detail))
}

#[utoipa::path(
    put,
    path = "/api/payslips/{payslip_id}",
    params(("payslip_id" = u64, Path, description = "Payslip ID")),
    request_body = UpdatePayslip,
    responses(
        (status = 200, description = "Payslip recomputed", body = Payslip),
        (status = 400, description = "Invalid amounts"),
        (status = 404, description = "Payslip not found"),
        (status = 409, description = "Payroll period is closed")
    ),
    security(("bearer_auth" = [])),
    tag = "Payslips"
)]
pub async fn update_payslip(
    auth: AuthUser,
    db: TenantDb,
    config: web::Data<Config>,
    path: web::Path<u64>,
    payload: web::Json<UpdatePayslip>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;
    let payslip_id = path.into_inner();

    if payload.allowances.is_none() && payload.deductions.is_none() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }
    check_amounts(&[
        ("allowances", payload.allowances),
        ("deductions", payload.deductions),
    ])?;

    let current = fetch_payslip(&db.pool, payslip_id).await?;
    ensure_period_editable(&db.pool, current.period_id).await?;

    let pay = compute_pay(
        current.base_salary,
        payload.allowances.unwrap_or(current.allowances),
        payload.deductions.unwrap_or(current.deductions),
        config.payslip_tax_rate,
    );
    log_clamped(current.employee_id, &pay);

    sqlx::query(
        r#"
        UPDATE payslips
        SET allowances = ?, gross_pay = ?, deductions = ?, tax = ?, net_pay = ?
        WHERE id = ?
        "#,
    )
    .bind(pay.allowances)
    .bind(pay.gross_pay)
    .bind(pay.deductions)
    .bind(pay.tax)
    .bind(pay.net_pay)
    .bind(payslip_id)
    .execute(&db.pool)
    .await?;

    let updated = fetch_payslip(&db.pool, payslip_id).await?;
    Ok(HttpResponse::Ok().json(
        response::ApiResponse::success(updated).with_message("Payslip updated"),
    ))
}

#[utoipa::path(
    post,
    path = "/api/payslips/{payslip_id}/issue",
    params(("payslip_id" = u64, Path, description = "Payslip ID")),
    responses(
        (status = 200, description = "Payslip issued"),
        (status = 404, description = "Payslip not found"),
        (status = 409, description = "Payslip already issued")
    ),
    security(("bearer_auth" = [])),
    tag = "Payslips"
)]
pub async fn issue_payslip(
    auth: AuthUser,
    db: TenantDb,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;
    let detail = fetch_detail(&db.pool, path.into_inner()).await?;
    let payslip = &detail.payslip;

    if payslip.status != PayslipStatus::Generated.to_string() {
        return Err(ApiError::conflict(format!("Payslip is already {}", payslip.status)));
    }

    sqlx::query("UPDATE payslips SET status = ? WHERE id = ? AND status = ?")
        .bind(PayslipStatus::Issued.to_string())
        .bind(payslip.id)
        .bind(PayslipStatus::Generated.to_string())
        .execute(&db.pool)
        .await?;

    let message = format!("Your payslip for {} has been issued.", detail.period_name);
    if let Err(e) = notify_employee(
        &db.pool,
        payslip.employee_id,
        NotificationKind::Payslip,
        "Payslip issued",
        &message,
    )
    .await
    {
        warn!(error = %e, payslip_id = payslip.id, "Failed to notify employee about issued payslip");
    }

    info!(payslip_id = payslip.id, employee_id = payslip.employee_id, "Payslip issued");
    Ok(response::message("Payslip issued"))
}

#[utoipa::path(
    delete,
    path = "/api/payslips/{payslip_id}",
    params(("payslip_id" = u64, Path, description = "Payslip ID")),
    responses(
        (status = 200, description = "Payslip deleted"),
        (status = 404, description = "Payslip not found"),
        (status = 409, description = "Payroll period is closed")
    ),
    security(("bearer_auth" = [])),
    tag = "Payslips"
)]
pub async fn delete_payslip(
    auth: AuthUser,
    db: TenantDb,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;
    let payslip = fetch_payslip(&db.pool, path.into_inner()).await?;
    ensure_period_editable(&db.pool, payslip.period_id).await?;

    sqlx::query("DELETE FROM payslips WHERE id = ?")
        .bind(payslip.id)
        .execute(&db.pool)
        .await?;

    Ok(response::message("Payslip deleted"))
}

// -------------------- PDF --------------------

/// 1234567.891 -> "1,234,567.89"
pub fn format_money(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}{}.{:02}", sign, grouped, cents % 100)
}

/// Attachment name with anything outside `[A-Za-z0-9_-]` replaced
pub fn pdf_filename(employee_code: &str, period_code: &str) -> String {
    let clean = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    };
    format!("payslip-{}-{}.pdf", clean(employee_code), clean(period_code))
}

pub fn render_payslip(company: &str, detail: &PayslipDetail) -> Vec<u8> {
    let slip = &detail.payslip;
    let left = 50.0;
    let right = PAGE_WIDTH - 50.0;
    let amount_col = right;
    let mut y = PAGE_HEIGHT - 60.0;

    let mut page = PdfPage::new();
    page.text(left, y, 18.0, Font::Bold, company)
        .text_right(right, y, 14.0, Font::Bold, "PAYSLIP");

    y -= 22.0;
    page.text(
        left,
        y,
        10.0,
        Font::Regular,
        format!("Period: {} ({})", detail.period_name, detail.period_code),
    );
    y -= 14.0;
    page.text(
        left,
        y,
        10.0,
        Font::Regular,
        format!("From {} to {}", detail.period_start, detail.period_end),
    );
    if let Some(pay_date) = detail.pay_date {
        page.text_right(right, y, 10.0, Font::Regular, format!("Pay date: {}", pay_date));
    }

    y -= 12.0;
    page.line(left, y, right, y);

    y -= 22.0;
    page.text(left, y, 12.0, Font::Bold, detail.employee_name.as_str());
    y -= 14.0;
    page.text(left, y, 10.0, Font::Regular, format!("Employee code: {}", detail.employee_code));
    if let Some(position) = detail.position.as_deref() {
        y -= 14.0;
        page.text(left, y, 10.0, Font::Regular, format!("Position: {}", position));
    }

    y -= 12.0;
    page.line(left, y, right, y);

    let row = |page: &mut PdfPage, y: f32, label: &str, amount: f64, font: Font| {
        page.text(left, y, 10.0, font, label)
            .text_right(amount_col, y, 10.0, font, format_money(amount));
    };

    y -= 22.0;
    page.text(left, y, 11.0, Font::Bold, "Earnings");
    y -= 16.0;
    row(&mut page, y, "Base salary", slip.base_salary, Font::Regular);
    y -= 14.0;
    row(&mut page, y, "Allowances", slip.allowances, Font::Regular);
    y -= 14.0;
    row(&mut page, y, "Gross pay", slip.gross_pay, Font::Bold);

    y -= 24.0;
    page.text(left, y, 11.0, Font::Bold, "Deductions");
    y -= 16.0;
    row(&mut page, y, "Deductions", slip.deductions, Font::Regular);
    y -= 14.0;
    row(&mut page, y, "Tax", slip.tax, Font::Regular);
    y -= 14.0;
    row(&mut page, y, "Total deductions", slip.deductions + slip.tax, Font::Bold);

    y -= 12.0;
    page.line(left, y, right, y);
    y -= 20.0;
    page.text(left, y, 13.0, Font::Bold, "Net pay")
        .text_right(amount_col, y, 13.0, Font::Bold, format_money(slip.net_pay));

    page.text(
        left,
        60.0,
        8.0,
        Font::Regular,
        format!(
            "Status: {}  |  Generated {}",
            slip.status,
            slip.generated_at.format("%Y-%m-%d %H:%M UTC")
        ),
    );

    page.render()
}

#[utoipa::path(
    get,
    path = "/api/payslips/{payslip_id}/pdf",
    params(("payslip_id" = u64, Path, description = "Payslip ID")),
    responses(
        (status = 200, description = "Payslip document", content_type = "application/pdf"),
        (status = 403, description = "Not your payslip"),
        (status = 404, description = "Payslip not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payslips"
)]
pub async fn payslip_pdf(
    auth: AuthUser,
    db: TenantDb,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let detail = fetch_detail(&db.pool, path.into_inner()).await?;
    auth.require_employee_access(detail.payslip.employee_id)?;

    let body = render_payslip(&config.company_name, &detail);
    let filename = pdf_filename(&detail.employee_code, &detail.period_code);
    debug!(payslip_id = detail.payslip.id, bytes = body.len(), "Rendered payslip PDF");

    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn detail() -> PayslipDetail {
        PayslipDetail {
            payslip: Payslip {
                id: 88,
                employee_id: 1,
                period_id: 3,
                base_salary: 42000.0,
                allowances: 3500.0,
                gross_pay: 45500.0,
                deductions: 1200.0,
                tax: 2275.0,
                net_pay: 42025.0,
                status: "issued".into(),
                generated_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap(),
            },
            employee_code: "EMP-001".into(),
            employee_name: "John Doe".into(),
            position: Some("Line Supervisor".into()),
            period_code: "2025-02".into(),
            period_name: "February 2025".into(),
            period_start: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
            pay_date: NaiveDate::from_ymd_opt(2025, 3, 5),
        }
    }

    #[test]
    fn money_is_grouped_with_two_decimals() {
        assert_eq!(format_money(0.0), "0.00");
        assert_eq!(format_money(999.5), "999.50");
        assert_eq!(format_money(42025.0), "42,025.00");
        assert_eq!(format_money(1234567.891), "1,234,567.89");
        assert_eq!(format_money(-1500.25), "-1,500.25");
    }

    #[test]
    fn filename_uses_codes_and_strips_unsafe_characters() {
        assert_eq!(pdf_filename("EMP-001", "2025-02"), "payslip-EMP-001-2025-02.pdf");
        assert_eq!(pdf_filename("A/B \"x\"", "2025-02"), "payslip-A_B__x_-2025-02.pdf");
    }

    #[test]
    fn document_lists_company_employee_and_amounts() {
        let bytes = render_payslip("Acme Garments", &detail());
        let text = String::from_utf8_lossy(&bytes);

        assert!(bytes.starts_with(b"%PDF-1.4"));
        for needle in [
            "(Acme Garments)",
            "(John Doe)",
            "(Employee code: EMP-001)",
            "(Period: February 2025 \\(2025-02\\))",
            "(Pay date: 2025-03-05)",
            "(45,500.00)",
            "(2,275.00)",
            "(3,475.00)",
            "(42,025.00)",
            "(Net pay)",
        ] {
            assert!(text.contains(needle), "missing {}", needle);
        }
    }

    #[test]
    fn summary_counts_each_outcome() {
        let mut summary = GenerateSummary::default();
        summary.record(1, Ok(Outcome::Created));
        summary.record(2, Ok(Outcome::Updated));
        summary.record(3, Ok(Outcome::Skipped));
        summary.record(4, Err("Employee not found or not active".into()));

        assert_eq!(summary.processed, 4);
        assert_eq!((summary.created, summary.updated, summary.skipped, summary.failed), (1, 1, 1, 1));
        assert_eq!(
            summary.errors,
            vec![GenerateError {
                employee_id: 4,
                message: "Employee not found or not active".into()
            }]
        );
    }

    #[test]
    fn existing_payslips_are_skipped_unless_overwritten() {
        assert_eq!(plan(None, false), Plan::Create);
        assert_eq!(plan(None, true), Plan::Create);
        assert_eq!(plan(Some(17), true), Plan::Overwrite(17));
        assert_eq!(plan(Some(17), false), Plan::Skip);
    }

    #[test]
    fn requested_ids_without_an_active_employee_fail() {
        let requested: BTreeSet<u64> = [1, 2, 5, 9].into_iter().collect();
        let seen: BTreeSet<u64> = [1, 5].into_iter().collect();
        assert_eq!(unmatched_ids(Some(&requested), &seen), vec![2, 9]);
        assert!(unmatched_ids(None, &seen).is_empty());

        let mut summary = GenerateSummary::default();
        for id in &seen {
            summary.record(*id, Ok(Outcome::Created));
        }
        for id in unmatched_ids(Some(&requested), &seen) {
            summary.record(id, Err("Employee not found or not active".into()));
        }
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.failed, 2);
        let failed: Vec<u64> = summary.errors.iter().map(|e| e.employee_id).collect();
        assert_eq!(failed, vec![2, 9]);
    }

    #[test]
    fn generate_request_defaults() {
        let req: GenerateRequest = serde_json::from_value(json!({})).unwrap();
        assert!(req.employee_ids.is_none());
        assert!(!req.overwrite);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(check_amounts(&[("allowances", Some(-1.0))]).is_err());
        assert!(check_amounts(&[("deductions", Some(f64::NAN))]).is_err());
        assert!(check_amounts(&[("allowances", None), ("deductions", Some(0.0))]).is_ok());
    }
}
