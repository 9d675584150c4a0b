use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PayslipStatus {
    Generated,
    Issued,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Payslip {
    #[schema(example = 88)]
    pub id: u64,
    #[schema(example = 1)]
    pub employee_id: u64,
    #[schema(example = 3)]
    pub period_id: u64,
    #[schema(example = 42000.0)]
    pub base_salary: f64,
    #[schema(example = 3500.0)]
    pub allowances: f64,
    #[schema(example = 45500.0)]
    pub gross_pay: f64,
    #[schema(example = 1200.0)]
    pub deductions: f64,
    #[schema(example = 2275.0)]
    pub tax: f64,
    #[schema(example = 42025.0)]
    pub net_pay: f64,
    #[schema(example = "generated")]
    pub status: String,
    #[schema(value_type = String, format = "date-time")]
    pub generated_at: DateTime<Utc>,
}

/// Payslip joined with the employee and period it belongs to
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct PayslipDetail {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub payslip: Payslip,
    #[schema(example = "EMP-001")]
    pub employee_code: String,
    #[schema(example = "John Doe")]
    pub employee_name: String,
    #[schema(nullable = true)]
    pub position: Option<String>,
    #[schema(example = "2025-02")]
    pub period_code: String,
    #[schema(example = "February 2025")]
    pub period_name: String,
    #[schema(value_type = String, format = "date")]
    pub period_start: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub period_end: NaiveDate,
    #[schema(value_type = Option<String>, format = "date")]
    pub pay_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PayBreakdown {
    pub base_salary: f64,
    pub allowances: f64,
    pub gross_pay: f64,
    pub deductions: f64,
    pub tax: f64,
    pub net_pay: f64,
    /// Deductions and tax exceeded gross; net was floored at zero
    pub clamped: bool,
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// gross = base + allowances, tax = gross * rate%, net = gross - deductions - tax
pub fn compute_pay(base_salary: f64, allowances: f64, deductions: f64, tax_rate: f64) -> PayBreakdown {
    let base_salary = round_cents(base_salary);
    let allowances = round_cents(allowances);
    let deductions = round_cents(deductions);

    let gross_pay = round_cents(base_salary + allowances);
    let tax = round_cents(gross_pay * tax_rate / 100.0);
    let net = round_cents(gross_pay - deductions - tax);

    PayBreakdown {
        base_salary,
        allowances,
        gross_pay,
        deductions,
        tax,
        net_pay: net.max(0.0),
        clamped: net < 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn net_is_gross_minus_deductions_and_tax() {
        let pay = compute_pay(42000.0, 3500.0, 1200.0, 5.0);
        assert_eq!(pay.gross_pay, 45500.0);
        assert_eq!(pay.tax, 2275.0);
        assert_eq!(pay.net_pay, 42025.0);
        assert!(!pay.clamped);
    }

    #[test]
    fn amounts_are_rounded_to_cents() {
        let pay = compute_pay(1234.567, 0.0, 0.0, 10.0);
        assert_eq!(pay.base_salary, 1234.57);
        assert_eq!(pay.gross_pay, 1234.57);
        assert_eq!(pay.tax, 123.46);
        assert_eq!(pay.net_pay, 1111.11);
    }

    #[test]
    fn zero_rate_means_no_tax() {
        let pay = compute_pay(500.0, 25.5, 0.0, 0.0);
        assert_eq!(pay.tax, 0.0);
        assert_eq!(pay.net_pay, 525.5);
    }

    #[test]
    fn negative_net_is_clamped() {
        let pay = compute_pay(100.0, 0.0, 250.0, 0.0);
        assert_eq!(pay.net_pay, 0.0);
        assert!(pay.clamped);
    }
}
