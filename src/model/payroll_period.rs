use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PeriodStatus {
    Draft,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodAction {
    Open,
    Close,
    Reopen,
}

impl PeriodStatus {
    /// Next status for `action`, or `None` when the move is not allowed
    pub fn apply(self, action: PeriodAction) -> Option<PeriodStatus> {
        match (self, action) {
            (PeriodStatus::Draft, PeriodAction::Open) => Some(PeriodStatus::Open),
            (PeriodStatus::Open, PeriodAction::Close) => Some(PeriodStatus::Closed),
            (PeriodStatus::Closed, PeriodAction::Reopen) => Some(PeriodStatus::Open),
            _ => None,
        }
    }

    pub fn is_editable(self) -> bool {
        self != PeriodStatus::Closed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct PayrollPeriod {
    #[schema(example = 3)]
    pub id: u64,
    #[schema(example = "2025-02")]
    pub code: String,
    #[schema(example = "February 2025")]
    pub name: String,
    #[schema(example = "2025-02-01", value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(example = "2025-02-28", value_type = String, format = "date")]
    pub end_date: NaiveDate,
    #[schema(example = "2025-03-05", value_type = Option<String>, format = "date")]
    pub pay_date: Option<NaiveDate>,
    #[schema(example = "open")]
    pub status: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl PayrollPeriod {
    pub fn status(&self) -> Option<PeriodStatus> {
        self.status.parse().ok()
    }
}

/// Parse a `YYYY-MM` period code into (year, month)
pub fn parse_period_code(code: &str) -> Result<(i32, u32), String> {
    let invalid = || format!("Invalid period code '{}', expected YYYY-MM", code);

    let (year, month) = code.split_once('-').ok_or_else(invalid)?;
    if year.len() != 4 || month.len() != 2 {
        return Err(invalid());
    }
    if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    // DATE columns hold years 1000..=9999
    if year < 1000 || !(1..=12).contains(&month) {
        return Err(invalid());
    }

    Ok((year, month))
}

/// First and last calendar day of the month
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, next.pred_opt()?))
}

/// "February 2025"
pub fn default_name(start: NaiveDate) -> String {
    format!("{} {}", start.format("%B"), start.year())
}

/// Resolve the date range of a new period, defaulting to the code's month
pub fn resolve_dates(
    code: &str,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    pay_date: Option<NaiveDate>,
) -> Result<(NaiveDate, NaiveDate), String> {
    let (year, month) = parse_period_code(code)?;
    let (month_start, month_end) =
        month_bounds(year, month).ok_or_else(|| format!("Period '{}' is out of range", code))?;

    let start = start_date.unwrap_or(month_start);
    let end = end_date.unwrap_or(month_end);
    validate_dates(start, end, pay_date)?;

    Ok((start, end))
}

pub fn validate_dates(
    start: NaiveDate,
    end: NaiveDate,
    pay_date: Option<NaiveDate>,
) -> Result<(), String> {
    if start > end {
        return Err("start_date cannot be after end_date".to_string());
    }
    if let Some(pay) = pay_date {
        if pay < start {
            return Err("pay_date cannot be before start_date".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn codes_must_be_year_dash_month() {
        assert_eq!(parse_period_code("2025-02"), Ok((2025, 2)));
        assert_eq!(parse_period_code("1999-12"), Ok((1999, 12)));
        for bad in ["2025-13", "2025-00", "2025-2", "25-02", "2025/02", "2025-0a", "+202-02", ""] {
            assert!(parse_period_code(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn years_outside_the_date_column_range_are_rejected() {
        assert_eq!(parse_period_code("1000-01"), Ok((1000, 1)));
        assert_eq!(parse_period_code("9999-12"), Ok((9999, 12)));
        for bad in ["0000-01", "0999-12"] {
            assert!(parse_period_code(bad).is_err(), "{} should be rejected", bad);
            assert!(resolve_dates(bad, None, None, None).is_err());
        }
    }

    #[test]
    fn month_bounds_handle_leap_years_and_december() {
        assert_eq!(month_bounds(2024, 2), Some((date(2024, 2, 1), date(2024, 2, 29))));
        assert_eq!(month_bounds(2025, 2), Some((date(2025, 2, 1), date(2025, 2, 28))));
        assert_eq!(month_bounds(2025, 12), Some((date(2025, 12, 1), date(2025, 12, 31))));
    }

    #[test]
    fn dates_default_to_the_month() {
        assert_eq!(
            resolve_dates("2025-02", None, None, None),
            Ok((date(2025, 2, 1), date(2025, 2, 28)))
        );
        assert_eq!(
            resolve_dates("2025-02", Some(date(2025, 1, 26)), Some(date(2025, 2, 25)), None),
            Ok((date(2025, 1, 26), date(2025, 2, 25)))
        );
    }

    #[test]
    fn inverted_ranges_and_early_pay_dates_fail() {
        assert!(resolve_dates("2025-02", Some(date(2025, 3, 1)), None, None).is_err());
        assert!(validate_dates(date(2025, 2, 1), date(2025, 2, 28), Some(date(2025, 1, 31))).is_err());
        assert!(validate_dates(date(2025, 2, 1), date(2025, 2, 28), Some(date(2025, 3, 5))).is_ok());
    }

    #[test]
    fn default_name_spells_the_month() {
        assert_eq!(default_name(date(2025, 2, 1)), "February 2025");
    }

    #[test]
    fn only_forward_transitions_and_reopen_are_allowed() {
        use PeriodStatus::{Closed, Draft};

        assert_eq!(Draft.apply(PeriodAction::Open), Some(PeriodStatus::Open));
        assert_eq!(PeriodStatus::Open.apply(PeriodAction::Close), Some(Closed));
        assert_eq!(Closed.apply(PeriodAction::Reopen), Some(PeriodStatus::Open));

        assert_eq!(Draft.apply(PeriodAction::Close), None);
        assert_eq!(PeriodStatus::Open.apply(PeriodAction::Open), None);
        assert_eq!(Closed.apply(PeriodAction::Close), None);
        assert!(!Closed.is_editable());
        assert!(Draft.is_editable());
    }
}
