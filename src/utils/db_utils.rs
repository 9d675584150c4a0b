use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use sqlx::MySqlPool;

use crate::utils::response::ApiError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

/// Bind a list of `SqlValue`s onto any sqlx query builder
/// (`query`, `query_as`, `query_scalar`).
#[macro_export]
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values {
            query = match value {
                $crate::utils::db_utils::SqlValue::String(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::I64(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::U64(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::F64(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Bool(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Date(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::DateTime(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Null => query.bind(None::<String>),
            };
        }
        query
    }};
}

/// ===============================
/// Dynamic WHERE clause
/// ===============================
#[derive(Debug, Default)]
pub struct Filters {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// `condition` uses one `?` per entry in `values`
    pub fn push(&mut self, condition: &str, values: Vec<SqlValue>) -> &mut Self {
        debug_assert_eq!(condition.matches('?').count(), values.len());
        self.conditions.push(condition.to_string());
        self.values.extend(values);
        self
    }

    pub fn push_opt<T: Into<SqlValue>>(&mut self, condition: &str, value: Option<T>) -> &mut Self {
        if let Some(v) = value {
            self.push(condition, vec![v.into()]);
        }
        self
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> Vec<SqlValue> {
        self.values.clone()
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

/// ===============================
/// Pagination
/// ===============================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: Option<u32>, per_page: Option<u32>, default_per_page: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(default_per_page)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// Only keys listed in `allowed` may be updated; anything else is a 400.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[&str],
    id_column: &str,
    id_value: u64,
) -> Result<SqlUpdate, ApiError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::bad_request("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }

    if let Some(unknown) = obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(ApiError::bad_request(format!(
            "Field '{}' cannot be updated",
            unknown
        )));
    }

    // Build SET clause
    let set_clause = obj
        .keys()
        .map(|k| format!("{} = ?", k))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table, set_clause, id_column
    );

    let mut values = Vec::with_capacity(obj.len() + 1);

    // Convert JSON values → SqlValue
    for (key, value) in obj {
        match value {
            Value::String(s) => {
                if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    values.push(SqlValue::Date(d));
                } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                    values.push(SqlValue::DateTime(dt));
                } else {
                    values.push(SqlValue::String(s.clone()));
                }
            }
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    values.push(SqlValue::U64(u));
                } else if let Some(i) = n.as_i64() {
                    values.push(SqlValue::I64(i));
                } else if let Some(f) = n.as_f64() {
                    values.push(SqlValue::F64(f));
                }
            }
            Value::Bool(b) => values.push(SqlValue::Bool(*b)),
            Value::Null => values.push(SqlValue::Null),
            _ => {
                return Err(ApiError::bad_request(format!(
                    "Unsupported value for field '{}'",
                    key
                )));
            }
        }
    }

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let query = crate::bind_values!(sqlx::query(&update.sql), update.values);
    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

/// For nullable columns in partial updates: `Some(None)` when the key is
/// present as null, `None` when it is absent. Use with `#[serde(default)]`.
pub fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Backtick-quote a MySQL identifier taken from the catalog
pub fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALLOWED: &[&str] = &["first_name", "hire_date", "base_salary", "phone"];

    #[test]
    fn update_sql_binds_value_then_id() {
        let payload = json!({ "hire_date": "2024-03-01" });
        let update = build_update_sql("employees", &payload, ALLOWED, "id", 9).unwrap();

        assert_eq!(update.sql, "UPDATE employees SET hire_date = ? WHERE id = ?");
        assert_eq!(
            update.values,
            vec![
                SqlValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
                SqlValue::U64(9),
            ]
        );
    }

    #[test]
    fn update_sql_covers_every_field() {
        let payload = json!({ "first_name": "Ana", "base_salary": 1200.5 });
        let update = build_update_sql("employees", &payload, ALLOWED, "id", 3).unwrap();

        assert!(update.sql.contains("first_name = ?"));
        assert!(update.sql.contains("base_salary = ?"));
        assert_eq!(update.values.len(), 3);
        assert!(update.values.contains(&SqlValue::F64(1200.5)));
        assert!(update.values.contains(&SqlValue::String("Ana".into())));
        assert_eq!(update.values.last(), Some(&SqlValue::U64(3)));
    }

    #[test]
    fn update_rejects_columns_outside_whitelist() {
        let payload = json!({ "id": 1 });
        let err = build_update_sql("employees", &payload, ALLOWED, "id", 1).unwrap_err();
        assert_eq!(err, ApiError::bad_request("Field 'id' cannot be updated"));
    }

    #[test]
    fn update_rejects_empty_and_non_objects() {
        assert!(build_update_sql("employees", &json!({}), ALLOWED, "id", 1).is_err());
        assert!(build_update_sql("employees", &json!([1, 2]), ALLOWED, "id", 1).is_err());
        assert!(
            build_update_sql("employees", &json!({ "phone": ["x"] }), ALLOWED, "id", 1).is_err()
        );
    }

    #[test]
    fn null_is_bound_as_null() {
        let update = build_update_sql("employees", &json!({ "phone": null }), ALLOWED, "id", 2).unwrap();
        assert_eq!(update.values, vec![SqlValue::Null, SqlValue::U64(2)]);
    }

    #[test]
    fn filters_join_conditions() {
        let mut filters = Filters::new();
        assert_eq!(filters.where_clause(), "");

        filters
            .push_opt("status = ?", Some("active"))
            .push_opt::<u64>("org_unit_id = ?", None)
            .push("(first_name LIKE ? OR email LIKE ?)", vec!["%a%".into(), "%a%".into()]);

        assert_eq!(
            filters.where_clause(),
            "WHERE status = ? AND (first_name LIKE ? OR email LIKE ?)"
        );
        assert_eq!(filters.values().len(), 3);
    }

    #[test]
    fn pagination_clamps_inputs() {
        let p = Pagination::new(Some(0), Some(1000), 20);
        assert_eq!(p, Pagination { page: 1, per_page: 100 });
        assert_eq!(p.offset(), 0);

        let p = Pagination::new(Some(3), None, 20);
        assert_eq!(p.limit(), 20);
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn identifiers_are_backtick_quoted() {
        assert_eq!(quote_ident("employees"), "`employees`");
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
    }
}
