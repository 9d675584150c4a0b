//! Read-only database review over `INFORMATION_SCHEMA` for admins.

use actix_web::HttpResponse;
use serde::Serialize;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::{
    auth::auth::AuthUser,
    db::TenantDb,
    utils::{
        db_utils::quote_ident,
        response::{self, ApiError},
    },
};

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct TableInfo {
    #[schema(example = "employees")]
    pub table_name: String,
    /// Estimate from the storage engine, not an exact count
    #[schema(example = 1250)]
    pub approx_rows: Option<u64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct ForeignKey {
    #[serde(rename = "constraint")]
    #[schema(example = "fk_payslips_employee")]
    pub constraint_name: String,
    #[serde(rename = "table")]
    #[schema(example = "payslips")]
    pub table_name: String,
    #[serde(rename = "column")]
    #[schema(example = "employee_id")]
    pub column_name: String,
    #[schema(example = "employees")]
    pub referenced_table: String,
    #[schema(example = "id")]
    pub referenced_column: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrphanReport {
    #[serde(flatten)]
    pub foreign_key: ForeignKey,
    /// Child rows whose non-null key has no parent row
    pub orphan_rows: i64,
}

/// COUNT of child rows pointing at a missing parent
pub fn orphan_count_sql(fk: &ForeignKey) -> String {
    let column = quote_ident(&fk.column_name);
    format!(
        "SELECT COUNT(*) FROM {table} c WHERE c.{column} IS NOT NULL \
         AND NOT EXISTS (SELECT 1 FROM {parent} p WHERE p.{parent_column} = c.{column})",
        table = quote_ident(&fk.table_name),
        column = column,
        parent = quote_ident(&fk.referenced_table),
        parent_column = quote_ident(&fk.referenced_column),
    )
}

async fn foreign_keys(pool: &sqlx::MySqlPool) -> Result<Vec<ForeignKey>, sqlx::Error> {
    sqlx::query_as::<_, ForeignKey>(
        r#"
        SELECT CAST(CONSTRAINT_NAME AS CHAR) AS constraint_name,
               CAST(TABLE_NAME AS CHAR) AS table_name,
               CAST(COLUMN_NAME AS CHAR) AS column_name,
               CAST(REFERENCED_TABLE_NAME AS CHAR) AS referenced_table,
               CAST(REFERENCED_COLUMN_NAME AS CHAR) AS referenced_column
        FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = DATABASE() AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION
        "#,
    )
    .fetch_all(pool)
    .await
}

#[utoipa::path(
    get,
    path = "/api/admin/schema/tables",
    responses(
        (status = 200, description = "Tables with approximate row counts", body = [TableInfo]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_tables(auth: AuthUser, db: TenantDb) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;

    let tables = sqlx::query_as::<_, TableInfo>(
        r#"
        SELECT CAST(TABLE_NAME AS CHAR) AS table_name, TABLE_ROWS AS approx_rows
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
        "#,
    )
    .fetch_all(&db.pool)
    .await?;

    Ok(response::ok(tables))
}

#[utoipa::path(
    get,
    path = "/api/admin/schema/relationships",
    responses(
        (status = 200, description = "Foreign keys of the tenant database", body = [ForeignKey]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_relationships(auth: AuthUser, db: TenantDb) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    Ok(response::ok(foreign_keys(&db.pool).await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/schema/orphans",
    responses(
        (status = 200, description = "Foreign keys with dangling child rows", body = [OrphanReport]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn find_orphans(auth: AuthUser, db: TenantDb) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;

    let mut reports = Vec::new();
    for fk in foreign_keys(&db.pool).await? {
        let sql = orphan_count_sql(&fk);
        debug!(sql = %sql, "Counting orphans");

        let orphan_rows = sqlx::query_scalar::<_, i64>(&sql).fetch_one(&db.pool).await?;
        if orphan_rows > 0 {
            warn!(
                constraint = %fk.constraint_name,
                table = %fk.table_name,
                orphan_rows,
                "Orphaned rows found"
            );
            reports.push(OrphanReport {
                foreign_key: fk,
                orphan_rows,
            });
        }
    }

    Ok(response::ok(reports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fk() -> ForeignKey {
        ForeignKey {
            constraint_name: "fk_payslips_employee".into(),
            table_name: "payslips".into(),
            column_name: "employee_id".into(),
            referenced_table: "employees".into(),
            referenced_column: "id".into(),
        }
    }

    #[test]
    fn orphan_query_quotes_catalog_identifiers() {
        assert_eq!(
            orphan_count_sql(&fk()),
            "SELECT COUNT(*) FROM `payslips` c WHERE c.`employee_id` IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM `employees` p WHERE p.`id` = c.`employee_id`)"
        );

        let mut odd = fk();
        odd.table_name = "pay`slips".into();
        assert!(orphan_count_sql(&odd).contains("FROM `pay``slips` c"));
    }

    #[test]
    fn report_serializes_flat() {
        let report = OrphanReport {
            foreign_key: fk(),
            orphan_rows: 2,
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "constraint": "fk_payslips_employee",
                "table": "payslips",
                "column": "employee_id",
                "referenced_table": "employees",
                "referenced_column": "id",
                "orphan_rows": 2
            })
        );
    }
}
