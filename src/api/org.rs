use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{HttpResponse, web};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    bind_values,
    db::TenantDb,
    model::org::{OrgLevel, OrgNode, OrgTree, OrgUnit, OrgUnitRow, build_tree, validate_placement, would_create_cycle},
    utils::{
        db_utils::{Filters, double_option},
        response::{self, ApiError},
    },
};

/// Built trees per tenant; dropped on any org write
pub struct OrgTreeCache {
    trees: Cache<String, Arc<OrgTree>>,
}

impl OrgTreeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            trees: Cache::builder().max_capacity(1_000).time_to_live(ttl).build(),
        }
    }

    pub async fn invalidate(&self, tenant: &str) {
        self.trees.invalidate(tenant).await;
    }
}

const UNIT_COLUMNS: &str = "id, name, code, level_id, parent_id, manager_employee_id, created_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateLevel {
    #[schema(example = "Factory")]
    pub name: String,
    #[schema(example = 2)]
    pub depth: u32,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUnit {
    #[schema(example = "Sewing Section A")]
    pub name: String,
    #[schema(example = "SEW-A")]
    pub code: String,
    #[schema(example = 3)]
    pub level_id: u64,
    #[schema(example = 12)]
    pub parent_id: Option<u64>,
    pub manager_employee_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUnit {
    pub name: Option<String>,
    pub code: Option<String>,
    pub level_id: Option<u64>,
    /// `null` moves the unit to the top of the hierarchy
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<u64>)]
    pub parent_id: Option<Option<u64>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<u64>)]
    pub manager_employee_id: Option<Option<u64>>,
}

#[derive(Deserialize, IntoParams)]
pub struct UnitQuery {
    /// Only direct children of this unit
    pub parent_id: Option<u64>,
    /// Only units on this level
    pub level_id: Option<u64>,
    /// Only top-level units
    pub roots_only: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct OrgTreeResponse {
    pub roots: Vec<OrgNode>,
    /// Units shown at the top because their parent is missing
    pub promoted: Vec<u64>,
}

async fn fetch_unit(pool: &MySqlPool, unit_id: u64) -> Result<Option<OrgUnit>, sqlx::Error> {
    sqlx::query_as::<_, OrgUnit>(&format!("SELECT {} FROM org_units WHERE id = ?", UNIT_COLUMNS))
        .bind(unit_id)
        .fetch_optional(pool)
        .await
}

async fn level_depth(pool: &MySqlPool, level_id: u64) -> Result<u32, ApiError> {
    sqlx::query_scalar::<_, u32>("SELECT depth FROM org_levels WHERE id = ?")
        .bind(level_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::bad_request(format!("Org level {} does not exist", level_id)))
}

/// Check depth ordering and, for existing units, that the move is acyclic
async fn check_placement(
    pool: &MySqlPool,
    unit_id: Option<u64>,
    level_id: u64,
    parent_id: Option<u64>,
) -> Result<(), ApiError> {
    let depth = level_depth(pool, level_id).await?;

    let min_depth = sqlx::query_scalar::<_, Option<u32>>("SELECT MIN(depth) FROM org_levels")
        .fetch_one(pool)
        .await?
        .unwrap_or(depth);

    let parent_depth = match parent_id {
        Some(parent) => Some(
            sqlx::query_scalar::<_, u32>(
                "SELECT l.depth FROM org_units u JOIN org_levels l ON l.id = u.level_id WHERE u.id = ?",
            )
            .bind(parent)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::bad_request(format!("Parent unit {} does not exist", parent)))?,
        ),
        None => None,
    };

    validate_placement(depth, parent_depth, min_depth).map_err(ApiError::bad_request)?;

    if let Some(unit_id) = unit_id {
        let parents: HashMap<u64, Option<u64>> =
            sqlx::query_as::<_, (u64, Option<u64>)>("SELECT id, parent_id FROM org_units")
                .fetch_all(pool)
                .await?
                .into_iter()
                .collect();

        if would_create_cycle(&parents, unit_id, parent_id) {
            return Err(ApiError::conflict("A unit cannot be moved under itself or its descendants"));
        }

        // children must stay strictly below the unit
        let shallowest_child = sqlx::query_scalar::<_, Option<u32>>(
            "SELECT MIN(l.depth) FROM org_units u JOIN org_levels l ON l.id = u.level_id WHERE u.parent_id = ?",
        )
        .bind(unit_id)
        .fetch_one(pool)
        .await?;

        if let Some(child_depth) = shallowest_child {
            if child_depth <= depth {
                return Err(ApiError::conflict(
                    "Unit level must stay above the levels of its children",
                ));
            }
        }
    }

    Ok(())
}

// -------------------- Levels --------------------

#[utoipa::path(
    get,
    path = "/api/org/levels",
    responses((status = 200, description = "Levels ordered by depth", body = [OrgLevel])),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn list_levels(db: TenantDb) -> Result<HttpResponse, ApiError> {
    let levels = sqlx::query_as::<_, OrgLevel>(
        "SELECT id, name, depth, created_at FROM org_levels ORDER BY depth",
    )
    .fetch_all(&db.pool)
    .await?;

    Ok(response::ok(levels))
}

#[utoipa::path(
    post,
    path = "/api/org/levels",
    request_body = CreateLevel,
    responses(
        (status = 201, description = "Level created"),
        (status = 400, description = "Invalid name or depth"),
        (status = 409, description = "Depth already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn create_level(
    auth: AuthUser,
    db: TenantDb,
    cache: web::Data<OrgTreeCache>,
    payload: web::Json<CreateLevel>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;

    if payload.name.trim().is_empty() || payload.depth == 0 {
        return Err(ApiError::bad_request("name is required and depth must be at least 1"));
    }

    let result = sqlx::query("INSERT INTO org_levels (name, depth) VALUES (?, ?)")
        .bind(payload.name.trim())
        .bind(payload.depth)
        .execute(&db.pool)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::conflict(format!("Depth {} is already used", payload.depth)),
            other => other,
        })?;

    cache.invalidate(&db.tenant).await;
    Ok(response::created(json!({ "id": result.last_insert_id() }), "Org level created"))
}

#[utoipa::path(
    delete,
    path = "/api/org/levels/{level_id}",
    params(("level_id" = u64, Path, description = "Level ID")),
    responses(
        (status = 200, description = "Level deleted"),
        (status = 404, description = "Level not found"),
        (status = 409, description = "Level still in use")
    ),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn delete_level(
    auth: AuthUser,
    db: TenantDb,
    cache: web::Data<OrgTreeCache>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;
    let level_id = path.into_inner();

    let result = sqlx::query("DELETE FROM org_levels WHERE id = ?")
        .bind(level_id)
        .execute(&db.pool)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::conflict("Org level is still used by units"),
            other => other,
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Org level"));
    }

    cache.invalidate(&db.tenant).await;
    Ok(response::message("Org level deleted"))
}

// -------------------- Units --------------------

#[utoipa::path(
    get,
    path = "/api/org/units",
    params(UnitQuery),
    responses((status = 200, description = "Flat unit list", body = [OrgUnit])),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn list_units(
    db: TenantDb,
    query: web::Query<UnitQuery>,
) -> Result<HttpResponse, ApiError> {
    let mut filters = Filters::new();
    filters
        .push_opt("parent_id = ?", query.parent_id)
        .push_opt("level_id = ?", query.level_id);
    if query.roots_only.unwrap_or(false) {
        filters.push("parent_id IS NULL", Vec::new());
    }

    let sql = format!(
        "SELECT {} FROM org_units {} ORDER BY name, id",
        UNIT_COLUMNS,
        filters.where_clause()
    );
    let units = bind_values!(sqlx::query_as::<_, OrgUnit>(&sql), filters.values())
        .fetch_all(&db.pool)
        .await?;

    Ok(response::ok(units))
}

#[utoipa::path(
    get,
    path = "/api/org/units/{unit_id}",
    params(("unit_id" = u64, Path, description = "Unit ID")),
    responses(
        (status = 200, body = OrgUnit),
        (status = 404, description = "Unit not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn get_unit(db: TenantDb, path: web::Path<u64>) -> Result<HttpResponse, ApiError> {
    match fetch_unit(&db.pool, path.into_inner()).await? {
        Some(unit) => Ok(response::ok(unit)),
        None => Err(ApiError::not_found("Org unit")),
    }
}

#[utoipa::path(
    post,
    path = "/api/org/units",
    request_body = CreateUnit,
    responses(
        (status = 201, description = "Unit created"),
        (status = 400, description = "Level or parent invalid"),
        (status = 409, description = "Unit code already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn create_unit(
    auth: AuthUser,
    db: TenantDb,
    cache: web::Data<OrgTreeCache>,
    payload: web::Json<CreateUnit>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;

    if payload.name.trim().is_empty() || payload.code.trim().is_empty() {
        return Err(ApiError::bad_request("name and code are required"));
    }

    check_placement(&db.pool, None, payload.level_id, payload.parent_id).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO org_units (name, code, level_id, parent_id, manager_employee_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.code.trim())
    .bind(payload.level_id)
    .bind(payload.parent_id)
    .bind(payload.manager_employee_id)
    .execute(&db.pool)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("Unit code already exists or manager is unknown"),
        other => other,
    })?;

    cache.invalidate(&db.tenant).await;
    info!(unit_id = result.last_insert_id(), tenant = %db.tenant, "Org unit created");

    Ok(response::created(json!({ "id": result.last_insert_id() }), "Org unit created"))
}

#[utoipa::path(
    put,
    path = "/api/org/units/{unit_id}",
    params(("unit_id" = u64, Path, description = "Unit ID")),
    request_body = UpdateUnit,
    responses(
        (status = 200, description = "Unit updated"),
        (status = 400, description = "Level or parent invalid"),
        (status = 404, description = "Unit not found"),
        (status = 409, description = "Move would create a cycle")
    ),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn update_unit(
    auth: AuthUser,
    db: TenantDb,
    cache: web::Data<OrgTreeCache>,
    path: web::Path<u64>,
    payload: web::Json<UpdateUnit>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;
    let unit_id = path.into_inner();

    let current = fetch_unit(&db.pool, unit_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Org unit"))?;

    let payload = payload.into_inner();
    let name = payload.name.unwrap_or(current.name);
    let code = payload.code.unwrap_or(current.code);
    let level_id = payload.level_id.unwrap_or(current.level_id);
    let parent_id = payload.parent_id.unwrap_or(current.parent_id);
    let manager_employee_id = payload
        .manager_employee_id
        .unwrap_or(current.manager_employee_id);

    if name.trim().is_empty() || code.trim().is_empty() {
        return Err(ApiError::bad_request("name and code cannot be empty"));
    }

    if level_id != current.level_id || parent_id != current.parent_id {
        check_placement(&db.pool, Some(unit_id), level_id, parent_id).await?;
    }

    sqlx::query(
        r#"
        UPDATE org_units
        SET name = ?, code = ?, level_id = ?, parent_id = ?, manager_employee_id = ?
        WHERE id = ?
        "#,
    )
    .bind(name.trim())
    .bind(code.trim())
    .bind(level_id)
    .bind(parent_id)
    .bind(manager_employee_id)
    .bind(unit_id)
    .execute(&db.pool)
    .await?;

    cache.invalidate(&db.tenant).await;
    Ok(response::message("Org unit updated"))
}

#[utoipa::path(
    delete,
    path = "/api/org/units/{unit_id}",
    params(("unit_id" = u64, Path, description = "Unit ID")),
    responses(
        (status = 200, description = "Unit deleted"),
        (status = 404, description = "Unit not found"),
        (status = 409, description = "Unit has children or employees")
    ),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn delete_unit(
    auth: AuthUser,
    db: TenantDb,
    cache: web::Data<OrgTreeCache>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;
    let unit_id = path.into_inner();

    let children = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM org_units WHERE parent_id = ?")
        .bind(unit_id)
        .fetch_one(&db.pool)
        .await?;
    if children > 0 {
        return Err(ApiError::conflict(format!(
            "Org unit has {} child unit(s); move or delete them first",
            children
        )));
    }

    let result = sqlx::query("DELETE FROM org_units WHERE id = ?")
        .bind(unit_id)
        .execute(&db.pool)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::conflict("Org unit still has employees assigned"),
            other => other,
        })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Org unit"));
    }

    cache.invalidate(&db.tenant).await;
    Ok(response::message("Org unit deleted"))
}

// -------------------- Tree --------------------

async fn load_tree(pool: &MySqlPool, tenant: &str) -> Result<OrgTree, sqlx::Error> {
    let rows = sqlx::query_as::<_, OrgUnitRow>(
        r#"
        SELECT u.id, u.name, u.code, u.level_id, l.name AS level_name, l.depth, u.parent_id,
               (SELECT COUNT(*) FROM employees e WHERE e.org_unit_id = u.id) AS employee_count
        FROM org_units u
        JOIN org_levels l ON l.id = u.level_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let tree = build_tree(rows);
    if !tree.promoted.is_empty() {
        warn!(tenant, promoted = ?tree.promoted, "Org units detached from their parent");
    }
    Ok(tree)
}

#[utoipa::path(
    get,
    path = "/api/org/tree",
    responses((status = 200, description = "Nested organization tree", body = OrgTreeResponse)),
    security(("bearer_auth" = [])),
    tag = "Organization"
)]
pub async fn get_tree(
    db: TenantDb,
    cache: web::Data<OrgTreeCache>,
) -> Result<HttpResponse, ApiError> {
    let pool = db.pool.clone();
    let tenant = db.tenant.clone();

    let tree = cache
        .trees
        .try_get_with(db.tenant.clone(), async move {
            load_tree(&pool, &tenant).await.map(Arc::new)
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to build org tree");
            ApiError::internal()
        })?;

    Ok(response::ok(OrgTreeResponse {
        roots: tree.roots.clone(),
        promoted: tree.promoted.clone(),
    }))
}
