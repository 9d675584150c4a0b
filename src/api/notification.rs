use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    bind_values,
    db::TenantDb,
    model::notification::{Notification, NotificationKind},
    utils::{
        db_utils::{Filters, Pagination},
        response::{self, ApiError, Page},
    },
};

const NOTIFICATION_COLUMNS: &str = "id, user_id, title, message, kind, is_read, created_at";

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateNotification {
    /// Broadcast to every active user when omitted
    #[schema(example = 7)]
    pub user_id: Option<u64>,
    #[schema(example = "Office closed")]
    pub title: String,
    #[schema(example = "The office is closed on Friday.")]
    pub message: String,
    #[schema(example = "info")]
    pub kind: Option<NotificationKind>,
}

#[derive(Deserialize, IntoParams)]
pub struct NotificationQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub unread_only: Option<bool>,
}

/// Notify every active login linked to an employee. Returns how many were written.
pub(crate) async fn notify_employee(
    pool: &MySqlPool,
    employee_id: u64,
    kind: NotificationKind,
    title: &str,
    message: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, title, message, kind)
        SELECT id, ?, ?, ? FROM users WHERE employee_id = ? AND is_active = TRUE
        "#,
    )
    .bind(title)
    .bind(message)
    .bind(kind.to_string())
    .bind(employee_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[utoipa::path(
    get,
    path = "/api/notifications",
    params(NotificationQuery),
    responses((status = 200, description = "Own notifications, newest first")),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn list_notifications(
    auth: AuthUser,
    db: TenantDb,
    query: web::Query<NotificationQuery>,
) -> Result<HttpResponse, ApiError> {
    let paging = Pagination::new(query.page, query.per_page, 20);

    let mut filters = Filters::new();
    filters.push("user_id = ?", vec![auth.user_id.into()]);
    if query.unread_only.unwrap_or(false) {
        filters.push("is_read = FALSE", Vec::new());
    }
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM notifications {}", where_clause);
    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), filters.values())
        .fetch_one(&db.pool)
        .await?;

    let data_sql = format!(
        "SELECT {} FROM notifications {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        NOTIFICATION_COLUMNS, where_clause
    );
    let items = bind_values!(sqlx::query_as::<_, Notification>(&data_sql), filters.values())
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
    path = "/api/notifications/unread-count",
    responses((status = 200, description = "Number of unread notifications", example = json!({
        "success": true, "data": { "unread": 3 }, "message": null
    }))),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn unread_count(auth: AuthUser, db: TenantDb) -> Result<HttpResponse, ApiError> {
    let unread = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = FALSE",
    )
    .bind(auth.user_id)
    .fetch_one(&db.pool)
    .await?;

    Ok(response::ok(json!({ "unread": unread })))
}

#[utoipa::path(
    post,
    path = "/api/notifications",
    request_body = CreateNotification,
    responses(
        (status = 201, description = "Notifications created"),
        (status = 400, description = "Missing title or message"),
        (status = 404, description = "Target user not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn create_notification(
    auth: AuthUser,
    db: TenantDb,
    payload: web::Json<CreateNotification>,
) -> Result<HttpResponse, ApiError> {
    auth.require_hr_or_admin()?;

    let title = payload.title.trim();
    let message = payload.message.trim();
    if title.is_empty() || message.is_empty() {
        return Err(ApiError::bad_request("title and message are required"));
    }
    let kind = payload.kind.unwrap_or(NotificationKind::Info).to_string();

    let created = match payload.user_id {
        Some(user_id) => {
            let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_one(&db.pool)
                .await?;
            if exists == 0 {
                return Err(ApiError::not_found("User"));
            }

            sqlx::query("INSERT INTO notifications (user_id, title, message, kind) VALUES (?, ?, ?, ?)")
                .bind(user_id)
                .bind(title)
                .bind(message)
                .bind(&kind)
                .execute(&db.pool)
                .await?
                .rows_affected()
        }
        None => sqlx::query(
            r#"
            INSERT INTO notifications (user_id, title, message, kind)
            SELECT id, ?, ?, ? FROM users WHERE is_active = TRUE
            "#,
        )
        .bind(title)
        .bind(message)
        .bind(&kind)
        .execute(&db.pool)
        .await?
        .rows_affected(),
    };

    info!(created, broadcast = payload.user_id.is_none(), by = %auth.username, "Notifications sent");

    Ok(response::created(json!({ "created": created }), "Notification sent"))
}

#[utoipa::path(
    put,
    path = "/api/notifications/{notification_id}/read",
    params(("notification_id" = u64, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Marked as read"),
        (status = 404, description = "Notification not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_read(
    auth: AuthUser,
    db: TenantDb,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let notification_id = path.into_inner();

    // rows_affected is 0 when the flag is already set, so check ownership separately
    let owned = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE id = ? AND user_id = ?",
    )
    .bind(notification_id)
    .bind(auth.user_id)
    .fetch_one(&db.pool)
    .await?;
    if owned == 0 {
        return Err(ApiError::not_found("Notification"));
    }

    sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = ? AND user_id = ?")
        .bind(notification_id)
        .bind(auth.user_id)
        .execute(&db.pool)
        .await?;

    Ok(response::message("Notification marked as read"))
}

#[utoipa::path(
    put,
    path = "/api/notifications/read-all",
    responses((status = 200, description = "Number of notifications marked read")),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_all_read(auth: AuthUser, db: TenantDb) -> Result<HttpResponse, ApiError> {
    let updated = sqlx::query(
        "UPDATE notifications SET is_read = TRUE WHERE user_id = ? AND is_read = FALSE",
    )
    .bind(auth.user_id)
    .execute(&db.pool)
    .await?
    .rows_affected();

    Ok(response::ok(json!({ "updated": updated })))
}

#[utoipa::path(
    delete,
    path = "/api/notifications/{notification_id}",
    params(("notification_id" = u64, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification deleted"),
        (status = 404, description = "Notification not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn delete_notification(
    auth: AuthUser,
    db: TenantDb,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
        .bind(path.into_inner())
        .bind(auth.user_id)
        .execute(&db.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Notification"));
    }

    Ok(response::message("Notification deleted"))
}
