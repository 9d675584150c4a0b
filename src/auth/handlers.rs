use crate::{
    auth::{
        auth::{AuthUser, bearer_token},
        jwt::{Subject, generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::{Config, normalize_tenant},
    db::{TenantDb, TenantRegistry},
    model::{role::Role, user::User},
    models::{Claims, CreateUserReq, LoginReqDto, TokenPair, TokenType, UserSql},
    utils::response::{self, ApiError},
};
use actix_web::{HttpRequest, HttpResponse, web};
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument, warn};

const USER_COLUMNS: &str = "id, username, password, role_id, employee_id, is_active";

fn subject_for(user: &UserSql, tenant: &str) -> Subject {
    Subject {
        user_id: user.id,
        username: user.username.clone(),
        role: user.role_id,
        tenant: tenant.to_string(),
        employee_id: user.employee_id,
    }
}

/// Sign a fresh access/refresh pair and remember the refresh `jti`
async fn issue_tokens(
    conn: &mut sqlx::MySqlConnection,
    subject: &Subject,
    config: &Config,
) -> Result<TokenPair, ApiError> {
    let signing_failed = |e: jsonwebtoken::errors::Error| {
        error!(error = %e, "Failed to sign token");
        ApiError::internal()
    };

    let access_token =
        generate_access_token(subject, &config.jwt_secret, config.access_token_ttl).map_err(signing_failed)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(subject, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(signing_failed)?;

    debug!(user_id = subject.user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(subject.user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(&mut *conn)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: config.access_token_ttl,
    })
}

fn verify_refresh(req: &HttpRequest, secret: &str) -> Result<Claims, ApiError> {
    let token = bearer_token(req)?;
    let claims = verify_token(token, secret)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;

    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::Unauthorized("Refresh token required".into()));
    }
    Ok(claims)
}

async fn find_user(pool: &MySqlPool, user_id: u64) -> Result<Option<UserSql>, sqlx::Error> {
    sqlx::query_as::<_, UserSql>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 400, description = "Missing tenant, username or password"),
        (status = 401, description = "Invalid credentials or unknown tenant"),
        (status = 403, description = "Account disabled")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(registry, config, user),
    fields(username = %user.username, tenant = %user.tenant)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    registry: web::Data<TenantRegistry>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    info!("Login request received");

    if user.tenant.trim().is_empty() || user.username.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty tenant, username or password");
        return Err(ApiError::bad_request("Tenant, username and password are required"));
    }

    let tenant = normalize_tenant(&user.tenant);
    let pool = registry.pool(&tenant).await?;

    let db_user = sqlx::query_as::<_, UserSql>(&format!(
        "SELECT {} FROM users WHERE username = ?",
        USER_COLUMNS
    ))
    .bind(user.username.trim())
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| {
        info!("Invalid credentials: user not found");
        ApiError::Unauthorized("Invalid credentials".into())
    })?;

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    }

    if !db_user.is_active {
        info!(user_id = db_user.id, "Login refused: account disabled");
        return Err(ApiError::Forbidden("Account is disabled".into()));
    }

    let mut conn = pool.acquire().await?;
    let tokens = issue_tokens(&mut *conn, &subject_for(&db_user, &tenant), &config).await?;

    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(&mut *conn)
        .await
    {
        // login still succeeds
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = db_user.id, "Login successful");
    Ok(response::ok(tokens))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Invalid, expired or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    registry: web::Data<TenantRegistry>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let claims = verify_refresh(&req, &config.jwt_secret)?;
    let pool = registry.pool(&claims.tenant).await?;

    let user = find_user(&pool, claims.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Unknown user".into()))?;
    if !user.is_active {
        return Err(ApiError::Forbidden("Account is disabled".into()));
    }

    let mut tx = pool.begin().await?;

    // only one caller can revoke a given jti
    let revoked = sqlx::query(
        "UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ? AND user_id = ? AND revoked = FALSE",
    )
    .bind(&claims.jti)
    .bind(claims.user_id)
    .execute(&mut *tx)
    .await?;

    if revoked.rows_affected() != 1 {
        warn!(user_id = claims.user_id, jti = %claims.jti, "Refresh token reuse or unknown jti");
        return Err(ApiError::Unauthorized("Refresh token revoked".into()));
    }

    let tokens = issue_tokens(&mut *tx, &subject_for(&user, &claims.tenant), &config).await?;
    tx.commit().await?;

    debug!(user_id = user.id, "Refresh token rotated");
    Ok(response::ok(tokens))
}

/// Logout
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Refresh token revoked")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    registry: web::Data<TenantRegistry>,
    config: web::Data<Config>,
) -> HttpResponse {
    // anything unusable is already as good as logged out
    let Ok(claims) = verify_refresh(&req, &config.jwt_secret) else {
        return HttpResponse::NoContent().finish();
    };
    let Ok(pool) = registry.pool(&claims.tenant).await else {
        return HttpResponse::NoContent().finish();
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(&pool)
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}

/// Current user
#[utoipa::path(
    get,
    path = "/api/me",
    responses((status = 200, description = "Authenticated principal", body = AuthUser)),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser) -> HttpResponse {
    response::ok(auth)
}

/// Create a login for the caller's tenant
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserReq,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid username, password or role"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Username already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn create_user(
    auth: AuthUser,
    db: TenantDb,
    payload: web::Json<CreateUserReq>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin()?;

    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Username and password must not be empty"));
    }
    let role = Role::from_id(payload.role_id)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown role id {}", payload.role_id)))?;

    let hashed = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        ApiError::internal()
    })?;

    let result = sqlx::query(
        "INSERT INTO users (username, password, role_id, employee_id) VALUES (?, ?, ?, ?)",
    )
    .bind(username)
    .bind(hashed)
    .bind(role.id())
    .bind(payload.employee_id)
    .execute(&db.pool)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("Username already exists or employee is unknown"),
        other => other,
    })?;

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, role_id, employee_id, is_active, last_login_at FROM users WHERE id = ?",
    )
    .bind(result.last_insert_id())
    .fetch_one(&db.pool)
    .await?;

    info!(user_id = user.id, role = %role, by = %auth.username, "User created");

    Ok(response::created(user, "User created"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use serde_json::json;

    fn app_data() -> (web::Data<Config>, web::Data<TenantRegistry>) {
        let config = Config::for_tests();
        let registry = TenantRegistry::new(&config);
        (web::Data::new(config), web::Data::new(registry))
    }

    #[actix_web::test]
    async fn login_requires_all_fields() {
        let (config, registry) = app_data();
        let app = test::init_service(
            App::new()
                .app_data(config)
                .app_data(registry)
                .route("/auth/login", web::post().to(login)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "tenant": "", "username": "a", "password": "b" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn login_to_unknown_tenant_is_unauthorized() {
        let (config, registry) = app_data();
        let app = test::init_service(
            App::new()
                .app_data(config)
                .app_data(registry)
                .route("/auth/login", web::post().to(login)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({ "tenant": "initech", "username": "a", "password": "b" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], json!("Unknown tenant"));
    }

    #[actix_web::test]
    async fn logout_without_token_is_no_content() {
        let (config, registry) = app_data();
        let app = test::init_service(
            App::new()
                .app_data(config)
                .app_data(registry)
                .route("/auth/logout", web::post().to(logout)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::post().uri("/auth/logout").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[actix_web::test]
    async fn access_token_cannot_refresh() {
        let config = Config::for_tests();
        let subject = Subject {
            user_id: 1,
            username: "admin".into(),
            role: 1,
            tenant: "default".into(),
            employee_id: None,
        };
        let token = generate_access_token(&subject, &config.jwt_secret, 60).unwrap();
        let req = test::TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_http_request();

        assert_eq!(
            verify_refresh(&req, &config.jwt_secret).unwrap_err(),
            ApiError::Unauthorized("Refresh token required".into())
        );
    }
}
