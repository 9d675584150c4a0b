use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "acme")]
    pub tenant: String,
    #[schema(example = "hr.manager")]
    pub username: String,
    #[schema(example = "s3cret")]
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUserReq {
    #[schema(example = "j.doe")]
    pub username: String,
    #[schema(example = "change-me-now")]
    pub password: String,
    /// 1 Admin, 2 HR, 3 Employee, 4 System, 5 API user
    #[schema(example = 3)]
    pub role_id: u8,
    #[schema(example = 1)]
    pub employee_id: Option<u64>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Access token lifetime in seconds
    #[schema(example = 900)]
    pub expires_in: usize,
}

#[derive(FromRow)]
pub struct UserSql {
    pub id: u64, // 👈 matches BIGINT UNSIGNED
    pub username: String,
    pub password: String,
    pub role_id: u8,
    pub employee_id: Option<u64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8, // role id
    /// Tenant the user belongs to
    pub tenant: String,
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}
