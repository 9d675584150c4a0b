use crate::config::Config;
use crate::{
    auth::jwt::verify_token,
    model::role::Role,
    models::{Claims, TokenType},
    utils::response::ApiError,
};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, http::header, web::Data};
use futures::future::{Ready, ready};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
    /// Tenant whose database serves this user's requests
    pub tenant: String,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

/// Pull the bearer token out of the `Authorization` header
pub fn bearer_token(req: &HttpRequest) -> Result<&str, ApiError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid Authorization header encoding".into()))?;

    value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Authorization header must start with Bearer".into()))
}

impl AuthUser {
    /// Verify an access token and build the principal from its claims
    pub fn from_token(token: &str, secret: &str) -> Result<Self, ApiError> {
        let claims = verify_token(token, secret)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;

        if claims.token_type != TokenType::Access {
            return Err(ApiError::Unauthorized("Access token required".into()));
        }

        Self::from_claims(claims)
    }

    pub fn from_claims(claims: Claims) -> Result<Self, ApiError> {
        let role = Role::from_id(claims.role)
            .ok_or_else(|| ApiError::Unauthorized("Invalid role".into()))?;

        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
            tenant: claims.tenant,
            employee_id: claims.employee_id,
        })
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin only".into()))
        }
    }

    pub fn require_hr_or_admin(&self) -> Result<(), ApiError> {
        if self.is_hr_or_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("HR/Admin only".into()))
        }
    }

    pub fn is_hr_or_admin(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Hr)
    }

    /// HR/Admin see everyone, everybody else only their own record
    pub fn can_view_employee(&self, employee_id: u64) -> bool {
        self.is_hr_or_admin() || self.employee_id == Some(employee_id)
    }

    pub fn require_employee_access(&self, employee_id: u64) -> Result<(), ApiError> {
        if self.can_view_employee(employee_id) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Not allowed to access this employee".into()))
        }
    }
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // set by auth_middleware on the protected scope
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => return ready(Err(ApiError::Internal("Config missing".into()))),
        };

        ready(bearer_token(req).and_then(|token| AuthUser::from_token(token, &config.jwt_secret)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{Subject, generate_access_token, generate_refresh_token};
    use actix_web::test::TestRequest;

    fn user(role: Role, employee_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "u".into(),
            role,
            tenant: "acme".into(),
            employee_id,
        }
    }

    fn subject(role: u8) -> Subject {
        Subject {
            user_id: 5,
            username: "lee".into(),
            role,
            tenant: "acme".into(),
            employee_id: Some(40),
        }
    }

    #[test]
    fn role_gates() {
        assert!(user(Role::Admin, None).require_admin().is_ok());
        assert!(user(Role::Hr, None).require_admin().is_err());
        assert!(user(Role::Hr, None).require_hr_or_admin().is_ok());
        assert!(user(Role::Employee, Some(3)).require_hr_or_admin().is_err());
    }

    #[test]
    fn employees_only_see_themselves() {
        let me = user(Role::Employee, Some(3));
        assert!(me.can_view_employee(3));
        assert!(!me.can_view_employee(4));
        assert!(user(Role::Hr, None).can_view_employee(4));
        assert!(user(Role::ApiUser, None).require_employee_access(4).is_err());
    }

    #[test]
    fn refresh_token_is_not_accepted_as_access() {
        let (token, _) = generate_refresh_token(&subject(2), "k", 60).unwrap();
        assert_eq!(
            AuthUser::from_token(&token, "k").unwrap_err(),
            ApiError::Unauthorized("Access token required".into())
        );
    }

    #[test]
    fn unknown_role_is_rejected() {
        let token = generate_access_token(&subject(42), "k", 60).unwrap();
        assert!(AuthUser::from_token(&token, "k").is_err());
    }

    #[test]
    fn bearer_prefix_is_required() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Token abc"))
            .to_http_request();
        assert!(bearer_token(&req).is_err());

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req).unwrap(), "abc");
    }
}
