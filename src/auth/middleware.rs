use crate::auth::auth::{AuthUser, bearer_token};
use crate::config::Config;
use crate::utils::response::ApiError;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let secret = match req.app_data::<Data<Config>>() {
        Some(config) => config.jwt_secret.clone(),
        None => return Err(ApiError::Internal("App config missing".into()).into()),
    };

    let auth_user = match bearer_token(req.request())
        .and_then(|token| AuthUser::from_token(token, &secret))
    {
        Ok(user) => user,
        Err(e) => {
            tracing::debug!(path = %req.path(), error = %e, "Rejected unauthenticated request");
            let resp = e.error_response();
            return Ok(req.into_response(resp));
        }
    };

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{Subject, generate_access_token};
    use actix_web::{App, HttpResponse, http::StatusCode, middleware::from_fn, test, web};

    async fn whoami(user: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(format!("{}@{}", user.username, user.tenant))
    }

    fn token(config: &Config) -> String {
        let subject = Subject {
            user_id: 1,
            username: "admin".into(),
            role: 1,
            tenant: "acme".into(),
            employee_id: None,
        };
        generate_access_token(&subject, &config.jwt_secret, 60).unwrap()
    }

    #[actix_web::test]
    async fn missing_header_is_rejected_with_envelope() {
        let config = Config::for_tests();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(config))
                .service(web::scope("/api").wrap(from_fn(auth_middleware)).route("/me", web::get().to(whoami))),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/me").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], serde_json::json!(false));
        assert_eq!(body["message"], serde_json::json!("Missing Authorization header"));
    }

    #[actix_web::test]
    async fn valid_token_reaches_handler() {
        let config = Config::for_tests();
        let bearer = format!("Bearer {}", token(&config));
        let app = test::init_service(
            App::new()
                .app_data(Data::new(config))
                .service(web::scope("/api").wrap(from_fn(auth_middleware)).route("/me", web::get().to(whoami))),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", bearer))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "admin@acme");
    }
}
