use crate::{
    api::{employee, health, notification, org, payroll_period, payslip, schema},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::anyhow;
use std::sync::Arc;

type Limiter = Governor<PeerIpKeyExtractor, NoOpMiddleware>;

/// Per-IP limiters, built once so every worker shares the same quotas
#[derive(Clone)]
pub struct Limiters {
    login: Arc<Limiter>,
    refresh: Arc<Limiter>,
    protected: Arc<Limiter>,
}

impl Limiters {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            login: Arc::new(build_limiter(config.rate_login_per_min)?),
            refresh: Arc::new(build_limiter(config.rate_refresh_per_min)?),
            protected: Arc::new(build_limiter(config.rate_protected_per_min)?),
        })
    }
}

fn build_limiter(requests_per_min: u32) -> anyhow::Result<Limiter> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);

    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit: {} requests/min", requests_per_min))?;

    Ok(Governor::new(&cfg))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &Limiters) {
    cfg.route("/health", web::get().to(health::health));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(limiters.refresh.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiters.protected.clone()) // rate limiting
            .route("/me", web::get().to(handlers::me))
            .route("/users", web::post().to(handlers::create_user))
            .service(
                web::scope("/employees")
                    // /employees
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    // /employees/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(employee::update_employee))
                            .route(web::get().to(employee::get_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    ),
            )
            .service(
                web::scope("/org")
                    .service(
                        web::resource("/levels")
                            .route(web::get().to(org::list_levels))
                            .route(web::post().to(org::create_level)),
                    )
                    .service(web::resource("/levels/{id}").route(web::delete().to(org::delete_level)))
                    .service(
                        web::resource("/units")
                            .route(web::get().to(org::list_units))
                            .route(web::post().to(org::create_unit)),
                    )
                    .service(
                        web::resource("/units/{id}")
                            .route(web::get().to(org::get_unit))
                            .route(web::put().to(org::update_unit))
                            .route(web::delete().to(org::delete_unit)),
                    )
                    .service(web::resource("/tree").route(web::get().to(org::get_tree))),
            )
            .service(
                web::scope("/payroll-periods")
                    .service(
                        web::resource("")
                            .route(web::post().to(payroll_period::create_period))
                            .route(web::get().to(payroll_period::list_periods)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(payroll_period::get_period))
                            .route(web::put().to(payroll_period::update_period))
                            .route(web::delete().to(payroll_period::delete_period)),
                    )
                    .service(web::resource("/{id}/open").route(web::post().to(payroll_period::open_period)))
                    .service(web::resource("/{id}/close").route(web::post().to(payroll_period::close_period)))
                    .service(
                        web::resource("/{id}/reopen").route(web::post().to(payroll_period::reopen_period)),
                    )
                    .service(
                        web::resource("/{id}/payslips/generate")
                            .route(web::post().to(payslip::generate_payslips)),
                    ),
            )
            .service(
                web::scope("/payslips")
                    .service(web::resource("").route(web::get().to(payslip::list_payslips)))
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(payslip::get_payslip))
                            .route(web::put().to(payslip::update_payslip))
                            .route(web::delete().to(payslip::delete_payslip)),
                    )
                    .service(web::resource("/{id}/issue").route(web::post().to(payslip::issue_payslip)))
                    .service(web::resource("/{id}/pdf").route(web::get().to(payslip::payslip_pdf))),
            )
            .service(
                web::scope("/notifications")
                    .service(
                        web::resource("")
                            .route(web::get().to(notification::list_notifications))
                            .route(web::post().to(notification::create_notification)),
                    )
                    // static segments before /{id}
                    .service(
                        web::resource("/unread-count").route(web::get().to(notification::unread_count)),
                    )
                    .service(web::resource("/read-all").route(web::put().to(notification::mark_all_read)))
                    .service(
                        web::resource("/{id}").route(web::delete().to(notification::delete_notification)),
                    )
                    .service(web::resource("/{id}/read").route(web::put().to(notification::mark_read))),
            )
            .service(
                web::scope("/admin/schema")
                    .route("/tables", web::get().to(schema::list_tables))
                    .route("/relationships", web::get().to(schema::list_relationships))
                    .route("/orphans", web::get().to(schema::find_orphans)),
            ),
    );
}

// LOGIN (tenant, username, password)
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token  -> tenant pool from claims

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns new pair, old refresh token revoked

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TenantRegistry;
    use actix_web::{App, http::StatusCode, test, web::Data};

    #[actix_web::test]
    async fn extreme_rates_still_build() {
        assert!(build_limiter(0).is_ok());
        assert!(build_limiter(1).is_ok());
        assert!(build_limiter(120_000).is_ok());
    }

    #[actix_web::test]
    async fn api_scope_requires_a_token() {
        let config = Config::for_tests();
        let limiters = Limiters::new(&config).unwrap();
        let registry = TenantRegistry::new(&config);
        let app = test::init_service(
            App::new()
                .app_data(Data::new(config.clone()))
                .app_data(Data::new(registry))
                .configure(|cfg| configure(cfg, &config, &limiters)),
        )
        .await;

        for uri in ["/api/employees", "/api/org/tree", "/api/payslips/1/pdf", "/api/me"] {
            let req = test::TestRequest::get()
                .uri(uri)
                .peer_addr("127.0.0.1:40000".parse().unwrap())
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }

        let req = test::TestRequest::get()
            .uri("/health")
            .peer_addr("127.0.0.1:40000".parse().unwrap())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
