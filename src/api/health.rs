use actix_web::{HttpResponse, web};
use serde_json::json;

use crate::{db::TenantRegistry, utils::response};

/// Liveness check with the configured tenant codes
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", example = json!({
        "success": true,
        "data": { "status": "ok", "tenants": ["acme", "globex"] },
        "message": null
    }))),
    tag = "Health"
)]
pub async fn health(registry: web::Data<TenantRegistry>) -> HttpResponse {
    response::ok(json!({ "status": "ok", "tenants": registry.tenants() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use actix_web::{App, test};

    #[actix_web::test]
    async fn reports_tenants_without_touching_databases() {
        let registry = TenantRegistry::new(&Config::for_tests());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(registry))
                .route("/health", web::get().to(health)),
        )
        .await;

        let body: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(
            body,
            json!({ "success": true, "data": { "status": "ok", "tenants": ["default"] }, "message": null })
        );
    }
}
