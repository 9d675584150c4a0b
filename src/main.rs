use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use std::time::Duration;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod model;
mod models;
mod routes;
mod utils;

use crate::api::org::OrgTreeCache;
use crate::db::TenantRegistry;
use crate::docs::ApiDoc;
use crate::routes::Limiters;
use config::Config;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

/// How long a built org tree is served before it is rebuilt
const ORG_TREE_TTL: Duration = Duration::from_secs(60);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "paylens.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!(
        tenants = ?config.tenant_databases.keys().collect::<Vec<_>>(),
        api_prefix = %config.api_prefix,
        "Server starting..."
    );

    let registry = Data::new(TenantRegistry::new(&config));
    let org_trees = Data::new(OrgTreeCache::new(ORG_TREE_TTL));
    let limiters = Limiters::new(&config)?;

    let warmup_registry = registry.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = warmup_registry.warmup().await {
            log::warn!("Tenant warmup incomplete: {:#}", e);
        }
    });

    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);

    HttpServer::new(move || {
        let config = config_data.clone();
        let limiters = limiters.clone();
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(config.clone())
            .app_data(registry.clone())
            .app_data(org_trees.clone())
            .configure(|cfg| routes::configure(cfg, &config, &limiters))
    })
    .bind(&server_addr)
    .with_context(|| format!("failed to bind {}", server_addr))?
    .run()
    .await?;

    Ok(())
}
