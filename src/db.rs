use std::collections::BTreeMap;
use std::time::Duration;

use actix_web::{FromRequest, HttpRequest, dev::Payload, web::Data};
use futures::future::LocalBoxFuture;
use moka::future::Cache;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use tracing::{error, info};

use crate::auth::auth::AuthUser;
use crate::config::{Config, normalize_tenant};
use crate::utils::response::ApiError;

/// One connection pool per tenant database, opened on first use.
pub struct TenantRegistry {
    databases: BTreeMap<String, String>,
    pools: Cache<String, MySqlPool>,
    max_connections: u32,
    acquire_timeout: Duration,
    run_migrations: bool,
}

impl TenantRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            databases: config.tenant_databases.clone(),
            pools: Cache::builder()
                .max_capacity(config.tenant_databases.len().max(1) as u64)
                .build(),
            max_connections: config.db_max_connections,
            acquire_timeout: Duration::from_secs(config.db_acquire_timeout_secs),
            run_migrations: config.run_migrations,
        }
    }

    /// Configured tenant codes, sorted
    pub fn tenants(&self) -> Vec<String> {
        self.databases.keys().cloned().collect()
    }

    pub async fn pool(&self, tenant: &str) -> Result<MySqlPool, ApiError> {
        let code = normalize_tenant(tenant);
        let url = self
            .databases
            .get(&code)
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Unknown tenant".into()))?;

        let max_connections = self.max_connections;
        let acquire_timeout = self.acquire_timeout;
        let run_migrations = self.run_migrations;
        let tenant_code = code.clone();

        self.pools
            .try_get_with(code, async move {
                info!(tenant = %tenant_code, "Opening tenant database pool");
                let pool = MySqlPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect(&url)
                    .await?;

                if run_migrations {
                    sqlx::migrate!("./migrations").run(&pool).await?;
                    info!(tenant = %tenant_code, "Tenant migrations applied");
                }

                Ok::<_, sqlx::Error>(pool)
            })
            .await
            .map_err(|e| {
                error!(error = %e, tenant = %tenant, "Failed to open tenant database");
                ApiError::Internal("Tenant database unavailable".into())
            })
    }

    /// Open every tenant pool up front so the first request doesn't pay for it
    pub async fn warmup(&self) -> anyhow::Result<()> {
        let mut failed = 0usize;

        for tenant in self.tenants() {
            if let Err(e) = self.pool(&tenant).await {
                log::warn!("Tenant {} warmup failed: {}", tenant, e);
                failed += 1;
            }
        }

        log::info!(
            "Tenant pool warmup complete: {} tenants, {} failed",
            self.databases.len(),
            failed
        );

        if failed > 0 {
            anyhow::bail!("{} tenant database(s) unavailable", failed);
        }
        Ok(())
    }
}

/// The authenticated user's tenant database
pub struct TenantDb {
    pub tenant: String,
    pub pool: MySqlPool,
}

impl FromRequest for TenantDb {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let user = AuthUser::from_request(req, payload).into_inner();
        let registry = req.app_data::<Data<TenantRegistry>>().cloned();

        Box::pin(async move {
            let user = user?;
            let registry =
                registry.ok_or_else(|| ApiError::Internal("Tenant registry missing".into()))?;
            let pool = registry.pool(&user.tenant).await?;

            Ok(TenantDb {
                tenant: user.tenant,
                pool,
            })
        })
    }
}
