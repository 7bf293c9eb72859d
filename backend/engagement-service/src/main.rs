use actix_middleware::{
    CorrelationIdMiddleware, IdentityMiddleware, IdentityProvider, JwtIdentityProvider, Logging,
    MetricsMiddleware,
};
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use engagement_service::config::{Config, StoreBackend, StoreConfig};
use engagement_service::handlers;
use engagement_service::workers::reconciler::{self, ReconcilerConfig};
use engagement_service::{
    ContentStore, DriftRegistry, EngagementLedger, InMemoryContentStore, PgContentStore,
};

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn ContentStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory Content Store; data is lost on restart");
            Ok(Arc::new(InMemoryContentStore::new()))
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL environment variable not set")?;

            // Prepared statement caching disabled for PgBouncer transaction mode
            let connect_options = PgConnectOptions::from_str(url)
                .context("Failed to parse DATABASE_URL")?
                .statement_cache_capacity(0);

            let pg_pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(600))
                .max_lifetime(Duration::from_secs(1800))
                .connect_with(connect_options)
                .await
                .context("Failed to connect to database")?;

            sqlx::query("SELECT 1")
                .execute(&pg_pool)
                .await
                .context("Failed to verify database connection")?;
            info!("Database pool created and verified");

            sqlx::migrate!("./migrations")
                .run(&pg_pool)
                .await
                .context("Failed to run database migrations")?;
            info!("Database migrations completed");

            Ok(Arc::new(PgContentStore::new(pg_pool)))
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.app.is_production());

    info!(
        env = %config.app.env,
        http_port = config.app.http_port,
        store = ?config.store.backend,
        "Starting engagement-service"
    );

    let store = connect_store(&config.store).await?;
    let ledger = EngagementLedger::new(store, DriftRegistry::new());
    info!("Engagement ledger initialized");

    let identity: Arc<dyn IdentityProvider> = Arc::new(
        JwtIdentityProvider::new(&config.auth.jwt_secret)
            .context("Failed to initialize identity provider")?,
    );

    let http_addr = format!("{}:{}", config.app.host, config.app.http_port);
    let admin_enabled = config.app.admin_enabled;
    let ledger_data = web::Data::new(ledger.clone());

    let http_server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(ledger_data.clone())
            .wrap(IdentityMiddleware::new(identity.clone()))
            .wrap(MetricsMiddleware)
            .wrap(Logging)
            .wrap(CorrelationIdMiddleware)
            .configure(handlers::configure_ops)
            .configure(handlers::configure);

        if admin_enabled {
            app = app.configure(handlers::configure_admin);
        }

        app
    })
    .bind(&http_addr)
    .context("Failed to bind HTTP server")?
    .disable_signals()
    .run();

    let server_handle = http_server.handle();
    info!(addr = %http_addr, admin_enabled, "HTTP server listening");

    let mut join_set = JoinSet::new();

    join_set.spawn(async move {
        http_server
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))
    });

    if config.reconcile.enabled {
        let reconciler_config = ReconcilerConfig {
            enabled: true,
            interval: Duration::from_secs(config.reconcile.interval_secs),
        };
        join_set.spawn(reconciler::run(ledger.clone(), reconciler_config));
        info!("Counter reconciler started");
    } else {
        info!("Counter reconciler disabled: RECONCILE_ENABLED=false");
    }

    join_set.spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        server_handle.stop(true).await;
        Ok(())
    });

    // Exit as soon as the server stops or any task fails
    while let Some(result) = join_set.join_next().await {
        match result {
            Ok(Ok(())) => {
                info!("Task completed");
                break;
            }
            Ok(Err(e)) => {
                tracing::error!("Task failed: {:#}", e);
                return Err(e);
            }
            Err(e) => {
                tracing::error!("Task panicked: {:#}", e);
                return Err(anyhow::anyhow!("Task panicked: {}", e));
            }
        }
    }

    // Drain anything the reconciler can still fix before exiting
    reconciler::reconcile_once(&ledger).await;

    info!("engagement-service shutting down");
    Ok(())
}
