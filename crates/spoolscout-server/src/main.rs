use std::sync::Arc;

use anyhow::Context;
use sea_orm_migration::MigratorTrait;
use spoolscout_flowise::Supervisor;
use spoolscout_server::{config::ServerConfig, routes, state::AppState, store::DbStore};

async fn init_db_and_migrate(database_url: &str) -> anyhow::Result<sea_orm::DatabaseConnection> {
    let db = spoolscout_db::connect(database_url)
        .await
        .context("connect to database")?;

    // Apply migrations on boot (idempotent).
    spoolscout_migration::Migrator::up(&db, None)
        .await
        .context("apply migrations")?;

    Ok(db)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env()?;
    let db = init_db_and_migrate(&config.database_url).await?;

    let supervisor = Supervisor::new(config.flowise.clone());
    if config.flowise_autostart {
        // Never hold up serving on Flowise; search works without it.
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            match supervisor.start().await {
                Ok(()) => tracing::info!("flowise service started successfully"),
                Err(err) => tracing::warn!(%err, "failed to start flowise service"),
            }
        });
    }

    let state = AppState::new(
        Arc::new(DbStore::new(Arc::new(db))),
        Arc::new(supervisor.clone()),
    );
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("bind {}", config.http_addr))?;
    tracing::info!(addr = %config.http_addr, "spoolscout HTTP listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("shutting down");
    supervisor.stop().await;

    served?;
    Ok(())
}
