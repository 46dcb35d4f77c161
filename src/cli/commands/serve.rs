use anyhow::Context;
use tokio::net::TcpListener;

use crate::app::{router, AppState};
use crate::cli::{connect, load_config};
use crate::database::DatabaseManager;
use crate::jobs::scheduler::Scheduler;

pub async fn handle() -> anyhow::Result<()> {
    let config = load_config();
    tracing::info!("Starting tenant CMS in {:?} mode", config.environment);

    if config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set outside development");
    }

    let pool = connect(&config).await?;
    if config.database.auto_migrate {
        DatabaseManager::migrate(&pool).await?;
    }

    let state = AppState::new(pool, config.clone())?;
    state.ops.recover_interrupted().await?;

    let jobs = Scheduler::new(state.backups(), state.verifier.clone(), &config).start();
    tracing::info!("Started {} background loop(s)", jobs.len());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for job in jobs {
        job.abort();
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
