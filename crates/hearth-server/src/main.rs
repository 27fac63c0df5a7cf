mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use hearth_api::AppStateInner;
use hearth_db::Database;
use hearth_jobs::{cleanup, worker};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hearth=debug,hearth_api=debug,hearth_jobs=debug,hearth_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Deletion steps and other deferred work
    tokio::spawn(worker::run_worker_loop(db.clone(), config.worker.clone()));
    info!(
        "Task worker polling every {}ms (batches: {} messages, {} channels, {} memberships)",
        config.worker.poll_interval.as_millis(),
        config.worker.limits.messages_per_step,
        config.worker.limits.channels_per_step,
        config.worker.limits.memberships_per_step
    );

    // Expired sessions and stale rate-limit counters
    tokio::spawn(cleanup::run_cleanup_loop(db.clone(), config.cleanup_interval_secs));

    let state = AppStateInner::new(db, config.session_ttl_days);

    let app = hearth_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Hearth server listening on {} (started {})", addr, chrono::Utc::now().to_rfc3339());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
