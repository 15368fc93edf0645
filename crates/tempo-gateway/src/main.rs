use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use tempo_core::config::TempoConfig;
use tempo_scheduler::SchedulerEngine;
use tempo_store::{SchedulerStore, SqliteRecorder};

mod app;
mod error;
mod http;

/// Tempo: job scheduler with an HTTP management API.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: $TEMPO_CONFIG or ~/.tempo/tempo.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tempo_gateway=info,tempo_scheduler=info,tempo_store=info,tower_http=debug".into()
            }),
        )
        .init();

    let args = Args::parse();
    let mut config = TempoConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        TempoConfig::default()
    });
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!(path = %config.database.path, "opening SQLite database");
    let store = Arc::new(SchedulerStore::open(&config.database.path)?);

    let dispatcher = tempo_tasks::default_dispatcher(&config.tasks)?;
    let recorder = Arc::new(SqliteRecorder::new(store.clone()));
    let engine = SchedulerEngine::new(dispatcher, recorder, &config.scheduler);

    // restore persisted jobs before the loop starts firing
    match engine.restore_all(store.as_ref()).await {
        Ok(report) if !report.failed.is_empty() => {
            warn!(failed = report.failed.len(), "some schedulers could not be restored");
        }
        Ok(_) => {}
        Err(e) => warn!("failed to restore schedulers: {e}"),
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_loop = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run(shutdown_rx).await })
    };

    let addr: SocketAddr = config.listen_addr().parse()?;
    let state = Arc::new(app::AppState::new(config, engine, store));
    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Tempo gateway listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // stop firing, then wait for running executions to record their result
    let _ = shutdown_tx.send(true);
    engine_loop.await?;
    info!("Tempo gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
