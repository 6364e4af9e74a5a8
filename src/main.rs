use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use video_queue::app::create_app;
use video_queue::config::settings::AppConfig;
use video_queue::infrastructure::db::pool::{connect_to_db, run_migrations};
use video_queue::infrastructure::store::{MemoryStore, PgStore, SharedStore};
use video_queue::state::AppState;
use video_queue::workers::discovery;
use video_queue::workers::dispatcher::{DispatchSignal, Dispatcher};
use video_queue::workers::transcoder::FfmpegTranscoder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting video queue...");

    let config = AppConfig::new().context("failed to load configuration")?;

    let store: SharedStore = match config.database_url.as_deref() {
        Some(url) => {
            let pool = connect_to_db(url).await.context("failed to connect to PostgreSQL")?;
            run_migrations(&pool).await.context("failed to run migrations")?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, jobs are kept in memory and lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let dispatch_signal = DispatchSignal::new();
    let shutdown = CancellationToken::new();

    let dispatcher = Dispatcher::new(
        store.clone(),
        Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone())),
        &config,
        dispatch_signal.clone(),
    );
    dispatcher
        .recover_interrupted()
        .await
        .context("failed to recover interrupted jobs")?;

    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.child_token()));
    let discovery_task = tokio::spawn(discovery::run_discovery_loop(
        store.clone(),
        config.clone(),
        shutdown.child_token(),
    ));

    let addr = format!("0.0.0.0:{}", config.server_port);
    let state = AppState::new(config, store, dispatch_signal);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);
    info!("Swagger UI on http://{}/swagger-ui", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = dispatcher_task.await {
        warn!("Dispatcher task ended abnormally: {}", e);
    }
    if let Err(e) = discovery_task.await {
        warn!("Discovery task ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}
