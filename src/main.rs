use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cre_portal::api::auth::{ensure_admin_user, hash_password};
use cre_portal::api::rate_limit::spawn_cleanup_task;
use cre_portal::config::Config;
use cre_portal::AppState;

/// Password shared by the sample accounts created with `--seed`
const SAMPLE_PASSWORD: &str = "Sample2026x";

#[derive(Parser, Debug)]
#[command(name = "cre-portal")]
#[command(author, version, about = "Commercial real-estate portal server", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "portal.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Override the listen port
    #[arg(short, long, env = "PORTAL_PORT")]
    port: Option<u16>,

    /// Populate an empty database with sample records
    #[arg(long)]
    seed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.seed {
        config.seed.sample_data = true;
    }

    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting cre-portal v{}", env!("CARGO_PKG_VERSION"));

    cre_portal::utils::ensure_dir(&config.server.data_dir)?;
    cre_portal::utils::ensure_dir(&config.documents_dir())?;

    let db = cre_portal::db::init(&config.server.data_dir).await?;

    ensure_admin_user(&db, &config)
        .await
        .context("Failed to create admin account")?;

    if config.seed.sample_data {
        let hash = hash_password(SAMPLE_PASSWORD)
            .map_err(|e| anyhow::anyhow!("Failed to hash sample password: {}", e))?;
        if cre_portal::db::seed_sample_data(&db, &hash).await? {
            tracing::warn!(
                password = SAMPLE_PASSWORD,
                "Sample accounts created; do not use seeded data in production"
            );
        }
    }

    let state = Arc::new(AppState::new(config.clone(), db));

    if config.rate_limit.enabled {
        spawn_cleanup_task(
            state.rate_limiter.clone(),
            config.rate_limit.cleanup_interval,
        );
    }

    let api_router = cre_portal::api::create_router(state.clone());

    // Built web app with SPA fallback
    let index_file = config.server.static_dir.join("index.html");
    let serve_static =
        ServeDir::new(&config.server.static_dir).not_found_service(ServeFile::new(&index_file));

    let app = axum::Router::new()
        .merge(api_router)
        .fallback_service(serve_static);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Portal listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
