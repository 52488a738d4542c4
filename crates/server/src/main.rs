//! Lightbox server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use lightbox_core::config::AppConfig;
use lightbox_processor::{JobRunner, UploadLocks};
use lightbox_server::{AppState, create_router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Lightbox - a catalog image ingest server
#[derive(Parser, Debug)]
#[command(name = "lightboxd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "LIGHTBOX_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Lightbox v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration: optional TOML file, overridable via env vars.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}, using defaults and env", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("LIGHTBOX_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;

    // Initialize the blob store and verify it before accepting requests.
    let storage: Arc<dyn lightbox_storage::BlobStore> = Arc::new(
        lightbox_storage::FilesystemStore::new(&config.blob.root)
            .await
            .context("failed to initialize blob store")?,
    );
    storage
        .health_check()
        .await
        .context("blob store health check failed")?;
    tracing::info!(root = %config.blob.root.display(), "Blob store initialized");

    // Initialize the metadata store (runs migrations on open).
    let metadata = lightbox_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!(path = %config.metadata.path.display(), "Metadata store initialized");

    // Job runner: recover work orphaned by a previous instance, then spawn
    // the worker pool.
    let locks = UploadLocks::new();
    let jobs = JobRunner::new(
        metadata.clone(),
        storage.clone(),
        config.job.clone(),
        config.image.clone(),
        locks.clone(),
    );
    let recovered = jobs
        .recover()
        .await
        .context("failed to recover orphaned processing jobs")?;
    if recovered > 0 {
        tracing::info!(recovered, "Orphaned processing jobs re-queued");
    }
    let _workers = jobs.spawn_workers();
    tracing::info!(workers = config.job.workers, "Processing workers spawned");

    let state = AppState::new(config.clone(), storage, metadata, locks, jobs);
    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
