use anyhow::Result;
use axum::Router;
use config::{AppConfig, BlockBackend, MetadataBackend};
use services::ObjectService;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use storage::{
    BlockStorage, DiskBlockStorage, InMemoryBlockStorage, InMemoryMetadataRegistry,
    MetadataRegistry, SqliteMetadataRegistry,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod storage;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting object-store with config: {:?}", cfg);

    // --- Metadata registry ---
    let registry: Arc<dyn MetadataRegistry> = match cfg.metadata_backend {
        MetadataBackend::Sqlite => {
            let sqlite = open_sqlite(&cfg.database_url).await?;
            sqlite.migrate().await?;
            if migrate {
                tracing::info!("Database migration complete.");
                return Ok(()); // exit after migration
            }
            Arc::new(sqlite)
        }
        MetadataBackend::Memory => {
            if migrate {
                anyhow::bail!("--migrate requires the sqlite metadata backend");
            }
            tracing::warn!("Using in-memory metadata registry; nothing survives a restart");
            Arc::new(InMemoryMetadataRegistry::new())
        }
    };

    // --- Block storage ---
    let blocks: Arc<dyn BlockStorage> = match cfg.block_backend {
        BlockBackend::Disk => {
            if !Path::new(&cfg.storage_dir).exists() {
                fs::create_dir_all(&cfg.storage_dir)?;
                tracing::info!("Created storage directory at {}", cfg.storage_dir);
            }
            Arc::new(DiskBlockStorage::new(&cfg.storage_dir))
        }
        BlockBackend::Memory => {
            tracing::warn!("Using in-memory block storage; nothing survives a restart");
            Arc::new(InMemoryBlockStorage::new())
        }
    };

    // --- Initialize core service ---
    let service = ObjectService::new(blocks, registry, cfg.download_concurrency);

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the SQLite registry, creating the database's parent directory first.
async fn open_sqlite(db_url: &str) -> Result<SqliteMetadataRegistry> {
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if db_path != ":memory:" {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    Ok(SqliteMetadataRegistry::connect(db_url, 5).await?)
}
