use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr};

/// Where block payloads are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BlockBackend {
    Memory,
    Disk,
}

/// Where object metadata is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MetadataBackend {
    Memory,
    Sqlite,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub block_backend: BlockBackend,
    pub metadata_backend: MetadataBackend,
    pub download_concurrency: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Versioned block-based object store")]
pub struct Args {
    /// Host to bind to (overrides OBJECT_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OBJECT_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding block files (overrides OBJECT_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata database URL (overrides OBJECT_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Block storage backend (overrides OBJECT_STORE_BLOCK_BACKEND)
    #[arg(long, value_enum)]
    pub block_backend: Option<BlockBackend>,

    /// Metadata registry backend (overrides OBJECT_STORE_METADATA_BACKEND)
    #[arg(long, value_enum)]
    pub metadata_backend: Option<MetadataBackend>,

    /// Max block fetches in flight per download (overrides OBJECT_STORE_DOWNLOAD_CONCURRENCY)
    #[arg(long)]
    pub download_concurrency: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read `name`, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_backend<T: ValueEnum>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(value) => T::from_str(&value, true)
            .map_err(|err| anyhow!("parsing {} value `{}`: {}", name, value, err)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        Self::from_args(Args::parse())
    }

    fn from_args(args: Args) -> Result<(Self, bool)> {
        // --- Environment fallback ---
        let env_host = env::var("OBJECT_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_or("OBJECT_STORE_PORT", 3000u16)?;
        let env_storage =
            env::var("OBJECT_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data/blocks".into());
        let env_db = env::var("OBJECT_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/object_store.db".into());
        let env_blocks = env_backend("OBJECT_STORE_BLOCK_BACKEND", BlockBackend::Disk)?;
        let env_meta = env_backend("OBJECT_STORE_METADATA_BACKEND", MetadataBackend::Sqlite)?;
        let env_concurrency = env_or(
            "OBJECT_STORE_DOWNLOAD_CONCURRENCY",
            crate::services::DEFAULT_DOWNLOAD_CONCURRENCY,
        )?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            block_backend: args.block_backend.unwrap_or(env_blocks),
            metadata_backend: args.metadata_backend.unwrap_or(env_meta),
            download_concurrency: args.download_concurrency.unwrap_or(env_concurrency).max(1),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_defaults() {
        let args = Args::parse_from([
            "object-store",
            "--port",
            "8080",
            "--block-backend",
            "memory",
            "--metadata-backend",
            "memory",
            "--download-concurrency",
            "0",
            "--migrate",
        ]);
        let (cfg, migrate) = AppConfig::from_args(args).unwrap();
        assert!(migrate);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.block_backend, BlockBackend::Memory);
        assert_eq!(cfg.metadata_backend, MetadataBackend::Memory);
        assert_eq!(cfg.download_concurrency, 1);
        assert_eq!(cfg.addr(), format!("{}:8080", cfg.host));
    }
}
