use crate::assembly::error::AssemblyError;
use crate::auth::error::AuthError;
use crate::catalog::error::CatalogError;
use crate::transfer::error::TransferError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PointFetchError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine cache directory")]
    CacheDirResolution(#[source] std::io::Error),

    #[error("Failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Catalog index URL is empty")]
    EmptyIndexUrl,

    #[error("Search page size must be greater than zero")]
    ZeroPageSize,

    #[error("Bulk retrieval needs at least one worker")]
    ZeroWorkers,

    #[error("Invalid time window {start} .. {end}")]
    InvalidTimeWindow { start: String, end: String },

    #[error("Failed to read config file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file '{0}'")]
    Parse(PathBuf, #[source] serde_json::Error),
}
