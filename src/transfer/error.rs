use crate::auth::error::SessionError;
use crate::catalog::error::CatalogError;
use crate::error::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Transfer of {url} answered with unexpected status {status}")]
    UnexpectedStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed reading response body from {0}")]
    Stream(String, #[source] reqwest::Error),

    #[error("I/O error on '{0}'")]
    FileIo(PathBuf, #[source] std::io::Error),

    #[error("Incomplete download of '{path}': {actual} of {expected} bytes")]
    Incomplete {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Estimated batch size {estimated} bytes exceeds the limit of {limit} bytes")]
    BudgetExceeded { estimated: u64, limit: u64 },

    #[error("Failed to plan bulk retrieval")]
    Catalog(#[from] CatalogError),

    #[error("Invalid bulk configuration")]
    Config(#[from] ConfigError),
}
