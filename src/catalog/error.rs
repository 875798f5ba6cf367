use crate::auth::error::SessionError;
use crate::error::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid search configuration")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Catalog request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode catalog response from {0}")]
    InvalidResponse(String, #[source] reqwest::Error),
}
