use crate::catalog::error::CatalogError;
use crate::transfer::error::TransferError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a [`crate::GridDataset`] backend.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to open dataset '{0}': {1}")]
    Open(PathBuf, String),

    #[error("Variable '{0}' not found in dataset")]
    MissingVariable(String),

    #[error("Failed to read variable '{variable}': {message}")]
    Read { variable: String, message: String },

    #[error("Variable '{variable}' has unsupported shape {shape:?}")]
    Shape {
        variable: String,
        shape: Vec<usize>,
    },
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("No catalog entries found for {model} {experiment}")]
    NoEntries { model: String, experiment: String },

    #[error("Member {member} not found among the candidate records")]
    MemberNotFound { member: String },

    #[error("Could not find a {axis} coordinate in '{path}'")]
    CoordinateNotFound { path: PathBuf, axis: &'static str },

    #[error("Variable '{variable}' not found in '{path}'")]
    VariableNotFound { path: PathBuf, variable: String },

    #[error("Unsupported time units '{0}'")]
    TimeUnits(String),

    #[error("Unsupported calendar '{0}'")]
    Calendar(String),

    #[error("Dataset error in '{0}'")]
    Dataset(PathBuf, #[source] DatasetError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
