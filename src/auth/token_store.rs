use crate::auth::error::AuthError;
use crate::types::token::TokenCredential;
use log::debug;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const TOKEN_FILE_NAME: &str = "globus_tokens.json";

/// On-disk home of a [`TokenCredential`].
///
/// Writes go to a temporary file in the same directory which is then renamed over the
/// target, so a reader never sees a half-written credential.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored credential, or `None` when no token file exists yet.
    pub async fn load(&self) -> Result<Option<TokenCredential>, AuthError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No stored credential at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(AuthError::TokenRead(self.path.clone(), e)),
        };
        let credential = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::TokenDecode(self.path.clone(), e))?;
        Ok(Some(credential))
    }

    pub async fn save(&self, credential: &TokenCredential) -> Result<(), AuthError> {
        let path = self.path.clone();
        let credential = credential.clone();
        tokio::task::spawn_blocking(move || Self::write_atomic(&path, &credential)).await??;
        debug!("Persisted credential to {}", self.path.display());
        Ok(())
    }

    fn write_atomic(path: &Path, credential: &TokenCredential) -> Result<(), AuthError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let write_err = |e: io::Error| AuthError::TokenWrite(path.to_path_buf(), e);

        std::fs::create_dir_all(&parent).map_err(write_err)?;
        let mut temp_file = NamedTempFile::new_in(&parent).map_err(write_err)?;
        let json = serde_json::to_vec_pretty(credential)
            .map_err(|e| AuthError::TokenWrite(path.to_path_buf(), e.into()))?;
        temp_file.write_all(&json).map_err(write_err)?;
        temp_file.as_file().sync_all().map_err(write_err)?;
        temp_file.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}
