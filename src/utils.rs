use log::info;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

const CACHE_DIR_NAME: &str = "esgf_point_cache";

pub fn get_cache_dir() -> io::Result<PathBuf> {
    dirs::cache_dir()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine system cache directory",
            )
        })
        .map(|p| p.join(CACHE_DIR_NAME))
}

pub async fn ensure_cache_dir_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("Cache path exists but is not a directory: {}", path.display()),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Creating cache directory: {}", path.display());
            tokio::fs::create_dir_all(path).await
        }
        Err(e) => Err(e),
    }
}

/// Rewrites an `http://` URL to `https://`; other URLs are returned unchanged.
pub fn ensure_https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}


/// Deterministic local file name for a remote URL.
///
/// Uses the last path segment when there is one, otherwise a SHA-256 of the URL.
pub fn cache_file_name(url: &str) -> String {
    let last_segment = reqwest::Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    });
    match last_segment {
        Some(name) => name,
        None => {
            let digest = Sha256::digest(url.as_bytes());
            let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
            format!("{hex}.nc")
        }
    }
}
