//! Single-file downloads that pick up where an earlier attempt stopped.

use crate::auth::session::HttpSession;
use crate::transfer::error::TransferError;
use crate::types::config::TransferConfig;
use crate::utils::ensure_https;
use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::header::{ACCEPT_ENCODING, CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

/// What a call to [`ResumableTransfer::fetch_with_report`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The local copy already had the expected length; nothing was requested.
    AlreadyComplete { size: u64 },
    /// Bytes were transferred, appended after `resumed_from` existing bytes.
    Downloaded { bytes: u64, resumed_from: u64 },
}

/// Downloads one remote file to a local path, resuming from a partial copy.
///
/// Bytes are streamed to disk through a bounded buffer. A local file is only treated as
/// complete when its size reaches the length the server reported for it. Two
/// concurrent fetches of the same destination are not coordinated.
#[derive(Clone)]
pub struct ResumableTransfer {
    session: HttpSession,
    config: TransferConfig,
}

impl ResumableTransfer {
    pub fn new(session: HttpSession, config: TransferConfig) -> Self {
        Self { session, config }
    }

    /// Fetches `url` into `destination` and returns the destination path.
    pub async fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf, TransferError> {
        self.fetch_with_report(url, destination).await?;
        Ok(destination.to_path_buf())
    }

    /// Like [`ResumableTransfer::fetch`], reporting whether any bytes moved.
    ///
    /// # Errors
    ///
    /// * [`TransferError::UnexpectedStatus`] for anything but 200 or 206. A 416 answer to a
    ///   ranged request is not an error: the local copy already holds the whole file.
    /// * [`TransferError::Incomplete`] when the file is still shorter than the reported length
    ///   after the stream ends. The partial file stays in place for the next attempt.
    pub async fn fetch_with_report(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<TransferOutcome, TransferError> {
        let url = self.target_url(url);
        let expected = self.remote_length(&url).await;
        let local_size = Self::local_size(destination).await?;

        if let Some(expected) = expected {
            if local_size >= expected {
                debug!(
                    "{} already complete ({} bytes)",
                    destination.display(),
                    local_size
                );
                return Ok(TransferOutcome::AlreadyComplete { size: local_size });
            }
        }

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::FileIo(parent.to_path_buf(), e))?;
        }

        // Identity encoding keeps the streamed byte count equal to the reported length.
        let mut request = self
            .session
            .get(&url)
            .header(ACCEPT_ENCODING, "identity")
            .timeout(Duration::from_secs(self.config.transfer_timeout_secs));
        if local_size > 0 {
            request = request.header(RANGE, format!("bytes={local_size}-"));
        }
        let response = self.session.send(request).await?;

        let status = response.status();
        if local_size > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE {
            info!(
                "{} has nothing past byte {}; treating {} as complete",
                url,
                local_size,
                destination.display()
            );
            return Ok(TransferOutcome::AlreadyComplete { size: local_size });
        }
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            warn!("Transfer of {} answered {}", url, status);
            return Err(TransferError::UnexpectedStatus { url, status });
        }

        // A 200 to a ranged request means the server ignored the range and sent everything.
        let resuming = local_size > 0 && status == StatusCode::PARTIAL_CONTENT;
        if local_size > 0 && !resuming {
            info!(
                "{} ignored the range request; rewriting {}",
                url,
                destination.display()
            );
        }

        let io_err = |e: io::Error| TransferError::FileIo(destination.to_path_buf(), e);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(resuming)
            .truncate(!resuming)
            .open(destination)
            .await
            .map_err(io_err)?;
        let mut writer = BufWriter::with_capacity(self.config.chunk_size.max(1), file);

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    // Keep what already arrived so the next attempt resumes after it.
                    writer.flush().await.map_err(io_err)?;
                    warn!("Transfer of {} broke off after {} new bytes", url, written);
                    return Err(TransferError::Stream(url, e));
                }
            };
            writer.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        writer.flush().await.map_err(io_err)?;
        writer.get_ref().sync_all().await.map_err(io_err)?;

        let final_size = Self::local_size(destination).await?;
        if let Some(expected) = expected {
            if final_size < expected {
                warn!(
                    "{} is incomplete: {} of {} bytes",
                    destination.display(),
                    final_size,
                    expected
                );
                return Err(TransferError::Incomplete {
                    path: destination.to_path_buf(),
                    expected,
                    actual: final_size,
                });
            }
        }

        let resumed_from = if resuming { local_size } else { 0 };
        info!(
            "Downloaded {} bytes of {} to {} (resumed from {})",
            written,
            url,
            destination.display(),
            resumed_from
        );
        Ok(TransferOutcome::Downloaded {
            bytes: written,
            resumed_from,
        })
    }

    /// Asks the server for the file length with a HEAD request.
    ///
    /// Returns `None` when the request fails or the header is absent.
    pub async fn remote_length(&self, url: &str) -> Option<u64> {
        let url = self.target_url(url);
        let request = self
            .session
            .head(&url)
            .header(ACCEPT_ENCODING, "identity")
            .timeout(Duration::from_secs(self.config.head_timeout_secs));
        let response = match self.session.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Length request for {} failed: {}", url, e);
                return None;
            }
        };
        if !response.status().is_success() {
            debug!("Length request for {} answered {}", url, response.status());
            return None;
        }
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
    }

    fn target_url(&self, url: &str) -> String {
        if self.config.upgrade_to_https {
            ensure_https(url)
        } else {
            url.to_string()
        }
    }

    async fn local_size(path: &Path) -> Result<u64, TransferError> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(TransferError::FileIo(path.to_path_buf(), e)),
        }
    }
}
