//! Whole-file retrieval for many models and experiments at once.

use crate::catalog::search::CatalogSearchClient;
use crate::transfer::error::TransferError;
use crate::transfer::resumable::{ResumableTransfer, TransferOutcome};
use crate::types::config::BulkConfig;
use crate::utils::cache_file_name;
use futures_util::{stream, StreamExt};
use log::{info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One file scheduled for retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub model: String,
    pub experiment: String,
    pub url: String,
    pub destination: PathBuf,
}

/// The files a bulk run would fetch, and their reported total size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkPlan {
    pub files: Vec<PlannedFile>,
    /// Sum of every length the server reported; files without a length count as zero.
    pub estimated_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Downloaded { bytes: u64 },
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub file: PlannedFile,
    pub outcome: FileOutcome,
}

/// Per-file results of an executed plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub reports: Vec<FileReport>,
}

impl BulkSummary {
    pub fn ok(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Downloaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&FileOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

/// Result of [`BulkRetrieval::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkRun {
    /// Dry run: the plan that would have been executed.
    Planned(BulkPlan),
    Completed(BulkSummary),
}

/// Mirrors catalog files into `<root>/<model>/<experiment>/<file name>` with a bounded
/// number of concurrent transfers.
pub struct BulkRetrieval {
    catalog: CatalogSearchClient,
    transfer: ResumableTransfer,
    config: BulkConfig,
    root: PathBuf,
}

impl BulkRetrieval {
    pub fn new(
        catalog: CatalogSearchClient,
        transfer: ResumableTransfer,
        config: BulkConfig,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            transfer,
            config,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Searches every model and experiment and lists the files to fetch.
    ///
    /// Files that map to the same destination are planned once, first occurrence wins.
    /// Pairs without catalog entries are logged and skipped.
    pub async fn plan(
        &self,
        models: &[String],
        experiments: &[String],
    ) -> Result<BulkPlan, TransferError> {
        let mut files = Vec::new();
        let mut destinations = HashSet::new();
        for model in models {
            for experiment in experiments {
                let records = self.catalog.search(model, experiment).await?;
                if records.is_empty() {
                    warn!("No catalog entries for {} {}", model, experiment);
                    continue;
                }
                for record in records {
                    let url = record.access.url;
                    let destination = self
                        .root
                        .join(model)
                        .join(experiment)
                        .join(cache_file_name(&url));
                    if destinations.insert(destination.clone()) {
                        files.push(PlannedFile {
                            model: model.clone(),
                            experiment: experiment.clone(),
                            url,
                            destination,
                        });
                    }
                }
            }
        }

        let estimated_bytes = self.estimate_bytes(&files).await;
        info!(
            "Planned {} files, estimated {} bytes",
            files.len(),
            estimated_bytes
        );
        Ok(BulkPlan {
            files,
            estimated_bytes,
        })
    }

    /// Plans, checks the size limit, then either returns the plan (dry run) or executes it.
    ///
    /// # Errors
    ///
    /// Planning failures, and [`TransferError::BudgetExceeded`] before any transfer starts.
    /// Failures of individual files are reported in the summary instead.
    pub async fn run(
        &self,
        models: &[String],
        experiments: &[String],
    ) -> Result<BulkRun, TransferError> {
        self.config.validate()?;
        let plan = self.plan(models, experiments).await?;

        if let Some(limit) = self.config.max_total_bytes {
            if plan.estimated_bytes > limit {
                warn!(
                    "Estimated {} bytes exceeds limit of {} bytes; aborting",
                    plan.estimated_bytes, limit
                );
                return Err(TransferError::BudgetExceeded {
                    estimated: plan.estimated_bytes,
                    limit,
                });
            }
        }

        if self.config.dry_run {
            for file in &plan.files {
                info!("[dry-run] {} -> {}", file.url, file.destination.display());
            }
            return Ok(BulkRun::Planned(plan));
        }

        Ok(BulkRun::Completed(self.execute(plan).await))
    }

    /// Fetches every planned file with at most `max_workers` transfers in flight.
    pub async fn execute(&self, plan: BulkPlan) -> BulkSummary {
        let workers = self.config.max_workers.max(1);
        let reports: Vec<FileReport> = stream::iter(plan.files)
            .map(|file| async move {
                let outcome = match self
                    .transfer
                    .fetch_with_report(&file.url, &file.destination)
                    .await
                {
                    Ok(TransferOutcome::Downloaded { bytes, .. }) => {
                        info!("[ok]   {}", file.destination.display());
                        FileOutcome::Downloaded { bytes }
                    }
                    Ok(TransferOutcome::AlreadyComplete { .. }) => {
                        info!("[skip] {}", file.destination.display());
                        FileOutcome::Skipped
                    }
                    Err(e) => {
                        warn!("[err]  {}: {}", file.destination.display(), e);
                        FileOutcome::Failed(e.to_string())
                    }
                };
                FileReport { file, outcome }
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let summary = BulkSummary { reports };
        info!(
            "Summary: ok={} skip={} err={}",
            summary.ok(),
            summary.skipped(),
            summary.failed()
        );
        summary
    }

    async fn estimate_bytes(&self, files: &[PlannedFile]) -> u64 {
        stream::iter(files)
            .map(|file| self.transfer.remote_length(&file.url))
            .buffer_unordered(self.config.max_workers.max(1))
            .fold(0u64, |total, length| async move {
                total + length.unwrap_or(0)
            })
            .await
    }
}
