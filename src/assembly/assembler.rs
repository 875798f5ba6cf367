use crate::assembly::error::AssemblyError;
use crate::assembly::extract::{extract_point, PointSlice};
use crate::assembly::grid::DatasetOpener;
use crate::assembly::member::{order_records, select_member};
use crate::catalog::search::CatalogSearchClient;
use crate::transfer::resumable::ResumableTransfer;
use crate::types::file_record::FileRecord;
use crate::types::series::{AssembledSeries, LatLon, SeriesMetadata, TimeWindow};
use crate::utils::cache_file_name;
use bon::Builder;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One point series to assemble.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct SeriesRequest {
    #[builder(into)]
    pub model: String,
    #[builder(into)]
    pub experiment: String,
    pub point: LatLon,
    pub window: TimeWindow,
    /// Pins the ensemble member; otherwise one is chosen deterministically.
    #[builder(into)]
    pub member: Option<String>,
}

/// Turns catalog records into one ordered point series.
///
/// Files are fetched one after another into `<cache>/points/`, opened with the configured
/// [`DatasetOpener`] on the blocking pool, and reduced to the nearest grid cell before
/// being concatenated.
pub struct TimeseriesAssembler {
    catalog: CatalogSearchClient,
    transfer: ResumableTransfer,
    opener: Arc<dyn DatasetOpener>,
    points_dir: PathBuf,
}

impl TimeseriesAssembler {
    pub fn new(
        catalog: CatalogSearchClient,
        transfer: ResumableTransfer,
        opener: Arc<dyn DatasetOpener>,
        points_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            transfer,
            opener,
            points_dir: points_dir.into(),
        }
    }

    pub fn catalog(&self) -> &CatalogSearchClient {
        &self.catalog
    }

    /// Searches the catalog for the request's model and experiment, then assembles.
    pub async fn open(&self, request: &SeriesRequest) -> Result<AssembledSeries, AssemblyError> {
        let records = self
            .catalog
            .search(&request.model, &request.experiment)
            .await?;
        self.assemble(&records, request).await
    }

    /// Opens two experiments independently and joins them, the second after the first.
    ///
    /// Each experiment gets its own member selection and file ordering. Samples of the
    /// second segment in or before the first segment's final year are dropped.
    pub async fn open_composite(
        &self,
        first: &SeriesRequest,
        second: &SeriesRequest,
    ) -> Result<AssembledSeries, AssemblyError> {
        let head = self.open(first).await?;
        let tail = self.open(second).await?;
        Ok(head.append_segment(tail))
    }

    /// Assembles the series for `request` from already searched `records`.
    ///
    /// # Errors
    ///
    /// * [`AssemblyError::NoEntries`] when `records` is empty.
    /// * [`AssemblyError::MemberNotFound`] when the chosen member has no records.
    /// * Transfer, coordinate and dataset errors of any constituent file.
    pub async fn assemble(
        &self,
        records: &[FileRecord],
        request: &SeriesRequest,
    ) -> Result<AssembledSeries, AssemblyError> {
        if records.is_empty() {
            return Err(AssemblyError::NoEntries {
                model: request.model.clone(),
                experiment: request.experiment.clone(),
            });
        }

        let selection = select_member(records, request.member.as_deref())?;
        let mut files = selection.records;
        order_records(&mut files);
        info!(
            "Assembling {} {} member {:?} from {} files",
            request.model,
            request.experiment,
            selection.member,
            files.len()
        );

        let mut segments = Vec::with_capacity(files.len());
        let mut grid: Option<(LatLon, f64)> = None;
        for record in &files {
            if !may_overlap(record, &request.window) {
                debug!(
                    "Skipping {}: coverage {:?}..{:?} outside the window",
                    record.access.url, record.datetime_start, record.datetime_stop
                );
                continue;
            }

            let path = self.points_dir.join(cache_file_name(&record.access.url));
            self.transfer.fetch(&record.access.url, &path).await?;
            let slice = self.extract(path, request).await?;
            debug!(
                "{} contributed {} samples",
                record.access.url,
                slice.points.len()
            );
            grid.get_or_insert((slice.grid_point, slice.distance_km));
            segments.push(slice.points);
        }

        let metadata = SeriesMetadata {
            model: request.model.clone(),
            experiment: request.experiment.clone(),
            member: selection.member,
            requested: request.point,
            grid_point: grid.map(|(point, _)| point),
            grid_distance_km: grid.map(|(_, km)| km),
        };
        Ok(AssembledSeries::concat(metadata, segments))
    }

    async fn extract(
        &self,
        path: PathBuf,
        request: &SeriesRequest,
    ) -> Result<PointSlice, AssemblyError> {
        let opener = self.opener.clone();
        let variable = self.catalog.config().variable_id.clone();
        let point = request.point;
        let window = request.window;
        tokio::task::spawn_blocking(move || {
            let dataset = opener
                .open(&path)
                .map_err(|e| AssemblyError::Dataset(path.clone(), e))?;
            extract_point(dataset.as_ref(), &path, &variable, point, &window)
        })
        .await?
    }

    pub fn points_dir(&self) -> &Path {
        &self.points_dir
    }
}

/// False only when the record's catalog coverage is known and disjoint from `window`.
fn may_overlap(record: &FileRecord, window: &TimeWindow) -> bool {
    let start = record.datetime_start.as_deref().and_then(parse_catalog_time);
    let stop = record.datetime_stop.as_deref().and_then(parse_catalog_time);
    match (start, stop) {
        (Some(start), Some(stop)) => window.overlaps(start, stop),
        _ => true,
    }
}

/// Parses catalog timestamps such as `1950-01-01T12:00:00Z` or `1950-01-01`.
pub(crate) fn parse_catalog_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.fZ"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
