//! Point timeseries types: the requested location, the time window, and the
//! [`AssembledSeries`] handed to statistical consumers.

use crate::error::ConfigError;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
///
/// # Examples
///
/// ```
/// use esgf_point::LatLon;
///
/// let doha = LatLon(25.2854, 51.5310);
/// assert_eq!(doha.0, 25.2854); // Latitude
/// assert_eq!(doha.1, 51.5310); // Longitude
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon(pub f64, pub f64);

impl LatLon {
    pub fn latitude(&self) -> f64 {
        self.0
    }

    pub fn longitude(&self) -> f64 {
        self.1
    }
}

/// An inclusive time window used to slice each file before its values are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, ConfigError> {
        if end < start {
            return Err(ConfigError::InvalidTimeWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// The window from January 1st of `start_year` up to the last second of December 31st
    /// of `end_year`.
    ///
    /// ```
    /// use esgf_point::TimeWindow;
    ///
    /// let window = TimeWindow::years(1950, 2014).unwrap();
    /// assert_eq!(window.start.to_string(), "1950-01-01 00:00:00");
    /// assert_eq!(window.end.to_string(), "2014-12-31 23:59:59");
    /// ```
    pub fn years(start_year: i32, end_year: i32) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidTimeWindow {
            start: start_year.to_string(),
            end: end_year.to_string(),
        };
        let start = NaiveDate::from_ymd_opt(start_year, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(invalid)?;
        let end = NaiveDate::from_ymd_opt(end_year, 12, 31)
            .and_then(|d| d.and_hms_opt(23, 59, 59))
            .ok_or_else(invalid)?;
        Self::new(start, end)
    }

    pub fn contains(&self, time: NaiveDateTime) -> bool {
        self.start <= time && time <= self.end
    }

    /// Whether `[start, stop]` intersects this window.
    pub fn overlaps(&self, start: NaiveDateTime, stop: NaiveDateTime) -> bool {
        start <= self.end && stop >= self.start
    }
}

/// One `(timestamp, value)` sample. Values stay in the units of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub time: NaiveDateTime,
    pub value: f64,
}

impl SeriesPoint {
    pub fn new(time: NaiveDateTime, value: f64) -> Self {
        Self { time, value }
    }
}

/// Where an [`AssembledSeries`] came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub model: String,
    /// Experiment id; composite series use `first+second`, e.g. `historical+ssp245`.
    pub experiment: String,
    pub member: Option<String>,
    /// The point that was asked for.
    pub requested: LatLon,
    /// Centre of the grid cell actually sampled.
    pub grid_point: Option<LatLon>,
    /// Great-circle distance between `requested` and `grid_point`.
    pub grid_distance_km: Option<f64>,
}

/// An ordered point timeseries for one model, experiment and member.
///
/// Timestamps are strictly increasing: construction sorts the samples (stably, so the
/// earlier source wins on ties) and drops repeated timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledSeries {
    pub metadata: SeriesMetadata,
    points: Vec<SeriesPoint>,
}

impl AssembledSeries {
    pub fn new(metadata: SeriesMetadata, points: Vec<SeriesPoint>) -> Self {
        let mut series = Self { metadata, points };
        series.normalize();
        series
    }

    /// Concatenates per-file segments in the given order, then restores ordering.
    pub fn concat<I>(metadata: SeriesMetadata, segments: I) -> Self
    where
        I: IntoIterator<Item = Vec<SeriesPoint>>,
    {
        let points = segments.into_iter().flatten().collect();
        Self::new(metadata, points)
    }

    /// Appends a later segment (e.g. a scenario run after its historical run).
    ///
    /// Samples of `later` that fall in or before the final year of `self` are dropped, so
    /// a boundary year reported by both segments is taken from `self` only.
    pub fn append_segment(self, later: AssembledSeries) -> Self {
        let boundary_year = self.points.last().map(|p| p.time.year());
        let mut metadata = self.metadata;
        metadata.experiment = format!("{}+{}", metadata.experiment, later.metadata.experiment);
        if metadata.member.is_none() {
            metadata.member = later.metadata.member;
        }
        if metadata.grid_point.is_none() {
            metadata.grid_point = later.metadata.grid_point;
            metadata.grid_distance_km = later.metadata.grid_distance_km;
        }

        let mut points = self.points;
        points.extend(
            later
                .points
                .into_iter()
                .filter(|p| boundary_year.map_or(true, |year| p.time.year() > year)),
        );
        Self::new(metadata, points)
    }

    fn normalize(&mut self) {
        self.points.sort_by_key(|p| p.time);
        self.points.dedup_by_key(|p| p.time);
        debug_assert!(self.is_strictly_increasing());
    }

    pub fn is_strictly_increasing(&self) -> bool {
        self.points.windows(2).all(|w| w[0].time < w[1].time)
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn into_points(self) -> Vec<SeriesPoint> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&SeriesPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.points.iter().map(|p| p.time)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.value)
    }

    /// Converts the series into a two-column polars `DataFrame` (`time`, `value`).
    ///
    /// # Errors
    ///
    /// Returns a [`PolarsError`] if the frame cannot be constructed.
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let times: Vec<NaiveDateTime> = self.timestamps().collect();
        let values: Vec<f64> = self.values().collect();
        df!("time" => times, "value" => values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn metadata(experiment: &str) -> SeriesMetadata {
        SeriesMetadata {
            model: "CESM2".to_string(),
            experiment: experiment.to_string(),
            member: Some("r1i1p1f1".to_string()),
            requested: LatLon(25.0, 51.0),
            grid_point: None,
            grid_distance_km: None,
        }
    }

    #[test]
    fn test_concat_overlapping_segments_is_strictly_ordered() {
        let first = vec![
            SeriesPoint::new(at(2000, 1, 1), 1.0),
            SeriesPoint::new(at(2000, 1, 2), 2.0),
            SeriesPoint::new(at(2000, 1, 3), 3.0),
        ];
        let second = vec![
            SeriesPoint::new(at(2000, 1, 3), 30.0),
            SeriesPoint::new(at(2000, 1, 4), 4.0),
        ];
        let series = AssembledSeries::concat(metadata("historical"), [second, first]);

        assert!(series.is_strictly_increasing());
        assert_eq!(series.len(), 4);
        // The segment listed first wins the duplicated timestamp.
        assert_eq!(series.points()[2].value, 30.0);
    }

    #[test]
    fn test_append_segment_drops_boundary_year_from_later() {
        let hist = AssembledSeries::new(
            metadata("historical"),
            vec![
                SeriesPoint::new(at(2013, 12, 31), 1.0),
                SeriesPoint::new(at(2014, 12, 31), 2.0),
            ],
        );
        let ssp = AssembledSeries::new(
            metadata("ssp245"),
            vec![
                SeriesPoint::new(at(2014, 12, 30), 9.0),
                SeriesPoint::new(at(2015, 1, 1), 3.0),
            ],
        );
        let combined = hist.append_segment(ssp);

        assert_eq!(combined.metadata.experiment, "historical+ssp245");
        let values: Vec<f64> = combined.values().collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert!(combined.is_strictly_increasing());
    }

    #[test]
    fn test_time_window_years() {
        let window = TimeWindow::years(1950, 2014).unwrap();
        assert!(window.contains(at(1950, 1, 1)));
        assert!(window.contains(at(2014, 12, 31)));
        assert!(!window.contains(at(2015, 1, 1)));
        assert!(window.overlaps(at(1900, 1, 1), at(1950, 6, 1)));
        assert!(!window.overlaps(at(2015, 1, 1), at(2100, 1, 1)));
        assert!(TimeWindow::years(2014, 1950).is_err());
    }

    #[test]
    fn test_to_frame_shape() {
        let series = AssembledSeries::new(
            metadata("historical"),
            vec![
                SeriesPoint::new(at(2000, 1, 2), 2.0),
                SeriesPoint::new(at(2000, 1, 1), 1.0),
            ],
        );
        let frame = series.to_frame().unwrap();
        assert_eq!(frame.shape(), (2, 2));
        assert_eq!(frame.get_column_names_str(), ["time", "value"]);
    }
}
