//! Nearest-grid-point extraction from one opened file.

use crate::assembly::cf_time::decode_time_axis;
use crate::assembly::error::AssemblyError;
use crate::assembly::grid::{GridDataset, GridLocator};
use crate::types::series::{LatLon, SeriesPoint, TimeWindow};
use chrono::NaiveDateTime;
use log::debug;
use std::path::Path;

pub const LATITUDE_NAMES: &[&str] = &["lat", "latitude", "nav_lat"];
pub const LONGITUDE_NAMES: &[&str] = &["lon", "longitude", "nav_lon"];
pub const TIME_NAME: &str = "time";

/// The samples of one file at one grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSlice {
    pub points: Vec<SeriesPoint>,
    pub grid_point: LatLon,
    pub distance_km: f64,
}

/// Returns the first of `candidates` present in `dataset`.
pub fn find_coordinate<'a>(
    dataset: &dyn GridDataset,
    candidates: &[&'a str],
) -> Option<&'a str> {
    candidates.iter().copied().find(|name| dataset.has_variable(name))
}

/// Reads `variable` at the cell nearest to `point`, limited to `window`.
///
/// Only the contiguous run of time steps covering the window is read.
pub fn extract_point(
    dataset: &dyn GridDataset,
    path: &Path,
    variable: &str,
    point: LatLon,
    window: &TimeWindow,
) -> Result<PointSlice, AssemblyError> {
    let dataset_err = |e| AssemblyError::Dataset(path.to_path_buf(), e);

    let lat_name =
        find_coordinate(dataset, LATITUDE_NAMES).ok_or_else(|| AssemblyError::CoordinateNotFound {
            path: path.to_path_buf(),
            axis: "latitude",
        })?;
    let lon_name = find_coordinate(dataset, LONGITUDE_NAMES).ok_or_else(|| {
        AssemblyError::CoordinateNotFound {
            path: path.to_path_buf(),
            axis: "longitude",
        }
    })?;
    if !dataset.has_variable(TIME_NAME) {
        return Err(AssemblyError::CoordinateNotFound {
            path: path.to_path_buf(),
            axis: "time",
        });
    }
    if !dataset.has_variable(variable) {
        return Err(AssemblyError::VariableNotFound {
            path: path.to_path_buf(),
            variable: variable.to_string(),
        });
    }

    let locator = GridLocator::new(
        dataset.read_all(lat_name).map_err(dataset_err)?,
        dataset.read_all(lon_name).map_err(dataset_err)?,
    )
    .map_err(dataset_err)?;
    let nearest = locator
        .nearest(point)
        .ok_or_else(|| AssemblyError::CoordinateNotFound {
            path: path.to_path_buf(),
            axis: "latitude/longitude",
        })?;

    let raw_time = dataset.read_all(TIME_NAME).map_err(dataset_err)?;
    let units = dataset
        .attribute(TIME_NAME, "units")
        .ok_or_else(|| AssemblyError::TimeUnits(String::new()))?;
    let calendar = dataset.attribute(TIME_NAME, "calendar");
    let times = decode_time_axis(&raw_time.values, &units, calendar.as_deref())?;

    let Some(range) = window_range(&times, window) else {
        debug!("{} has no time steps inside the window", path.display());
        return Ok(PointSlice {
            points: Vec::new(),
            grid_point: nearest.centre,
            distance_km: nearest.distance_km,
        });
    };

    let values = dataset
        .read_point(variable, nearest.cell, range.clone())
        .map_err(dataset_err)?;
    let points = times[range]
        .iter()
        .zip(values)
        .filter_map(|(time, value)| {
            let time = (*time)?;
            window.contains(time).then_some(SeriesPoint::new(time, value))
        })
        .collect();

    Ok(PointSlice {
        points,
        grid_point: nearest.centre,
        distance_km: nearest.distance_km,
    })
}

/// Smallest index range holding every time step inside `window`.
fn window_range(
    times: &[Option<NaiveDateTime>],
    window: &TimeWindow,
) -> Option<std::ops::Range<usize>> {
    let inside = |t: &Option<NaiveDateTime>| t.is_some_and(|t| window.contains(t));
    let start = times.iter().position(inside)?;
    let end = times.iter().rposition(inside)? + 1;
    Some(start..end)
}
