#![allow(dead_code)]

use chrono::NaiveDate;
use esgf_point::{ArrayData, DatasetError, DatasetOpener, GridDataset, InMemoryGrid};
use httpmock::prelude::*;
use httpmock::Mock;
use serde_json::{json, Value};
use std::path::Path;

/// Reads cached files written as JSON-serialized [`InMemoryGrid`]s.
pub struct JsonGridOpener;

impl DatasetOpener for JsonGridOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn GridDataset>, DatasetError> {
        let bytes =
            std::fs::read(path).map_err(|e| DatasetError::Open(path.to_path_buf(), e.to_string()))?;
        let grid: InMemoryGrid = serde_json::from_slice(&bytes)
            .map_err(|e| DatasetError::Open(path.to_path_buf(), e.to_string()))?;
        Ok(Box::new(grid))
    }
}

/// Daily noon samples for whole calendar years on a 2x3 grid, in the standard calendar.
///
/// Every cell holds `base + day index`, so a gap or repeat shows up in the values too.
pub fn daily_grid(first_year: i32, last_year: i32, base: f64) -> InMemoryGrid {
    let epoch = NaiveDate::from_ymd_opt(1950, 1, 1).unwrap();
    let first = NaiveDate::from_ymd_opt(first_year, 1, 1).unwrap();
    let last = NaiveDate::from_ymd_opt(last_year, 12, 31).unwrap();
    let offset = (first - epoch).num_days();
    let days = (last - first).num_days() as usize + 1;

    let times = (0..days).map(|d| (offset + d as i64) as f64 + 0.5).collect();
    let values = (0..days)
        .flat_map(|d| std::iter::repeat(base + (offset + d as i64) as f64).take(6))
        .collect();
    InMemoryGrid::default()
        .with_variable("lat", ArrayData::new(vec![2], vec![20.0, 30.0]))
        .with_variable("lon", ArrayData::new(vec![3], vec![40.0, 50.0, 60.0]))
        .with_variable("time", ArrayData::new(vec![days], times))
        .with_attribute("time", "units", "days since 1950-01-01 00:00:00")
        .with_attribute("time", "calendar", "proleptic_gregorian")
        .with_variable("tasmax", ArrayData::new(vec![days, 2, 3], values))
}

/// A catalog entry for one yearly-chunked file of `member`.
pub fn catalog_doc(
    server: &MockServer,
    member: &str,
    first_year: i32,
    last_year: i32,
    grid_label: Value,
) -> Value {
    json!({
        "dataset_id": format!("CMIP6.CMIP.M.historical.{member}.day.tasmax.gn.v1"),
        "member_id": [member],
        "grid_label": grid_label,
        "datetime_start": format!("{first_year}-01-01T12:00:00Z"),
        "datetime_stop": format!("{last_year}-12-31T12:00:00Z"),
        "url": [
            format!("{}|application/opendap-html|OPENDAP", server.url(format!("/dodsC/{}", file_name(member, first_year, last_year)))),
            format!("{}|application/netcdf|HTTPServer", server.url(format!("/fileServer/{}", file_name(member, first_year, last_year)))),
        ]
    })
}

pub fn file_name(member: &str, first_year: i32, last_year: i32) -> String {
    format!("tasmax_day_M_historical_{member}_gn_{first_year}0101-{last_year}1231.nc")
}

/// Serves one catalog page holding `docs`.
pub async fn mock_catalog<'a>(server: &'a MockServer, docs: Vec<Value>) -> Mock<'a> {
    let count = docs.len();
    server
        .mock_async(|when, then| {
            when.method(GET).path("/esg-search/search");
            then.status(200)
                .json_body(json!({"response": {"numFound": count, "docs": docs}}));
        })
        .await
}

/// Serves `grid` as the body of `/fileServer/<name>` for GET and HEAD.
pub async fn mock_file<'a>(server: &'a MockServer, name: &str, grid: &InMemoryGrid) -> Mock<'a> {
    let body = serde_json::to_vec(grid).unwrap();
    server
        .mock_async(|when, then| {
            when.path(format!("/fileServer/{name}"));
            then.status(200).body(body);
        })
        .await
}
