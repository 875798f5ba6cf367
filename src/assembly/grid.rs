//! Read access to gridded files, and nearest-cell lookup on their coordinates.

use crate::assembly::error::DatasetError;
use crate::types::series::LatLon;
use haversine::{distance, Location as HaversineLocation, Units};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;

/// A variable read in full, flattened in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayData {
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl ArrayData {
    pub fn new(shape: Vec<usize>, values: Vec<f64>) -> Self {
        Self { shape, values }
    }
}

/// Horizontal index of a grid cell: `y` is the latitude (row) axis, `x` the longitude axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub y: usize,
    pub x: usize,
}

/// An open gridded file.
///
/// Data variables are laid out as `(time, y, x)`.
pub trait GridDataset {
    fn has_variable(&self, name: &str) -> bool;

    /// Reads a whole variable. Only used for coordinates, which are small.
    fn read_all(&self, name: &str) -> Result<ArrayData, DatasetError>;

    /// A text or numeric attribute of `variable`, rendered as text.
    fn attribute(&self, variable: &str, name: &str) -> Option<String>;

    /// Reads `variable` at one cell for the time steps in `time`.
    fn read_point(
        &self,
        variable: &str,
        cell: GridCell,
        time: Range<usize>,
    ) -> Result<Vec<f64>, DatasetError>;
}

/// Opens files fetched into the cache.
pub trait DatasetOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn GridDataset>, DatasetError>;
}

/// A small grid held in memory, with the same layout rules as a file backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMemoryGrid {
    pub variables: HashMap<String, ArrayData>,
    #[serde(default)]
    pub attributes: HashMap<String, HashMap<String, String>>,
}

impl InMemoryGrid {
    pub fn with_variable(mut self, name: impl Into<String>, data: ArrayData) -> Self {
        self.variables.insert(name.into(), data);
        self
    }

    pub fn with_attribute(
        mut self,
        variable: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes
            .entry(variable.into())
            .or_default()
            .insert(name.into(), value.into());
        self
    }

    fn variable(&self, name: &str) -> Result<&ArrayData, DatasetError> {
        self.variables
            .get(name)
            .ok_or_else(|| DatasetError::MissingVariable(name.to_string()))
    }
}

impl GridDataset for InMemoryGrid {
    fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    fn read_all(&self, name: &str) -> Result<ArrayData, DatasetError> {
        self.variable(name).cloned()
    }

    fn attribute(&self, variable: &str, name: &str) -> Option<String> {
        self.attributes.get(variable)?.get(name).cloned()
    }

    fn read_point(
        &self,
        variable: &str,
        cell: GridCell,
        time: Range<usize>,
    ) -> Result<Vec<f64>, DatasetError> {
        let data = self.variable(variable)?;
        let &[nt, ny, nx] = data.shape.as_slice() else {
            return Err(DatasetError::Shape {
                variable: variable.to_string(),
                shape: data.shape.clone(),
            });
        };
        if cell.y >= ny || cell.x >= nx || time.end > nt || data.values.len() != nt * ny * nx {
            return Err(DatasetError::Read {
                variable: variable.to_string(),
                message: format!("index {cell:?} / {time:?} out of bounds for {:?}", data.shape),
            });
        }
        Ok(time
            .map(|t| data.values[(t * ny + cell.y) * nx + cell.x])
            .collect())
    }
}

/// A grid cell centre as stored in the R-tree.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CellCentre {
    lat: f64,
    lon: f64,
    cell: GridCell,
}

impl RTreeObject for CellCentre {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lon])
    }
}

impl PointDistance for CellCentre {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.lat - point[0];
        let dy = self.lon - point[1];
        dx * dx + dy * dy
    }
}

/// Nearest-cell lookup over a grid's latitude/longitude coordinates.
#[derive(Debug, Clone)]
pub struct GridLocator {
    kind: LocatorKind,
}

#[derive(Debug, Clone)]
enum LocatorKind {
    /// 1-D `lat(y)` and `lon(x)`; each axis is searched independently.
    Rectilinear {
        lat: Vec<f64>,
        lon: Vec<f64>,
        lon_max: f64,
    },
    /// 2-D `lat(y, x)` and `lon(y, x)`.
    Curvilinear { tree: RTree<CellCentre>, lon_max: f64 },
}

/// The cell chosen for a requested point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestCell {
    pub cell: GridCell,
    pub centre: LatLon,
    pub distance_km: f64,
}

impl GridLocator {
    /// Builds a locator from coordinate arrays, which must both be 1-D or both 2-D with
    /// the same shape.
    pub fn new(lat: ArrayData, lon: ArrayData) -> Result<Self, DatasetError> {
        let lon_max = lon.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let kind = match (lat.shape.len(), lon.shape.len()) {
            (1, 1) if !lat.values.is_empty() && !lon.values.is_empty() => {
                LocatorKind::Rectilinear {
                    lat: lat.values,
                    lon: lon.values,
                    lon_max,
                }
            }
            (2, 2) if lat.shape == lon.shape && lat.values.len() == lon.values.len() => {
                let nx = lat.shape[1].max(1);
                let centres = lat
                    .values
                    .iter()
                    .zip(&lon.values)
                    .enumerate()
                    .map(|(i, (&lat, &lon))| CellCentre {
                        lat,
                        lon,
                        cell: GridCell {
                            y: i / nx,
                            x: i % nx,
                        },
                    })
                    .collect();
                LocatorKind::Curvilinear {
                    tree: RTree::bulk_load(centres),
                    lon_max,
                }
            }
            _ => {
                return Err(DatasetError::Shape {
                    variable: "lat/lon".to_string(),
                    shape: [lat.shape, lon.shape].concat(),
                })
            }
        };
        Ok(Self { kind })
    }

    /// The cell whose centre is nearest to `point`, with its great-circle distance.
    pub fn nearest(&self, point: LatLon) -> Option<NearestCell> {
        let (cell, centre) = match &self.kind {
            LocatorKind::Rectilinear { lat, lon, lon_max } => {
                let wanted_lon = wrap_longitude(point.longitude(), *lon_max);
                let y = nearest_index(lat, point.latitude())?;
                let x = nearest_index(lon, wanted_lon)?;
                (GridCell { y, x }, LatLon(lat[y], lon[x]))
            }
            LocatorKind::Curvilinear { tree, lon_max } => {
                let wanted_lon = wrap_longitude(point.longitude(), *lon_max);
                let found = tree.nearest_neighbor(&[point.latitude(), wanted_lon])?;
                (found.cell, LatLon(found.lat, found.lon))
            }
        };
        Some(NearestCell {
            cell,
            centre,
            distance_km: great_circle_km(point, centre),
        })
    }
}

/// Moves `longitude` into the grid's convention: `[0, 360)` when the grid extends past
/// 180 degrees east, `[-180, 180)` otherwise.
pub fn wrap_longitude(longitude: f64, grid_lon_max: f64) -> f64 {
    if grid_lon_max > 180.0 {
        longitude.rem_euclid(360.0)
    } else {
        (longitude + 180.0).rem_euclid(360.0) - 180.0
    }
}

fn nearest_index(values: &[f64], wanted: f64) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .min_by(|a, b| {
            (a.1 - wanted)
                .abs()
                .partial_cmp(&(b.1 - wanted).abs())
                .unwrap_or(Ordering::Equal)
        })
        .map(|(i, _)| i)
}

fn great_circle_km(from: LatLon, to: LatLon) -> f64 {
    distance(
        HaversineLocation {
            latitude: from.latitude(),
            longitude: from.longitude(),
        },
        HaversineLocation {
            latitude: to.latitude(),
            longitude: wrap_longitude(to.longitude(), 180.0),
        },
        Units::Kilometers,
    )
}
