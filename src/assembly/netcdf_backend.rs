//! [`GridDataset`] over NetCDF files, enabled with the `netcdf` feature.

use crate::assembly::error::DatasetError;
use crate::assembly::grid::{ArrayData, DatasetOpener, GridCell, GridDataset};
use netcdf::AttributeValue;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Opens NetCDF-3/4 files through the system `libnetcdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetcdfOpener;

impl DatasetOpener for NetcdfOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn GridDataset>, DatasetError> {
        let file = netcdf::open(path)
            .map_err(|e| DatasetError::Open(path.to_path_buf(), e.to_string()))?;
        Ok(Box::new(NetcdfDataset {
            file,
            path: path.to_path_buf(),
        }))
    }
}

pub struct NetcdfDataset {
    file: netcdf::File,
    path: PathBuf,
}

impl NetcdfDataset {
    fn variable(&self, name: &str) -> Result<netcdf::Variable<'_>, DatasetError> {
        self.file
            .variable(name)
            .ok_or_else(|| DatasetError::MissingVariable(name.to_string()))
    }

    fn numeric_attribute(&self, variable: &str, name: &str) -> Option<f64> {
        let value = self.file.variable(variable)?.attribute(name)?.value().ok()?;
        attribute_number(&value)
    }

    /// Applies CF packing (`scale_factor`, `add_offset`) and masks fill values as NaN.
    fn unpack(&self, variable: &str, values: Vec<f64>) -> Vec<f64> {
        let fill = self
            .numeric_attribute(variable, "_FillValue")
            .or_else(|| self.numeric_attribute(variable, "missing_value"));
        let scale = self.numeric_attribute(variable, "scale_factor").unwrap_or(1.0);
        let offset = self.numeric_attribute(variable, "add_offset").unwrap_or(0.0);
        values
            .into_iter()
            .map(|v| match fill {
                Some(fill) if v == fill => f64::NAN,
                _ => v * scale + offset,
            })
            .collect()
    }

    fn read_error(&self, variable: &str, error: netcdf::Error) -> DatasetError {
        DatasetError::Read {
            variable: variable.to_string(),
            message: format!("{}: {}", self.path.display(), error),
        }
    }
}

impl GridDataset for NetcdfDataset {
    fn has_variable(&self, name: &str) -> bool {
        self.file.variable(name).is_some()
    }

    fn read_all(&self, name: &str) -> Result<ArrayData, DatasetError> {
        let variable = self.variable(name)?;
        let shape: Vec<usize> = variable.dimensions().iter().map(|d| d.len()).collect();
        let values = variable
            .get_values::<f64, _>(..)
            .map_err(|e| self.read_error(name, e))?;
        Ok(ArrayData::new(shape, self.unpack(name, values)))
    }

    fn attribute(&self, variable: &str, name: &str) -> Option<String> {
        let value = self.file.variable(variable)?.attribute(name)?.value().ok()?;
        match value {
            AttributeValue::Str(text) => Some(text),
            AttributeValue::Strs(texts) => Some(texts.join(" ")),
            other => attribute_number(&other).map(|n| n.to_string()),
        }
    }

    fn read_point(
        &self,
        variable: &str,
        cell: GridCell,
        time: Range<usize>,
    ) -> Result<Vec<f64>, DatasetError> {
        let var = self.variable(variable)?;
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        if shape.len() != 3 {
            return Err(DatasetError::Shape {
                variable: variable.to_string(),
                shape,
            });
        }
        let values = var
            .get_values::<f64, _>((time, cell.y, cell.x))
            .map_err(|e| self.read_error(variable, e))?;
        Ok(self.unpack(variable, values))
    }
}

fn attribute_number(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Double(v) => Some(*v),
        AttributeValue::Float(v) => Some(f64::from(*v)),
        AttributeValue::Int(v) => Some(f64::from(*v)),
        AttributeValue::Short(v) => Some(f64::from(*v)),
        AttributeValue::Longlong(v) => Some(*v as f64),
        AttributeValue::Doubles(v) => v.first().copied(),
        AttributeValue::Floats(v) => v.first().map(|f| f64::from(*f)),
        _ => None,
    }
}
