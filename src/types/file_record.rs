//! Defines the catalog-side data structures: transport services, the access descriptor
//! picked for a file, and the normalized [`FileRecord`] returned by a catalog search.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A transport service through which an ESGF data node serves a file.
///
/// The catalog lists every file once per service, as `url|mime|service` triples.
/// Services are compared through this enum and ranked with [`SERVICE_PREFERENCE`]
/// rather than by string comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportService {
    /// Plain HTTP(S) file serving.
    HttpServer,
    /// OPeNDAP (DAP2/DAP4) subsetting endpoint.
    OpenDap,
    /// Globus transfer endpoint.
    Globus,
    /// GridFTP endpoint.
    GridFtp,
    /// Live Access Server.
    Las,
    /// Any service name this crate does not know about, kept verbatim.
    Other(String),
}

/// Services in order of preference. Anything not listed ranks after every listed entry.
pub const SERVICE_PREFERENCE: &[TransportService] = &[TransportService::HttpServer];

impl TransportService {
    /// Position of this service in [`SERVICE_PREFERENCE`]; lower is better.
    pub fn preference_rank(&self) -> usize {
        SERVICE_PREFERENCE
            .iter()
            .position(|s| s == self)
            .unwrap_or(SERVICE_PREFERENCE.len())
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransportService::HttpServer => "HTTPServer",
            TransportService::OpenDap => "OPENDAP",
            TransportService::Globus => "Globus",
            TransportService::GridFtp => "GridFTP",
            TransportService::Las => "LAS",
            TransportService::Other(name) => name,
        }
    }
}

impl FromStr for TransportService {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "HTTPServer" => TransportService::HttpServer,
            "OPENDAP" => TransportService::OpenDap,
            "Globus" => TransportService::Globus,
            "GridFTP" => TransportService::GridFtp,
            "LAS" => TransportService::Las,
            other => TransportService::Other(other.to_string()),
        })
    }
}

impl fmt::Display for TransportService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One way of reaching a file: the URL, the service behind it and the advertised MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAccessDescriptor {
    pub url: String,
    pub service: TransportService,
    pub mime: String,
}

/// A single file entry from the catalog, reduced to what point streaming needs.
///
/// Records are immutable once parsed and identified by `dataset_id` plus the access URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Dataset identifier including version and data node, e.g.
    /// `CMIP6.CMIP.NCAR.CESM2.historical.r1i1p1f1.day.tasmax.gn.v20190308|esgf-data.ucar.edu`.
    pub dataset_id: String,
    /// Ensemble member (variant label), e.g. `r1i1p1f1`. Empty strings are normalized to `None`.
    pub member_id: Option<String>,
    /// Grid label, e.g. `gn` or `gr`.
    pub grid_label: Option<String>,
    /// ISO-8601 start of the file's time coverage, as reported by the catalog.
    pub datetime_start: Option<String>,
    /// ISO-8601 end of the file's time coverage, as reported by the catalog.
    pub datetime_stop: Option<String>,
    /// The access method selected for this file.
    pub access: FileAccessDescriptor,
}

impl FileRecord {
    /// The `(dataset id, access url)` pair that identifies this record.
    pub fn identity(&self) -> (&str, &str) {
        (&self.dataset_id, &self.access.url)
    }

    /// The last path segment of the access URL, without query string.
    pub fn file_name(&self) -> Option<&str> {
        let without_query = self.access.url.split(['?', '#']).next()?;
        without_query
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
    }
}
