mod assembly;
mod auth;
mod catalog;
mod client;
mod error;
mod transfer;
mod types;
mod utils;

pub use client::*;
pub use error::{ConfigError, PointFetchError};

pub use assembly::assembler::{SeriesRequest, TimeseriesAssembler};
pub use assembly::cf_time::{decode_time_axis, Calendar, TimeUnits};
pub use assembly::error::{AssemblyError, DatasetError};
pub use assembly::extract::{extract_point, PointSlice};
pub use assembly::grid::{
    wrap_longitude, ArrayData, DatasetOpener, GridCell, GridDataset, GridLocator, InMemoryGrid,
    NearestCell,
};
pub use assembly::member::{order_records, select_member, MemberSelection};
#[cfg(feature = "netcdf")]
pub use assembly::netcdf_backend::{NetcdfDataset, NetcdfOpener};

pub use auth::error::{AuthError, SessionError};
pub use auth::native_flow::{AuthorizationPrompt, StdinPrompt};
pub use auth::session::{AuthSession, AuthSettings, HttpSession, ENV_CLIENT_ID, ENV_SCOPES};
pub use auth::token_store::TokenStore;

pub use catalog::error::CatalogError;
pub use catalog::search::CatalogSearchClient;

pub use transfer::bulk::{
    BulkPlan, BulkRetrieval, BulkRun, BulkSummary, FileOutcome, FileReport, PlannedFile,
};
pub use transfer::error::TransferError;
pub use transfer::resumable::{ResumableTransfer, TransferOutcome};

pub use types::config::*;
pub use types::file_record::{FileAccessDescriptor, FileRecord, TransportService};
pub use types::series::{AssembledSeries, LatLon, SeriesMetadata, SeriesPoint, TimeWindow};
pub use types::token::TokenCredential;

pub use utils::{cache_file_name, ensure_https, get_cache_dir};
