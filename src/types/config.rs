//! Configuration for catalog searches, transfers and bulk retrieval.
//!
//! Every struct deserializes from JSON with defaults for missing fields, and can be built in
//! code through its `bon` builder.

use crate::error::ConfigError;
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_INDEX_URL: &str = "https://esgf-node.llnl.gov/esg-search";
pub const DEFAULT_RESPONSE_FORMAT: &str = "application/solr+json";
pub const DEFAULT_PAGE_SIZE: usize = 500;
pub const DEFAULT_MAX_PAGES: usize = 200;
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 30;

/// Maps the roles used by the high-level opens onto catalog experiment ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct ExperimentMap {
    /// Experiment with all forcings (the historical baseline).
    #[builder(into, default = "historical".to_string())]
    pub all: String,
    /// Scenario continuing the historical run.
    #[builder(into, default = "ssp245".to_string())]
    pub scenario: String,
    /// Natural-forcing-only experiment.
    #[builder(into, default = "hist-nat".to_string())]
    pub nat: String,
}

impl Default for ExperimentMap {
    fn default() -> Self {
        ExperimentMap::builder().build()
    }
}

/// Immutable query parameters for the ESGF search API.
///
/// # Examples
///
/// ```
/// use esgf_point::SearchConfig;
///
/// let config = SearchConfig::builder()
///     .index_url("https://esgf.ceda.ac.uk/esg-search")
///     .preferred_grid_labels(vec!["gn".to_string()])
///     .limit(100)
///     .build();
/// assert_eq!(config.variable_id, "tasmax");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct SearchConfig {
    /// Base URL of the search service; `/search` is appended.
    #[builder(into, default = DEFAULT_INDEX_URL.to_string())]
    pub index_url: String,
    #[builder(default = true)]
    pub distrib: bool,
    #[builder(default = false)]
    pub replica: bool,
    #[builder(default = true)]
    pub latest: bool,
    #[serde(rename = "format")]
    #[builder(into, default = DEFAULT_RESPONSE_FORMAT.to_string())]
    pub response_format: String,
    #[builder(into, default = "CMIP6".to_string())]
    pub project: String,
    /// Activity filter, dropped for scenario and historical experiments.
    #[builder(into)]
    pub activity_id: Option<String>,
    #[builder(default)]
    pub experiments: ExperimentMap,
    #[builder(into, default = "tasmax".to_string())]
    pub variable_id: String,
    #[builder(into, default = "day".to_string())]
    pub table_id: String,
    /// Allow-list of grid labels; empty means every grid is accepted.
    #[builder(default)]
    pub preferred_grid_labels: Vec<String>,
    /// Page size (`limit` query parameter).
    #[builder(default = DEFAULT_PAGE_SIZE)]
    pub limit: usize,
    /// Upper bound on the number of page requests per search.
    #[builder(default = DEFAULT_MAX_PAGES)]
    pub max_pages: usize,
    #[builder(into)]
    pub shards: Option<String>,
    /// Client id of the credential issuer; `None` disables authentication.
    #[builder(into)]
    pub auth_client_id: Option<String>,
    #[builder(default)]
    pub auth_scopes: Vec<String>,
    #[builder(default = DEFAULT_SEARCH_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
    /// Rewrite `http://` access URLs to `https://`.
    #[builder(default = true)]
    pub upgrade_to_https: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig::builder().build()
    }
}

impl SearchConfig {
    /// Checks the values a search cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_url.trim().is_empty() {
            return Err(ConfigError::EmptyIndexUrl);
        }
        if self.limit == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        Ok(())
    }

    /// The full `/search` endpoint URL.
    pub fn search_url(&self) -> String {
        format!("{}/search", self.index_url.trim_end_matches('/'))
    }
}

/// Tuning for single-file transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct TransferConfig {
    /// Size of the buffered writer that streamed bytes pass through.
    #[builder(default = 2 * 1024 * 1024)]
    pub chunk_size: usize,
    #[builder(default = 60)]
    pub head_timeout_secs: u64,
    #[builder(default = 1800)]
    pub transfer_timeout_secs: u64,
    /// Rewrite `http://` URLs to `https://` before requesting them.
    #[builder(default = true)]
    pub upgrade_to_https: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig::builder().build()
    }
}

/// Settings for bulk retrieval across models and experiments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct BulkConfig {
    /// Number of concurrent transfers.
    #[builder(default = 3)]
    pub max_workers: usize,
    /// Plan and size the batch without transferring anything.
    #[builder(default = false)]
    pub dry_run: bool,
    /// Refuse to start when the estimated batch size exceeds this many bytes.
    pub max_total_bytes: Option<u64>,
}

impl Default for BulkConfig {
    fn default() -> Self {
        BulkConfig::builder().build()
    }
}

impl BulkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(())
    }
}

/// Endpoints of the OAuth2 credential issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct AuthEndpoints {
    #[builder(into, default = "https://auth.globus.org".to_string())]
    pub base_url: String,
    /// Redirect URI registered for native apps; the issuer displays the code there.
    #[builder(into, default = "https://auth.globus.org/v2/web/auth-code".to_string())]
    pub redirect_uri: String,
    /// Where the credential is persisted; defaults to the cache directory.
    #[builder(into)]
    pub token_path: Option<PathBuf>,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        AuthEndpoints::builder().build()
    }
}

impl AuthEndpoints {
    pub fn authorize_url(&self) -> String {
        format!("{}/v2/oauth2/authorize", self.base_url.trim_end_matches('/'))
    }

    pub fn token_url(&self) -> String {
        format!("{}/v2/oauth2/token", self.base_url.trim_end_matches('/'))
    }
}

/// Everything a [`crate::ClimateModelClient`] needs, as stored in a data catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
pub struct ClientConfig {
    #[builder(default)]
    pub esgf: SearchConfig,
    #[builder(default)]
    pub default_models: Vec<String>,
    /// Root of the local cache; defaults to the platform cache directory.
    #[builder(into)]
    pub cache_dir: Option<PathBuf>,
    #[builder(default)]
    pub transfer: TransferConfig,
    #[builder(default)]
    pub bulk: BulkConfig,
    #[builder(default)]
    pub auth: AuthEndpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::builder().build()
    }
}

impl ClientConfig {
    /// Loads a JSON data catalog file.
    pub async fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let config: ClientConfig = serde_json::from_slice(&bytes)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.esgf.validate()?;
        config.bulk.validate()?;
        Ok(config)
    }
}
