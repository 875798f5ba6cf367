//! The main entry point: opens point timeseries of climate-model output from ESGF and
//! mirrors raw files for offline use.

use crate::assembly::assembler::{SeriesRequest, TimeseriesAssembler};
use crate::assembly::grid::DatasetOpener;
use crate::auth::session::{AuthSession, AuthSettings, HttpSession};
use crate::auth::token_store::TOKEN_FILE_NAME;
use crate::catalog::search::CatalogSearchClient;
use crate::error::PointFetchError;
use crate::transfer::bulk::{BulkRetrieval, BulkRun};
use crate::transfer::resumable::ResumableTransfer;
use crate::types::config::ClientConfig;
use crate::types::series::{AssembledSeries, LatLon, TimeWindow};
use crate::utils::{ensure_cache_dir_exists, get_cache_dir};
use bon::bon;
use log::info;
use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const POINTS_DIR_NAME: &str = "points";
pub const RAW_DIR_NAME: &str = "raw";

/// First and last year of the historical segment of [`ClimateModelClient::open_all_timeseries`].
pub const HISTORICAL_YEARS: (i32, i32) = (1950, 2014);
/// First and last year of the scenario segment of [`ClimateModelClient::open_all_timeseries`].
pub const SCENARIO_YEARS: (i32, i32) = (2015, 2100);
/// Years covered by [`ClimateModelClient::open_nat_timeseries`].
pub const NAT_YEARS: (i32, i32) = (1950, 2020);

/// One catalog record, reduced to what identifies an ensemble member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRow {
    pub model: String,
    pub experiment: String,
    pub member_id: Option<String>,
    pub grid_label: Option<String>,
}

/// The client for point-series retrieval.
///
/// Holds one [`HttpSession`] shared by the catalog search and every transfer, so a
/// credential is refreshed at most once no matter how many files are fetched.
pub struct ClimateModelClient {
    config: ClientConfig,
    cache_dir: PathBuf,
    session: HttpSession,
    assembler: TimeseriesAssembler,
    bulk: BulkRetrieval,
}

#[bon]
impl ClimateModelClient {
    /// Creates a client with the default configuration, caching under the platform cache
    /// directory and reading files through NetCDF.
    ///
    /// # Errors
    ///
    /// [`PointFetchError::CacheDirResolution`] when no cache directory exists for this
    /// platform, and any error of [`ClimateModelClient::from_config`].
    #[cfg(feature = "netcdf")]
    pub async fn new() -> Result<Self, PointFetchError> {
        Self::from_config(
            ClientConfig::default(),
            Arc::new(crate::assembly::netcdf_backend::NetcdfOpener),
        )
        .await
    }

    /// Loads a JSON configuration file and creates a client from it.
    pub async fn from_config_file(
        path: &Path,
        opener: Arc<dyn DatasetOpener>,
    ) -> Result<Self, PointFetchError> {
        let config = ClientConfig::from_json_file(path).await?;
        Self::from_config(config, opener).await
    }

    /// Creates a client, logging in first when a credential issuer is configured.
    ///
    /// The cache directory is `config.cache_dir` or the platform cache directory; it is
    /// created when missing. A stored credential in `<cache>/globus_tokens.json` is reused,
    /// otherwise the interactive login runs once.
    ///
    /// # Errors
    ///
    /// * [`PointFetchError::Config`] for invalid search or bulk settings.
    /// * [`PointFetchError::CacheDirResolution`] / [`PointFetchError::CacheDirCreation`]
    ///   when the cache directory cannot be resolved or created.
    /// * [`PointFetchError::Auth`] when login or loading the stored credential fails.
    pub async fn from_config(
        config: ClientConfig,
        opener: Arc<dyn DatasetOpener>,
    ) -> Result<Self, PointFetchError> {
        config.esgf.validate()?;
        config.bulk.validate()?;

        let cache_dir = match &config.cache_dir {
            Some(dir) => dir.clone(),
            None => get_cache_dir().map_err(PointFetchError::CacheDirResolution)?,
        };
        ensure_cache_dir_exists(&cache_dir)
            .await
            .map_err(|e| PointFetchError::CacheDirCreation(cache_dir.clone(), e))?;

        let client = Client::builder()
            .build()
            .map_err(PointFetchError::HttpClient)?;
        let token_path = config
            .auth
            .token_path
            .clone()
            .unwrap_or_else(|| cache_dir.join(TOKEN_FILE_NAME));
        let settings = AuthSettings::builder()
            .maybe_client_id(config.esgf.auth_client_id.clone())
            .scopes(config.esgf.auth_scopes.clone())
            .endpoints(config.auth.clone())
            .token_path(token_path)
            .build();
        let session = AuthSession::new(settings, client).session().await?;

        Ok(Self::with_session(config, cache_dir, session, opener))
    }

    /// Creates a client around an existing session. Nothing is read from the environment
    /// and no directory is created up front.
    pub fn with_session(
        config: ClientConfig,
        cache_dir: impl Into<PathBuf>,
        session: HttpSession,
        opener: Arc<dyn DatasetOpener>,
    ) -> Self {
        let cache_dir = cache_dir.into();
        info!(
            "Client for {} caching under {}",
            config.esgf.index_url,
            cache_dir.display()
        );
        let catalog = CatalogSearchClient::new(config.esgf.clone(), session.clone());
        let transfer = ResumableTransfer::new(session.clone(), config.transfer.clone());
        let assembler = TimeseriesAssembler::new(
            catalog.clone(),
            transfer.clone(),
            opener,
            cache_dir.join(POINTS_DIR_NAME),
        );
        let bulk = BulkRetrieval::new(
            catalog,
            transfer,
            config.bulk.clone(),
            cache_dir.join(RAW_DIR_NAME),
        );
        Self {
            config,
            cache_dir,
            session,
            assembler,
            bulk,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn session(&self) -> &HttpSession {
        &self.session
    }

    pub fn catalog(&self) -> &CatalogSearchClient {
        self.assembler.catalog()
    }

    /// Opens the series of one experiment at the grid cell nearest to `location`.
    ///
    /// The ensemble member is `member` when given, otherwise chosen deterministically from
    /// the catalog. Constituent files are streamed into `<cache>/points/` and reused by
    /// later calls.
    ///
    /// # Errors
    ///
    /// [`PointFetchError::Config`] when `end_year < start_year`, and
    /// [`PointFetchError::Assembly`] for any search, transfer or extraction failure.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use esgf_point::{ClimateModelClient, LatLon, PointFetchError};
    /// # async fn run(client: ClimateModelClient) -> Result<(), PointFetchError> {
    /// let series = client
    ///     .open_point_timeseries()
    ///     .model("MPI-ESM1-2-LR")
    ///     .experiment("historical")
    ///     .location(LatLon(25.28, 51.53))
    ///     .start_year(1980)
    ///     .end_year(2000)
    ///     .call()
    ///     .await?;
    /// println!("{} samples from {:?}", series.len(), series.metadata.member);
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub async fn open_point_timeseries(
        &self,
        #[builder(into)] model: String,
        #[builder(into)] experiment: String,
        location: LatLon,
        start_year: i32,
        end_year: i32,
        #[builder(into)] member: Option<String>,
    ) -> Result<AssembledSeries, PointFetchError> {
        let request = SeriesRequest::builder()
            .model(model)
            .experiment(experiment)
            .point(location)
            .window(TimeWindow::years(start_year, end_year)?)
            .maybe_member(member)
            .build();
        Ok(self.assembler.open(&request).await?)
    }

    /// Opens the historical run (1950–2014) continued by the scenario run (2015–2100).
    ///
    /// The two experiments choose their members independently unless `member` pins both.
    /// Experiment ids come from `config.esgf.experiments`.
    #[builder]
    pub async fn open_all_timeseries(
        &self,
        #[builder(into)] model: String,
        location: LatLon,
        #[builder(into)] member: Option<String>,
    ) -> Result<AssembledSeries, PointFetchError> {
        let experiments = &self.config.esgf.experiments;
        let historical = SeriesRequest::builder()
            .model(model.clone())
            .experiment(experiments.all.clone())
            .point(location)
            .window(TimeWindow::years(HISTORICAL_YEARS.0, HISTORICAL_YEARS.1)?)
            .maybe_member(member.clone())
            .build();
        let scenario = SeriesRequest::builder()
            .model(model)
            .experiment(experiments.scenario.clone())
            .point(location)
            .window(TimeWindow::years(SCENARIO_YEARS.0, SCENARIO_YEARS.1)?)
            .maybe_member(member)
            .build();
        Ok(self
            .assembler
            .open_composite(&historical, &scenario)
            .await?)
    }

    /// Opens the natural-forcing experiment over 1950–2020.
    #[builder]
    pub async fn open_nat_timeseries(
        &self,
        #[builder(into)] model: String,
        location: LatLon,
        #[builder(into)] member: Option<String>,
    ) -> Result<AssembledSeries, PointFetchError> {
        self.open_point_timeseries()
            .model(model)
            .experiment(self.config.esgf.experiments.nat.clone())
            .location(location)
            .start_year(NAT_YEARS.0)
            .end_year(NAT_YEARS.1)
            .maybe_member(member)
            .call()
            .await
    }

    /// Lists one row per catalog record for every model and experiment.
    ///
    /// `models` defaults to `config.default_models`; `experiments` defaults to the
    /// configured historical and scenario experiments.
    #[builder]
    pub async fn available_members(
        &self,
        models: Option<Vec<String>>,
        experiments: Option<Vec<String>>,
    ) -> Result<Vec<MemberRow>, PointFetchError> {
        let models = models.unwrap_or_else(|| self.config.default_models.clone());
        let experiments = experiments.unwrap_or_else(|| self.default_experiments());

        let mut rows = Vec::new();
        for model in &models {
            for experiment in &experiments {
                let records = self.catalog().search(model, experiment).await?;
                rows.extend(records.into_iter().map(|record| MemberRow {
                    model: model.clone(),
                    experiment: experiment.clone(),
                    member_id: record.member_id,
                    grid_label: record.grid_label,
                }));
            }
        }
        Ok(rows)
    }

    /// Mirrors every file of the given models and experiments into `<cache>/raw/`.
    ///
    /// Behaviour (worker count, dry run, size limit) follows `config.bulk`. Failures of
    /// single files are reported in the returned summary, they do not abort the batch.
    #[builder]
    pub async fn bulk_download(
        &self,
        models: Option<Vec<String>>,
        experiments: Option<Vec<String>>,
    ) -> Result<BulkRun, PointFetchError> {
        let models = models.unwrap_or_else(|| self.config.default_models.clone());
        let experiments = experiments.unwrap_or_else(|| self.default_experiments());
        Ok(self.bulk.run(&models, &experiments).await?)
    }

    fn default_experiments(&self) -> Vec<String> {
        let experiments = &self.config.esgf.experiments;
        vec![experiments.all.clone(), experiments.scenario.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::error::{AssemblyError, DatasetError};
    use crate::assembly::grid::{ArrayData, GridDataset, InMemoryGrid};
    use crate::types::config::{BulkConfig, SearchConfig, TransferConfig};
    use httpmock::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct MapOpener(HashMap<String, InMemoryGrid>);

    impl DatasetOpener for MapOpener {
        fn open(&self, path: &Path) -> Result<Box<dyn GridDataset>, DatasetError> {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            self.0
                .get(name)
                .cloned()
                .map(|g| Box::new(g) as Box<dyn GridDataset>)
                .ok_or_else(|| DatasetError::Open(path.to_path_buf(), "unknown".to_string()))
        }
    }

    /// Daily noon values from `first_year` through `last_year` in a 365-day calendar.
    fn yearly_grid(first_year: i32, last_year: i32, value: f64) -> InMemoryGrid {
        let offset = (first_year - 1950) as usize * 365;
        let days = (last_year - first_year + 1) as usize * 365;
        InMemoryGrid::default()
            .with_variable("lat", ArrayData::new(vec![2], vec![40.0, 50.0]))
            .with_variable("lon", ArrayData::new(vec![2], vec![0.0, 10.0]))
            .with_variable(
                "time",
                ArrayData::new(vec![days], (offset..offset + days).map(|d| d as f64 + 0.5).collect()),
            )
            .with_attribute("time", "units", "days since 1950-01-01")
            .with_attribute("time", "calendar", "noleap")
            .with_variable("tasmax", ArrayData::new(vec![days, 2, 2], vec![value; days * 4]))
    }

    fn doc(server: &MockServer, experiment: &str, member: &str, name: &str) -> serde_json::Value {
        json!({
            "dataset_id": format!("CMIP6.M.{experiment}.{member}"),
            "member_id": [member],
            "grid_label": ["gn"],
            "url": [format!("{}|application/netcdf|HTTPServer", server.url(format!("/files/{name}")))]
        })
    }

    async fn mock_search(server: &MockServer, experiment: &str, docs: Vec<serde_json::Value>) {
        let count = docs.len();
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/esg-search/search")
                    .query_param("experiment_id", experiment);
                then.status(200).json_body(json!({
                    "response": { "numFound": count, "docs": docs }
                }));
            })
            .await;
    }

    async fn mock_file(server: &MockServer, name: &str) {
        server
            .mock_async(|when, then| {
                when.path(format!("/files/{name}"));
                then.status(200).body(format!("contents of {name}"));
            })
            .await;
    }

    fn client(server: &MockServer, cache: &TempDir, grids: HashMap<String, InMemoryGrid>) -> ClimateModelClient {
        let config = ClientConfig::builder()
            .esgf(
                SearchConfig::builder()
                    .index_url(server.url("/esg-search"))
                    .upgrade_to_https(false)
                    .build(),
            )
            .transfer(TransferConfig::builder().upgrade_to_https(false).build())
            .default_models(vec!["M".to_string()])
            .bulk(BulkConfig::builder().max_workers(2).build())
            .build();
        ClimateModelClient::with_session(
            config,
            cache.path(),
            HttpSession::anonymous(Client::new()),
            Arc::new(MapOpener(grids)),
        )
    }

    #[tokio::test]
    async fn test_open_all_joins_historical_and_scenario() {
        let server = MockServer::start_async().await;
        mock_search(&server, "historical", vec![doc(&server, "historical", "r1i1p1f1", "hist.nc")]).await;
        mock_search(&server, "ssp245", vec![doc(&server, "ssp245", "r2i1p1f1", "ssp.nc")]).await;
        mock_file(&server, "hist.nc").await;
        mock_file(&server, "ssp.nc").await;

        let cache = TempDir::new().unwrap();
        let grids = HashMap::from([
            ("hist.nc".to_string(), yearly_grid(1950, 2014, 1.0)),
            // Starts before the historical segment ends; the overlap must not survive.
            ("ssp.nc".to_string(), yearly_grid(2010, 2020, 2.0)),
        ]);
        let client = client(&server, &cache, grids);

        let series = client
            .open_all_timeseries()
            .model("M")
            .location(LatLon(44.0, 3.0))
            .call()
            .await
            .unwrap();

        assert!(series.is_strictly_increasing());
        assert_eq!(series.len(), (2020 - 1950 + 1) * 365);
        assert_eq!(series.first().unwrap().time.to_string(), "1950-01-01 12:00:00");
        assert_eq!(series.last().unwrap().time.to_string(), "2020-12-31 12:00:00");
        let scenario_values = series.points().iter().filter(|p| p.value == 2.0).count();
        assert_eq!(scenario_values, 6 * 365);
        assert_eq!(series.metadata.grid_point, Some(LatLon(40.0, 0.0)));
        assert!(cache.path().join("points").join("hist.nc").exists());
    }

    #[tokio::test]
    async fn test_open_nat_uses_configured_experiment() {
        let server = MockServer::start_async().await;
        mock_search(&server, "hist-nat", vec![doc(&server, "hist-nat", "r1i1p1f1", "nat.nc")]).await;
        mock_file(&server, "nat.nc").await;

        let cache = TempDir::new().unwrap();
        let grids = HashMap::from([("nat.nc".to_string(), yearly_grid(1950, 2020, 3.0))]);
        let client = client(&server, &cache, grids);

        let series = client
            .open_nat_timeseries()
            .model("M")
            .location(LatLon(49.0, 9.0))
            .member("r1i1p1f1")
            .call()
            .await
            .unwrap();
        assert_eq!(series.metadata.experiment, "hist-nat");
        assert_eq!(series.metadata.member.as_deref(), Some("r1i1p1f1"));
        assert_eq!(series.metadata.grid_point, Some(LatLon(50.0, 10.0)));
        assert_eq!(series.len(), 71 * 365);
    }

    #[tokio::test]
    async fn test_inverted_years_are_rejected_before_searching() {
        let server = MockServer::start_async().await;
        let cache = TempDir::new().unwrap();
        let client = client(&server, &cache, HashMap::new());

        let result = client
            .open_point_timeseries()
            .model("M")
            .experiment("historical")
            .location(LatLon(0.0, 0.0))
            .start_year(2000)
            .end_year(1990)
            .call()
            .await;
        assert!(matches!(result, Err(PointFetchError::Config(_))));
    }

    #[tokio::test]
    async fn test_missing_entries_surface_as_assembly_error() {
        let server = MockServer::start_async().await;
        mock_search(&server, "historical", vec![]).await;
        let cache = TempDir::new().unwrap();
        let client = client(&server, &cache, HashMap::new());

        let result = client
            .open_point_timeseries()
            .model("M")
            .experiment("historical")
            .location(LatLon(0.0, 0.0))
            .start_year(1990)
            .end_year(2000)
            .call()
            .await;
        assert!(matches!(
            result,
            Err(PointFetchError::Assembly(AssemblyError::NoEntries { .. }))
        ));
    }

    #[tokio::test]
    async fn test_available_members_lists_each_record() {
        let server = MockServer::start_async().await;
        mock_search(
            &server,
            "historical",
            vec![
                doc(&server, "historical", "r1i1p1f1", "a.nc"),
                doc(&server, "historical", "r2i1p1f1", "b.nc"),
            ],
        )
        .await;
        mock_search(&server, "ssp245", vec![doc(&server, "ssp245", "r1i1p1f1", "c.nc")]).await;

        let cache = TempDir::new().unwrap();
        let client = client(&server, &cache, HashMap::new());
        let rows = client.available_members().call().await.unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].model, "M");
        assert_eq!(rows[1].member_id.as_deref(), Some("r2i1p1f1"));
        assert_eq!(rows[2].experiment, "ssp245");
        assert!(rows.iter().all(|r| r.grid_label.as_deref() == Some("gn")));
    }

    #[tokio::test]
    async fn test_bulk_download_mirrors_into_raw_dir() {
        let server = MockServer::start_async().await;
        mock_search(&server, "historical", vec![doc(&server, "historical", "r1i1p1f1", "a.nc")]).await;
        mock_file(&server, "a.nc").await;

        let cache = TempDir::new().unwrap();
        let client = client(&server, &cache, HashMap::new());
        let run = client
            .bulk_download()
            .experiments(vec!["historical".to_string()])
            .call()
            .await
            .unwrap();

        let BulkRun::Completed(summary) = run else {
            panic!("expected a completed run");
        };
        assert_eq!(summary.ok(), 1);
        let path = cache.path().join("raw/M/historical/a.nc");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "contents of a.nc");
    }

    #[tokio::test]
    async fn test_from_config_without_client_id_is_anonymous() {
        let cache = TempDir::new().unwrap();
        let config = ClientConfig::builder()
            .cache_dir(cache.path().join("nested"))
            .build();
        // The environment may still carry a client id; only assert when it does not.
        if std::env::var(crate::auth::session::ENV_CLIENT_ID).is_ok() {
            return;
        }
        let client = ClimateModelClient::from_config(config, Arc::new(MapOpener(HashMap::new())))
            .await
            .unwrap();
        assert!(!client.session().is_authenticated());
        assert!(client.cache_dir().is_dir());
    }
}
