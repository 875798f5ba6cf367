use crate::auth::session::HttpSession;
use crate::catalog::access_url::choose_access;
use crate::catalog::docs::{scalar, CatalogDoc, OneOrMany, SearchResponse};
use crate::catalog::error::CatalogError;
use crate::types::config::SearchConfig;
use crate::types::file_record::FileRecord;
use crate::utils::ensure_https;
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Pages through the ESGF search API and returns normalized [`FileRecord`]s.
#[derive(Clone)]
pub struct CatalogSearchClient {
    config: Arc<SearchConfig>,
    session: HttpSession,
}

impl CatalogSearchClient {
    pub fn new(config: SearchConfig, session: HttpSession) -> Self {
        Self {
            config: Arc::new(config),
            session,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Returns every file record the catalog holds for `model` and `experiment`.
    ///
    /// An empty result is not an error. Request failures are returned as-is, malformed
    /// entries are skipped.
    ///
    /// # Errors
    ///
    /// [`CatalogError::Config`] before any request when the configuration is unusable,
    /// otherwise the first failed page request.
    pub async fn search(
        &self,
        model: &str,
        experiment: &str,
    ) -> Result<Vec<FileRecord>, CatalogError> {
        self.config.validate()?;
        let url = self.config.search_url();
        let params = self.query_params(model, experiment);
        let limit = self.config.limit;

        let mut records = Vec::new();
        let mut seen = HashSet::new();
        for page in 0..self.config.max_pages {
            let offset = page * limit;
            let docs = self.fetch_page(&url, &params, offset).await?;
            let page_len = docs.len();
            debug!(
                "Catalog page {} for {}/{} returned {} entries",
                page, model, experiment, page_len
            );

            for doc in docs {
                let Some(record) = self.parse_doc(doc) else {
                    continue;
                };
                if seen.insert((record.dataset_id.clone(), record.access.url.clone())) {
                    records.push(record);
                }
            }

            if page_len < limit {
                break;
            }
            if page + 1 == self.config.max_pages {
                warn!(
                    "Stopped paging {}/{} after {} pages; results may be incomplete",
                    model, experiment, self.config.max_pages
                );
            }
        }

        info!(
            "Catalog search for {}/{} found {} files",
            model,
            experiment,
            records.len()
        );
        Ok(records)
    }

    /// Query parameters shared by every page of one search; `offset` is added per page.
    pub(crate) fn query_params(&self, model: &str, experiment: &str) -> Vec<(&'static str, String)> {
        let config = &self.config;
        let mut params = vec![
            ("type", "File".to_string()),
            ("project", config.project.clone()),
            ("experiment_id", experiment.to_string()),
            ("source_id", model.to_string()),
            ("variable_id", config.variable_id.clone()),
            ("table_id", config.table_id.clone()),
            ("latest", config.latest.to_string()),
            ("replica", config.replica.to_string()),
            ("distrib", config.distrib.to_string()),
            ("format", config.response_format.clone()),
            ("limit", config.limit.to_string()),
        ];
        if let Some(activity) = config.activity_id.as_ref().filter(|a| !a.is_empty()) {
            if !uses_own_activity_taxonomy(experiment) {
                params.push(("activity_id", activity.clone()));
            }
        }
        if let Some(shards) = config.shards.as_ref().filter(|s| !s.is_empty()) {
            params.push(("shards", shards.clone()));
        }
        params
    }

    async fn fetch_page(
        &self,
        url: &str,
        params: &[(&'static str, String)],
        offset: usize,
    ) -> Result<Vec<Value>, CatalogError> {
        let request = self
            .session
            .get(url)
            .query(params)
            .query(&[("offset", offset)])
            .timeout(Duration::from_secs(self.config.request_timeout_secs));
        let response = self.session.send(request).await?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Catalog request to {} failed: {:?}", url, e);
                let status = e.status().unwrap_or_default();
                return Err(CatalogError::HttpStatus {
                    url: url.to_string(),
                    status,
                    source: e,
                });
            }
        };

        let payload: SearchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::InvalidResponse(url.to_string(), e))?;
        Ok(payload.response.docs)
    }

    /// Turns one raw entry into a record, or `None` when it is unusable or filtered out.
    fn parse_doc(&self, doc: Value) -> Option<FileRecord> {
        let doc: CatalogDoc = match serde_json::from_value(doc) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Skipping malformed catalog entry: {}", e);
                return None;
            }
        };

        let url_parts = doc.url.map(OneOrMany::into_vec).unwrap_or_default();
        let Some(mut access) = choose_access(&url_parts) else {
            debug!("Skipping catalog entry without a usable access url");
            return None;
        };
        if self.config.upgrade_to_https {
            access.url = ensure_https(&access.url);
        }

        let grid_label = scalar(doc.grid_label);
        let allowed = &self.config.preferred_grid_labels;
        if !allowed.is_empty() && !grid_label.as_ref().is_some_and(|g| allowed.contains(g)) {
            debug!("Skipping {} on grid {:?}", access.url, grid_label);
            return None;
        }

        Some(FileRecord {
            dataset_id: scalar(doc.dataset_id).unwrap_or_default(),
            member_id: scalar(doc.member_id),
            grid_label,
            datetime_start: scalar(doc.datetime_start),
            datetime_stop: scalar(doc.datetime_stop),
            access,
        })
    }
}

/// Scenario and historical runs are indexed under their own activities, so an
/// `activity_id` filter would hide them.
fn uses_own_activity_taxonomy(experiment: &str) -> bool {
    let lower = experiment.to_ascii_lowercase();
    lower.starts_with("ssp") || lower == "historical"
}
