//! Serde shapes of the Solr-style search response.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub response: SearchResponseBody,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchResponseBody {
    /// Kept as raw values so one malformed entry does not fail the whole page.
    #[serde(default)]
    pub docs: Vec<Value>,
}

/// A field that the index returns either as a bare value or as a list of values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// The scalar, or the first element of the list.
    pub fn into_first(self) -> Option<T> {
        match self {
            OneOrMany::One(value) => Some(value),
            OneOrMany::Many(values) => values.into_iter().next(),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// One entry of `response.docs`, restricted to the fields this crate reads.
#[derive(Debug, Deserialize)]
pub(crate) struct CatalogDoc {
    pub url: Option<OneOrMany<String>>,
    pub grid_label: Option<OneOrMany<String>>,
    pub member_id: Option<OneOrMany<String>>,
    pub dataset_id: Option<OneOrMany<String>>,
    pub datetime_start: Option<OneOrMany<String>>,
    pub datetime_stop: Option<OneOrMany<String>>,
}

/// Collapses a scalar-or-list field into a trimmed, non-empty scalar.
pub(crate) fn scalar(field: Option<OneOrMany<String>>) -> Option<String> {
    field
        .and_then(OneOrMany::into_first)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
