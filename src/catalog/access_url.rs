//! Parsing of the catalog's pipe-delimited `url` field.
//!
//! Each file lists its access methods as `url|mime|service` triples. A field may come as a
//! single string holding several triples or as a list of strings; both are flattened before
//! splitting.

use crate::types::file_record::{FileAccessDescriptor, TransportService};

/// Splits a url field into its well-formed triples, in catalog order.
///
/// Trailing fragments that do not complete a triple, and triples with an empty URL, are
/// dropped.
pub fn parse_access_triples<S: AsRef<str>>(parts: &[S]) -> Vec<FileAccessDescriptor> {
    let joined = parts
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join("|");
    let entries: Vec<&str> = joined.split('|').collect();

    entries
        .chunks_exact(3)
        .filter_map(|triple| {
            let url = triple[0].trim();
            if url.is_empty() {
                return None;
            }
            let service = triple[2]
                .parse::<TransportService>()
                .unwrap_or_else(|never| match never {});
            Some(FileAccessDescriptor {
                url: url.to_string(),
                mime: triple[1].trim().to_string(),
                service,
            })
        })
        .collect()
}

/// Picks the access method to use for a file.
///
/// The most preferred service wins (earliest triple on ties), so a file served over
/// `HTTPServer` is always reached through it; otherwise the first triple is used.
pub fn choose_access<S: AsRef<str>>(parts: &[S]) -> Option<FileAccessDescriptor> {
    let triples = parse_access_triples(parts);
    let best_rank = triples.iter().map(|t| t.service.preference_rank()).min()?;
    triples
        .into_iter()
        .find(|t| t.service.preference_rank() == best_rank)
}
