//! Ensemble member selection and file ordering.

use crate::assembly::error::AssemblyError;
use crate::types::file_record::FileRecord;
use log::warn;
use std::collections::BTreeSet;

/// The records of one ensemble member, ready to be ordered and assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberSelection {
    /// `None` only when no candidate record carried a member id.
    pub member: Option<String>,
    pub records: Vec<FileRecord>,
}

/// Picks the member to assemble and keeps only its records.
///
/// A pinned member is used as given. Otherwise the lexically smallest member id among the
/// candidates wins, so repeated calls on the same catalog state agree. When no record
/// carries a member id, the first record's dataset is used and a warning is logged.
///
/// # Errors
///
/// [`AssemblyError::MemberNotFound`] when no record belongs to the chosen member.
pub fn select_member(
    records: &[FileRecord],
    pinned: Option<&str>,
) -> Result<MemberSelection, AssemblyError> {
    let member = match pinned {
        Some(member) => Some(member.to_string()),
        None => records
            .iter()
            .filter_map(|r| r.member_id.as_deref())
            .filter(|m| !m.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .next()
            .map(str::to_string),
    };

    let selected: Vec<FileRecord> = match &member {
        Some(member) => records
            .iter()
            .filter(|r| r.member_id.as_deref() == Some(member.as_str()))
            .cloned()
            .collect(),
        None => {
            let Some(first) = records.first() else {
                return Err(AssemblyError::MemberNotFound {
                    member: "<none>".to_string(),
                });
            };
            warn!(
                "No member ids among {} records; using dataset {} of the first record",
                records.len(),
                first.dataset_id
            );
            records
                .iter()
                .filter(|r| r.member_id.is_none() && r.dataset_id == first.dataset_id)
                .cloned()
                .collect()
        }
    };

    if selected.is_empty() {
        return Err(AssemblyError::MemberNotFound {
            member: member.unwrap_or_else(|| "<none>".to_string()),
        });
    }
    Ok(MemberSelection {
        member,
        records: selected,
    })
}

/// Sorts files by transport preference, then start timestamp. Files without a start
/// timestamp come first. The sort is stable, so catalog order breaks remaining ties.
pub fn order_records(records: &mut [FileRecord]) {
    records.sort_by(|a, b| {
        let key_a = (a.access.service.preference_rank(), a.datetime_start.as_deref().unwrap_or(""));
        let key_b = (b.access.service.preference_rank(), b.datetime_start.as_deref().unwrap_or(""));
        key_a.cmp(&key_b)
    });
}
