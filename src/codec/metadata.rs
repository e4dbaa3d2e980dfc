//! Certificate metadata.
//!
//! The server returns every metadata field it knows as an unordered map.
//! State keeps only the names the user configured, in the order they were
//! configured.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub name: String,
    pub value: String,
}

impl MetadataEntry {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Name -> value map for a request; `None` when nothing is configured.
pub fn expand(entries: &[MetadataEntry]) -> Option<BTreeMap<String, String>> {
    if entries.is_empty() {
        return None;
    }
    Some(
        entries
            .iter()
            .map(|e| (e.name.clone(), e.value.clone()))
            .collect(),
    )
}

/// Previously configured names still present in `response`, in configured
/// order, carrying the server's values.
pub fn flatten(
    response: &BTreeMap<String, String>,
    previous: &[MetadataEntry],
) -> Vec<MetadataEntry> {
    previous
        .iter()
        .filter_map(|entry| {
            response.get(&entry.name).map(|value| MetadataEntry {
                name: entry.name.clone(),
                value: value.clone(),
            })
        })
        .collect()
}
