//! Resource lifecycle adapters.
//!
//! Each resource maps the host's create/read/update/delete verbs onto
//! Keyfactor calls. State goes in and comes out as a typed record; problems
//! are reported through [`Diagnostics`] rather than returned, so a partially
//! successful create can still hand back the identifier it obtained.
//!
//! `read` returning `None` without error diagnostics means the remote object
//! no longer exists and the host should forget it.

pub mod certificate;
pub mod deployment;
pub mod identity;
pub mod role;
pub mod store;

pub use certificate::{CertificateResource, CertificateState};
pub use deployment::{DeploymentResource, DeploymentState, StoreAssignment};
pub use identity::{IdentityResource, IdentityState};
pub use role::{RoleResource, RoleState};
pub use store::{StoreResource, StoreState};

use crate::diagnostics::Diagnostics;
use crate::keyfactor::{KeyfactorApi, KeyfactorError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use std::str::FromStr;
use tracing::warn;

#[async_trait]
pub trait Resource: Send + Sync {
    type State: Serialize + DeserializeOwned + Clone + PartialEq + Debug + Send + Sync;

    const TYPE_NAME: &'static str;

    /// Attributes that may change without replacing the object.
    const UPDATABLE: &'static [&'static str];

    async fn create(
        &self,
        api: &dyn KeyfactorApi,
        planned: &Self::State,
        diags: &mut Diagnostics,
    ) -> Option<Self::State>;

    async fn read(
        &self,
        api: &dyn KeyfactorApi,
        state: &Self::State,
        diags: &mut Diagnostics,
    ) -> Option<Self::State>;

    async fn update(
        &self,
        api: &dyn KeyfactorApi,
        prior: &Self::State,
        planned: &Self::State,
        diags: &mut Diagnostics,
    ) -> Option<Self::State>;

    async fn delete(&self, api: &dyn KeyfactorApi, state: &Self::State, diags: &mut Diagnostics);

    /// Fills the planned state's computed attributes from the prior state,
    /// so only configuration differences remain when the two are compared.
    fn carry_computed(prior: &Self::State, planned: &Self::State) -> Self::State;
}

/// Top-level attributes whose values differ between two states.
pub fn changed_attributes<S: Serialize>(
    prior: &S,
    planned: &S,
) -> Result<Vec<String>, serde_json::Error> {
    let prior = serde_json::to_value(prior)?;
    let planned = serde_json::to_value(planned)?;
    let empty = serde_json::Map::new();
    let before = prior.as_object().unwrap_or(&empty);
    let after = planned.as_object().unwrap_or(&empty);

    let mut changed: Vec<String> = before
        .keys()
        .chain(after.keys().filter(|k| !before.contains_key(*k)))
        .filter(|key| {
            before.get(*key).unwrap_or(&Value::Null) != after.get(*key).unwrap_or(&Value::Null)
        })
        .cloned()
        .collect();
    changed.sort();
    Ok(changed)
}

/// Checks the update against the resource's allow-list. Records an error
/// diagnostic naming the offending attributes and returns false when any
/// attribute outside it changed.
pub fn check_updatable<R: Resource>(
    prior: &R::State,
    planned: &R::State,
    diags: &mut Diagnostics,
) -> bool {
    let changed = match changed_attributes(prior, planned) {
        Ok(changed) => changed,
        Err(e) => {
            diags.error("Unable to compare resource states", e);
            return false;
        }
    };
    let rejected: Vec<String> = changed
        .into_iter()
        .filter(|attr| !R::UPDATABLE.contains(&attr.as_str()))
        .collect();
    if rejected.is_empty() {
        return true;
    }
    diags.error(
        "Update not supported",
        format!(
            "{} attributes {} cannot be updated in place; replace the resource to change them",
            R::TYPE_NAME,
            rejected.join(", ")
        ),
    );
    false
}

/// Parses the remote identifier out of state.
pub(crate) fn parse_id<T: FromStr>(
    type_name: &str,
    id: Option<&str>,
    diags: &mut Diagnostics,
) -> Option<T> {
    match id.map(str::trim) {
        Some(raw) if !raw.is_empty() => match raw.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                diags.error(
                    "Invalid resource identifier",
                    format!("{} id `{}` is not a valid Keyfactor identifier", type_name, raw),
                );
                None
            }
        },
        _ => {
            diags.error(
                "Missing resource identifier",
                format!("{} state has no id", type_name),
            );
            None
        }
    }
}

/// Read-path handling of a failed fetch: a missing object is dropped quietly,
/// anything else is an error.
pub(crate) fn read_failure(
    type_name: &str,
    id: &str,
    err: KeyfactorError,
    diags: &mut Diagnostics,
) {
    if err.is_not_found() {
        warn!("{} {} no longer exists, removing from state", type_name, id);
    } else {
        diags.api_error(&format!("Unable to read {}", type_name), &err);
    }
}

/// Delete-path handling: deleting something already gone is not an error.
pub(crate) fn delete_result(
    type_name: &str,
    id: &str,
    result: Result<(), KeyfactorError>,
    diags: &mut Diagnostics,
) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            warn!("{} {} was already deleted", type_name, id);
        }
        Err(e) => diags.api_error(&format!("Unable to delete {}", type_name), &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        tags: Vec<String>,
    }

    #[test]
    fn changed_attributes_include_added_and_removed_keys() {
        let prior = Sample {
            name: "a".into(),
            note: Some("x".into()),
            tags: vec![],
        };
        let planned = Sample {
            name: "a".into(),
            note: None,
            tags: vec!["t".into()],
        };
        assert_eq!(
            changed_attributes(&prior, &planned).unwrap(),
            vec!["note".to_string(), "tags".to_string()]
        );
        assert!(changed_attributes(&prior, &prior).unwrap().is_empty());
    }

    #[test]
    fn parse_id_rejects_blank_and_garbage() {
        let mut diags = Diagnostics::new();
        assert_eq!(parse_id::<i64>("certificate", Some(" 42 "), &mut diags), Some(42));
        assert!(!diags.has_errors());
        assert_eq!(parse_id::<i64>("certificate", Some("abc"), &mut diags), None);
        assert_eq!(parse_id::<i64>("certificate", None, &mut diags), None);
        assert_eq!(diags.errors().count(), 2);
    }
}
