//! Set reconciliation for the three relationships Keyfactor models as
//! attribute lists rather than join objects:
//!
//! - identity -> role (`Identities` on the role)
//! - role -> template (`AllowedRequesters` on the template)
//! - certificate -> store (bulk add/remove endpoints)
//!
//! Each pass reads the owning object, edits its membership list and writes
//! the whole object back. Nothing guards the window between that read and
//! write: a concurrent writer to the same object loses its change or
//! overwrites ours, whichever lands last. The first failing call aborts the
//! pass; mutations already applied stay applied.

pub mod deployment;
pub mod identity_roles;
pub mod role_templates;

pub use deployment::{reconcile_certificate_stores, undeploy, DeploymentOutcome};
pub use identity_roles::reconcile_identity_roles;
pub use role_templates::{observed_templates, reconcile_role_templates};

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

/// A relationship member identifier and how it compares.
pub trait MemberKey: Clone + Debug {
    type Normalized: Eq + Hash;

    fn normalized(&self) -> Self::Normalized;
}

/// Integer IDs compare exactly.
impl MemberKey for i32 {
    type Normalized = i32;

    fn normalized(&self) -> i32 {
        *self
    }
}

/// Names compare case-insensitively.
impl MemberKey for String {
    type Normalized = String;

    fn normalized(&self) -> String {
        self.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipDelta<K> {
    pub to_add: Vec<K>,
    pub to_remove: Vec<K>,
}

impl<K> MembershipDelta<K> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// What a reconciliation pass actually changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport<K> {
    pub added: Vec<K>,
    pub removed: Vec<K>,
}

impl<K> Default for ReconcileReport<K> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Members of `left` absent from `right`, in `left` order, without
/// duplicates.
pub fn difference<K: MemberKey>(left: &[K], right: &[K]) -> Vec<K> {
    let exclude: HashSet<K::Normalized> = right.iter().map(MemberKey::normalized).collect();
    let mut seen = HashSet::new();
    left.iter()
        .filter(|k| {
            let key = k.normalized();
            !exclude.contains(&key) && seen.insert(key)
        })
        .cloned()
        .collect()
}

/// Members to add (`desired` not yet `observed`) and to remove (`observed`
/// no longer `desired`).
pub fn compute_delta<K: MemberKey>(desired: &[K], observed: &[K]) -> MembershipDelta<K> {
    MembershipDelta {
        to_add: difference(desired, observed),
        to_remove: difference(observed, desired),
    }
}

pub(crate) fn contains_name(names: &[String], name: &str) -> bool {
    names.iter().any(|n| n.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_by_id_is_exact() {
        let delta = compute_delta(&[5, 7], &[7, 9]);
        assert_eq!(delta.to_add, vec![5]);
        assert_eq!(delta.to_remove, vec![9]);
    }

    #[test]
    fn delta_by_name_ignores_case() {
        let desired = vec!["Operators".to_string(), "Auditors".to_string()];
        let observed = vec!["operators".to_string(), "Legacy".to_string()];
        let delta = compute_delta(&desired, &observed);
        assert_eq!(delta.to_add, vec!["Auditors".to_string()]);
        assert_eq!(delta.to_remove, vec!["Legacy".to_string()]);
    }

    #[test]
    fn equal_sets_produce_no_delta() {
        assert!(compute_delta(&[1, 2, 3], &[3, 2, 1]).is_empty());
        let empty: [i32; 0] = [];
        assert!(compute_delta(&empty, &empty).is_empty());
    }

    #[test]
    fn difference_deduplicates() {
        let left = vec!["A".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(difference(&left, &[]), vec!["A".to_string(), "b".to_string()]);
    }
}
