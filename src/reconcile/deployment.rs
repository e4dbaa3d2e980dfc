//! Certificate -> store deployment.
//!
//! Unlike roles and templates, Keyfactor exposes bulk add and bulk remove
//! for this relationship, so no owning object is rewritten: every desired
//! store is (re)added, then whatever else holds the certificate is removed.

use crate::keyfactor::models::{
    AddToStoresRequest, CertificateLocation, JobSchedule, RemoveFromStoresRequest, StoreTarget,
};
use crate::keyfactor::{KeyfactorApi, KeyfactorError};
use tracing::{info, warn};

pub const PARTIAL_DEPLOYMENT_WARNING: &str = "deployment to one or more stores failed";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentOutcome {
    /// Jobs Keyfactor scheduled for the add request.
    pub scheduled: usize,
    /// (store, alias) pairs the certificate was removed from.
    pub removed: Vec<StoreTarget>,
    pub warnings: Vec<String>,
}

fn removal_target(location: &CertificateLocation) -> StoreTarget {
    StoreTarget {
        certificate_store_id: location.store_id.clone(),
        alias: location.alias.clone(),
        overwrite: false,
        pfx_password: None,
    }
}

fn is_desired(request: &AddToStoresRequest, store_id: &str) -> bool {
    request
        .certificate_stores
        .iter()
        .any(|t| t.certificate_store_id.eq_ignore_ascii_case(store_id))
}

/// Deploys the certificate to exactly the stores in `request`.
pub async fn reconcile_certificate_stores(
    api: &dyn KeyfactorApi,
    request: &AddToStoresRequest,
) -> Result<DeploymentOutcome, KeyfactorError> {
    let mut outcome = DeploymentOutcome::default();
    let requested = request.certificate_stores.len();

    if requested > 0 {
        let jobs = api.add_certificate_to_stores(request).await?;
        outcome.scheduled = jobs.len();
        if jobs.len() < requested {
            warn!(
                "Certificate {}: {} of {} store deployments were scheduled",
                request.certificate_id,
                jobs.len(),
                requested
            );
            outcome.warnings.push(format!(
                "{}: {} of {} stores accepted the certificate",
                PARTIAL_DEPLOYMENT_WARNING,
                jobs.len(),
                requested
            ));
        }
    }

    let observed = api
        .get_certificate_locations(request.certificate_id)
        .await?;
    let stale: Vec<StoreTarget> = observed
        .iter()
        .filter(|location| !is_desired(request, &location.store_id))
        .map(removal_target)
        .collect();

    if !stale.is_empty() {
        let removal = RemoveFromStoresRequest {
            certificate_stores: stale.clone(),
            schedule: JobSchedule::default(),
            collection_id: request.collection_id,
        };
        api.remove_certificate_from_stores(&removal).await?;
        outcome.removed = stale;
    }

    info!(
        "Certificate {} deployed to {} stores, removed from {}",
        request.certificate_id,
        requested,
        outcome.removed.len()
    );
    Ok(outcome)
}

/// Removes the certificate from every alias it holds in the given stores.
pub async fn undeploy(
    api: &dyn KeyfactorApi,
    certificate_id: i64,
    store_ids: &[String],
    collection_id: Option<i32>,
) -> Result<Vec<StoreTarget>, KeyfactorError> {
    let observed = api.get_certificate_locations(certificate_id).await?;
    let targets: Vec<StoreTarget> = observed
        .iter()
        .filter(|l| store_ids.iter().any(|s| s.eq_ignore_ascii_case(&l.store_id)))
        .map(removal_target)
        .collect();
    if targets.is_empty() {
        return Ok(targets);
    }
    let removal = RemoveFromStoresRequest {
        certificate_stores: targets.clone(),
        schedule: JobSchedule::default(),
        collection_id,
    };
    api.remove_certificate_from_stores(&removal).await?;
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyfactor::fake::{ApiCall, FakeKeyfactor};

    fn add_request(stores: &[&str]) -> AddToStoresRequest {
        AddToStoresRequest {
            certificate_id: 77,
            certificate_stores: stores
                .iter()
                .map(|s| StoreTarget {
                    certificate_store_id: s.to_string(),
                    alias: Some("web".to_string()),
                    overwrite: true,
                    pfx_password: None,
                })
                .collect(),
            schedule: JobSchedule::default(),
            collection_id: None,
        }
    }

    #[tokio::test]
    async fn adds_all_desired_and_removes_only_stale_aliases() {
        let fake = FakeKeyfactor::new();
        fake.insert_certificate(77, "CN=web.example.com", &[("A", "alias1"), ("C", "alias2")]);

        let outcome = reconcile_certificate_stores(&fake, &add_request(&["A", "B"]))
            .await
            .unwrap();

        let mutations = fake.mutations();
        assert_eq!(mutations.len(), 2);
        match &mutations[0] {
            ApiCall::AddToStores(add) => {
                let ids: Vec<&str> = add
                    .certificate_stores
                    .iter()
                    .map(|t| t.certificate_store_id.as_str())
                    .collect();
                assert_eq!(ids, vec!["A", "B"]);
            }
            other => panic!("expected bulk add, got {:?}", other),
        }
        match &mutations[1] {
            ApiCall::RemoveFromStores(remove) => {
                assert_eq!(remove.certificate_stores.len(), 1);
                assert_eq!(remove.certificate_stores[0].certificate_store_id, "C");
                assert_eq!(remove.certificate_stores[0].alias.as_deref(), Some("alias2"));
            }
            other => panic!("expected bulk remove, got {:?}", other),
        }
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.scheduled, 2);

        let remaining: Vec<String> = fake
            .locations(77)
            .into_iter()
            .map(|l| l.store_id)
            .collect();
        assert!(!remaining.contains(&"C".to_string()));
    }

    #[tokio::test]
    async fn no_stale_locations_means_no_remove() {
        let fake = FakeKeyfactor::new();
        fake.insert_certificate(77, "CN=web.example.com", &[("A", "web")]);
        reconcile_certificate_stores(&fake, &add_request(&["A"]))
            .await
            .unwrap();
        assert!(!fake
            .mutations()
            .iter()
            .any(|c| matches!(c, ApiCall::RemoveFromStores(_))));
    }

    #[tokio::test]
    async fn unscheduled_store_produces_warning() {
        let fake = FakeKeyfactor::new();
        fake.insert_certificate(77, "CN=web.example.com", &[]);
        fake.reject_store("B");
        let outcome = reconcile_certificate_stores(&fake, &add_request(&["A", "B"]))
            .await
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].starts_with(PARTIAL_DEPLOYMENT_WARNING));
    }

    #[tokio::test]
    async fn empty_desired_set_removes_everything_without_adding() {
        let fake = FakeKeyfactor::new();
        fake.insert_certificate(77, "CN=web.example.com", &[("A", "one"), ("A", "two")]);
        let outcome = reconcile_certificate_stores(&fake, &add_request(&[]))
            .await
            .unwrap();
        assert_eq!(outcome.removed.len(), 2);
        assert_eq!(fake.mutations().len(), 1);
        assert!(fake.locations(77).is_empty());
    }

    #[tokio::test]
    async fn undeploy_targets_configured_stores_only() {
        let fake = FakeKeyfactor::new();
        fake.insert_certificate(77, "CN=web.example.com", &[("A", "one"), ("B", "two")]);
        let removed = undeploy(&fake, 77, &["a".to_string()], Some(3))
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(fake.locations(77).len(), 1);
        match fake.mutations().last() {
            Some(ApiCall::RemoveFromStores(remove)) => assert_eq!(remove.collection_id, Some(3)),
            other => panic!("expected bulk remove, got {:?}", other),
        }
    }
}
