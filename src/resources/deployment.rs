//! Deployment of an issued certificate to certificate stores.

use crate::codec::{Codec, DeploymentCodec};
use crate::diagnostics::Diagnostics;
use crate::keyfactor::KeyfactorApi;
use crate::reconcile::{reconcile_certificate_stores, undeploy};
use crate::resources::{check_updatable, read_failure, Resource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreAssignment {
    pub certificate_store_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl StoreAssignment {
    pub fn new(certificate_store_id: &str, alias: Option<&str>) -> Self {
        Self {
            certificate_store_id: certificate_store_id.to_string(),
            alias: alias.map(String::from),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub certificate_id: i64,
    #[serde(default)]
    pub stores: Vec<StoreAssignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<i32>,
}

pub struct DeploymentResource;

impl DeploymentResource {
    /// Runs the store reconciler for `planned`. Returns false on a fatal error.
    async fn apply(
        api: &dyn KeyfactorApi,
        planned: &DeploymentState,
        diags: &mut Diagnostics,
    ) -> bool {
        let request = match DeploymentCodec::expand(planned) {
            Ok(request) => request,
            Err(e) => {
                diags.error("Invalid certificate deployment configuration", e);
                return false;
            }
        };
        match reconcile_certificate_stores(api, &request).await {
            Ok(outcome) => {
                for warning in &outcome.warnings {
                    diags.warning("Partial certificate deployment", warning);
                }
                true
            }
            Err(e) => {
                diags.api_error("Unable to deploy certificate", &e);
                false
            }
        }
    }
}

#[async_trait]
impl Resource for DeploymentResource {
    type State = DeploymentState;

    const TYPE_NAME: &'static str = "certificate_deployment";
    const UPDATABLE: &'static [&'static str] = &["stores", "key_password"];

    async fn create(
        &self,
        api: &dyn KeyfactorApi,
        planned: &DeploymentState,
        diags: &mut Diagnostics,
    ) -> Option<DeploymentState> {
        if !Self::apply(api, planned, diags).await {
            return None;
        }
        let mut state = planned.clone();
        state.id = Some(planned.certificate_id.to_string());
        info!(
            "Certificate {} deployed to {} stores",
            planned.certificate_id,
            planned.stores.len()
        );
        match self.read(api, &state, diags).await {
            Some(read) => Some(read),
            None => Some(state),
        }
    }

    async fn read(
        &self,
        api: &dyn KeyfactorApi,
        state: &DeploymentState,
        diags: &mut Diagnostics,
    ) -> Option<DeploymentState> {
        let locations = match api.get_certificate_locations(state.certificate_id).await {
            Ok(locations) => locations,
            Err(e) => {
                read_failure(Self::TYPE_NAME, &state.certificate_id.to_string(), e, diags);
                return None;
            }
        };
        match DeploymentCodec::flatten(&locations, state) {
            Ok(next) => Some(next),
            Err(e) => {
                diags.error("Unable to interpret certificate locations", e);
                None
            }
        }
    }

    async fn update(
        &self,
        api: &dyn KeyfactorApi,
        prior: &DeploymentState,
        planned: &DeploymentState,
        diags: &mut Diagnostics,
    ) -> Option<DeploymentState> {
        let planned = Self::carry_computed(prior, planned);
        if !check_updatable::<Self>(prior, &planned, diags) {
            return None;
        }
        if !Self::apply(api, &planned, diags).await {
            return None;
        }
        self.read(api, &planned, diags).await
    }

    async fn delete(&self, api: &dyn KeyfactorApi, state: &DeploymentState, diags: &mut Diagnostics) {
        let store_ids: Vec<String> = state
            .stores
            .iter()
            .map(|s| s.certificate_store_id.clone())
            .collect();
        match undeploy(api, state.certificate_id, &store_ids, state.collection_id).await {
            Ok(removed) => info!(
                "Certificate {} removed from {} store aliases",
                state.certificate_id,
                removed.len()
            ),
            Err(e) if e.is_not_found() => {
                info!("Certificate {} no longer exists", state.certificate_id)
            }
            Err(e) => diags.api_error("Unable to remove certificate from stores", &e),
        }
    }

    fn carry_computed(prior: &DeploymentState, planned: &DeploymentState) -> DeploymentState {
        DeploymentState {
            id: prior.id.clone(),
            ..planned.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyfactor::fake::{ApiCall, FakeKeyfactor};

    fn planned(stores: &[&str]) -> DeploymentState {
        DeploymentState {
            certificate_id: 77,
            stores: stores
                .iter()
                .map(|s| StoreAssignment::new(s, Some("web")))
                .collect(),
            key_password: Some("pfx-pass".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_deploys_and_reads_locations() {
        let fake = FakeKeyfactor::new();
        fake.insert_certificate(77, "CN=web.example.com", &[]);
        let mut diags = Diagnostics::new();
        let state = DeploymentResource
            .create(&fake, &planned(&["A", "B"]), &mut diags)
            .await
            .unwrap();
        assert!(diags.is_empty());
        assert_eq!(state.id.as_deref(), Some("77"));
        assert_eq!(state.stores, planned(&["A", "B"]).stores);

        let ApiCall::AddToStores(add) = &fake.mutations()[0] else {
            panic!("expected bulk add");
        };
        assert_eq!(add.certificate_stores[0].pfx_password.as_deref(), Some("pfx-pass"));
    }

    #[tokio::test]
    async fn rejected_store_is_a_warning_not_an_error() {
        let fake = FakeKeyfactor::new();
        fake.insert_certificate(77, "CN=web.example.com", &[]);
        fake.reject_store("B");
        let mut diags = Diagnostics::new();
        let state = DeploymentResource
            .create(&fake, &planned(&["A", "B"]), &mut diags)
            .await
            .unwrap();
        assert!(!diags.has_errors());
        assert_eq!(diags.warnings().count(), 1);
        assert_eq!(state.stores, planned(&["A"]).stores);
    }

    #[tokio::test]
    async fn update_moves_certificate_between_stores() {
        let fake = FakeKeyfactor::new();
        fake.insert_certificate(77, "CN=web.example.com", &[]);
        let mut diags = Diagnostics::new();
        let prior = DeploymentResource
            .create(&fake, &planned(&["A", "C"]), &mut diags)
            .await
            .unwrap();
        fake.clear_calls();

        let updated = DeploymentResource
            .update(&fake, &prior, &planned(&["A", "B"]), &mut diags)
            .await
            .unwrap();
        assert!(!diags.has_errors());
        assert_eq!(updated.stores, planned(&["A", "B"]).stores);
        let removed: Vec<String> = fake
            .mutations()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::RemoveFromStores(r) => Some(
                    r.certificate_stores
                        .into_iter()
                        .map(|t| t.certificate_store_id)
                        .collect::<Vec<_>>(),
                ),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(removed, vec!["C".to_string()]);
    }

    #[tokio::test]
    async fn changing_certificate_is_rejected() {
        let fake = FakeKeyfactor::new();
        let prior = DeploymentState {
            id: Some("77".into()),
            ..planned(&["A"])
        };
        let mut next = planned(&["A"]);
        next.certificate_id = 78;
        let mut diags = Diagnostics::new();
        assert!(DeploymentResource
            .update(&fake, &prior, &next, &mut diags)
            .await
            .is_none());
        assert!(diags.has_errors());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_configured_stores_only() {
        let fake = FakeKeyfactor::new();
        fake.insert_certificate(77, "CN=web.example.com", &[("A", "web"), ("Z", "other")]);
        let mut diags = Diagnostics::new();
        DeploymentResource
            .delete(&fake, &planned(&["A"]), &mut diags)
            .await;
        assert!(!diags.has_errors());
        let remaining: Vec<String> = fake.locations(77).into_iter().map(|l| l.store_id).collect();
        assert_eq!(remaining, vec!["Z".to_string()]);
    }

    #[tokio::test]
    async fn read_of_missing_certificate_is_none() {
        let fake = FakeKeyfactor::new();
        let mut diags = Diagnostics::new();
        assert!(DeploymentResource
            .read(&fake, &planned(&["A"]), &mut diags)
            .await
            .is_none());
        assert!(diags.is_empty());
    }
}
