//! Certificate store lifecycle.

use crate::codec::store::InventoryScheduleConfig;
use crate::codec::{Codec, StoreCodec};
use crate::diagnostics::Diagnostics;
use crate::keyfactor::KeyfactorApi;
use crate::resources::{check_updatable, delete_result, read_failure, Resource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<i32>,
    pub client_machine: String,
    pub store_path: String,
    pub store_type: i32,
    pub agent_id: String,
    #[serde(default)]
    pub create_if_missing: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_schedule: Option<InventoryScheduleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub set_new_password_allowed: bool,

    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub agent_assigned: bool,
}

pub struct StoreResource;

#[async_trait]
impl Resource for StoreResource {
    type State = StoreState;

    const TYPE_NAME: &'static str = "certificate_store";
    const UPDATABLE: &'static [&'static str] = &["properties", "inventory_schedule", "password"];

    async fn create(
        &self,
        api: &dyn KeyfactorApi,
        planned: &StoreState,
        diags: &mut Diagnostics,
    ) -> Option<StoreState> {
        let mut request = match StoreCodec::expand(planned) {
            Ok(request) => request,
            Err(e) => {
                diags.error("Invalid certificate store configuration", e);
                return None;
            }
        };
        request.id = None;
        let created = match api.create_store(&request).await {
            Ok(store) => store,
            Err(e) => {
                diags.api_error("Unable to create certificate store", &e);
                return None;
            }
        };
        info!(
            "Created certificate store {} ({}:{})",
            created.id, created.client_machine, created.store_path
        );
        let mut state = planned.clone();
        state.id = Some(created.id.clone());
        match self.read(api, &state, diags).await {
            Some(read) => Some(read),
            None => Some(state),
        }
    }

    async fn read(
        &self,
        api: &dyn KeyfactorApi,
        state: &StoreState,
        diags: &mut Diagnostics,
    ) -> Option<StoreState> {
        let Some(id) = state.id.as_deref().filter(|id| !id.trim().is_empty()) else {
            diags.error("Missing resource identifier", "certificate_store state has no id");
            return None;
        };
        let store = match api.get_store(id).await {
            Ok(store) => store,
            Err(e) => {
                read_failure(Self::TYPE_NAME, id, e, diags);
                return None;
            }
        };
        match StoreCodec::flatten(&store, state) {
            Ok(next) => Some(next),
            Err(e) => {
                diags.error("Unable to interpret certificate store", e);
                None
            }
        }
    }

    async fn update(
        &self,
        api: &dyn KeyfactorApi,
        prior: &StoreState,
        planned: &StoreState,
        diags: &mut Diagnostics,
    ) -> Option<StoreState> {
        let planned = Self::carry_computed(prior, planned);
        if !check_updatable::<Self>(prior, &planned, diags) {
            return None;
        }
        if prior == &planned {
            return Some(planned);
        }
        // The store PUT replaces the whole store, so every attribute is sent.
        let request = match StoreCodec::expand(&planned) {
            Ok(request) => request,
            Err(e) => {
                diags.error("Invalid certificate store configuration", e);
                return None;
            }
        };
        if let Err(e) = api.update_store(&request).await {
            diags.api_error("Unable to update certificate store", &e);
            return None;
        }
        info!("Updated certificate store {}", request.id.as_deref().unwrap_or_default());
        self.read(api, &planned, diags).await
    }

    async fn delete(&self, api: &dyn KeyfactorApi, state: &StoreState, diags: &mut Diagnostics) {
        let Some(id) = state.id.as_deref() else {
            diags.error("Missing resource identifier", "certificate_store state has no id");
            return;
        };
        let result = api.delete_store(id).await;
        if result.is_ok() {
            info!("Deleted certificate store {}", id);
        }
        delete_result(Self::TYPE_NAME, id, result, diags);
    }

    fn carry_computed(prior: &StoreState, planned: &StoreState) -> StoreState {
        StoreState {
            id: prior.id.clone(),
            approved: prior.approved,
            agent_assigned: prior.agent_assigned,
            ..planned.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyfactor::fake::{ApiCall, FakeKeyfactor};

    fn planned() -> StoreState {
        StoreState {
            client_machine: "iis01.example.com".into(),
            store_path: "My".into(),
            store_type: 106,
            agent_id: "b2d5e0a4-0000-4000-8000-000000000001".into(),
            properties: [("spnwithport".to_string(), "false".to_string())].into(),
            inventory_schedule: Some(InventoryScheduleConfig {
                interval_minutes: Some(60),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn created(fake: &FakeKeyfactor) -> StoreState {
        let mut diags = Diagnostics::new();
        let state = StoreResource
            .create(fake, &planned(), &mut diags)
            .await
            .unwrap();
        assert!(!diags.has_errors(), "{:?}", diags);
        fake.clear_calls();
        state
    }

    #[tokio::test]
    async fn create_posts_without_id_and_reads_back() {
        let fake = FakeKeyfactor::new();
        let state = created(&fake).await;
        let id = state.id.clone().unwrap();
        let stored = fake.store(&id).unwrap();
        assert!(stored.properties.contains("\"spnwithport\":{\"value\":\"false\"}"));
        assert_eq!(state.properties, planned().properties);
        assert_eq!(state.inventory_schedule, planned().inventory_schedule);
        assert!(state.approved);
        assert!(state.agent_assigned);
    }

    #[tokio::test]
    async fn conflicting_schedule_is_rejected_before_any_call() {
        let fake = FakeKeyfactor::new();
        let mut config = planned();
        config.inventory_schedule = Some(InventoryScheduleConfig {
            interval_minutes: Some(60),
            daily_time: Some("2024-01-01T02:00:00Z".into()),
            ..Default::default()
        });
        let mut diags = Diagnostics::new();
        assert!(StoreResource.create(&fake, &config, &mut diags).await.is_none());
        assert!(diags.has_errors());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn update_sends_the_whole_store() {
        let fake = FakeKeyfactor::new();
        let prior = created(&fake).await;
        let mut next = planned();
        next.properties.insert("ServerUseSsl".into(), "true".into());

        let mut diags = Diagnostics::new();
        let updated = StoreResource
            .update(&fake, &prior, &next, &mut diags)
            .await
            .unwrap();
        assert!(!diags.has_errors());
        assert_eq!(updated.properties.len(), 2);
        let mutations = fake.mutations();
        assert_eq!(mutations.len(), 1);
        let ApiCall::UpdateStore(request) = &mutations[0] else {
            panic!("expected store update");
        };
        assert_eq!(request.id, prior.id);
        assert_eq!(request.client_machine, "iis01.example.com");
        assert_eq!(request.agent_id, prior.agent_id);
    }

    #[tokio::test]
    async fn moving_the_store_is_rejected() {
        let fake = FakeKeyfactor::new();
        let prior = created(&fake).await;
        let mut next = planned();
        next.store_path = "WebHosting".into();
        let mut diags = Diagnostics::new();
        assert!(StoreResource
            .update(&fake, &prior, &next, &mut diags)
            .await
            .is_none());
        assert!(diags.errors().any(|d| d.detail.contains("store_path")));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_of_missing_store_is_not_an_error() {
        let fake = FakeKeyfactor::new();
        let state = created(&fake).await;
        let mut diags = Diagnostics::new();
        StoreResource.delete(&fake, &state, &mut diags).await;
        StoreResource.delete(&fake, &state, &mut diags).await;
        assert!(!diags.has_errors());
        assert!(StoreResource.read(&fake, &state, &mut diags).await.is_none());
        assert!(!diags.has_errors());
    }
}
