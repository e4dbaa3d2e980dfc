//! Security identities and their role memberships.

use crate::codec::{Codec, IdentityCodec};
use crate::diagnostics::Diagnostics;
use crate::keyfactor::KeyfactorApi;
use crate::reconcile::reconcile_identity_roles;
use crate::resources::{check_updatable, delete_result, parse_id, read_failure, Resource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub account_name: String,
    #[serde(default)]
    pub roles: BTreeSet<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
}

pub struct IdentityResource;

#[async_trait]
impl Resource for IdentityResource {
    type State = IdentityState;

    const TYPE_NAME: &'static str = "security_identity";
    const UPDATABLE: &'static [&'static str] = &["roles"];

    async fn create(
        &self,
        api: &dyn KeyfactorApi,
        planned: &IdentityState,
        diags: &mut Diagnostics,
    ) -> Option<IdentityState> {
        let request = match IdentityCodec::expand(planned) {
            Ok(request) => request,
            Err(e) => {
                diags.error("Invalid security identity configuration", e);
                return None;
            }
        };
        let identity = match api.create_identity(&request).await {
            Ok(identity) => identity,
            Err(e) => {
                diags.api_error("Unable to create security identity", &e);
                return None;
            }
        };
        info!("Created identity {} ({})", identity.account_name, identity.id);

        let mut state = planned.clone();
        state.id = Some(identity.id.to_string());
        if !planned.roles.is_empty() {
            if let Err(e) = reconcile_identity_roles(api, identity.id, &planned.roles).await {
                // The identity exists; hand back its id so it stays tracked.
                diags.api_error("Unable to assign roles to security identity", &e);
                return Some(state);
            }
        }
        match self.read(api, &state, diags).await {
            Some(read) => Some(read),
            None => Some(state),
        }
    }

    async fn read(
        &self,
        api: &dyn KeyfactorApi,
        state: &IdentityState,
        diags: &mut Diagnostics,
    ) -> Option<IdentityState> {
        let id: i32 = parse_id(Self::TYPE_NAME, state.id.as_deref(), diags)?;
        let identity = match api.get_identity(id).await {
            Ok(identity) => identity,
            Err(e) => {
                read_failure(Self::TYPE_NAME, &id.to_string(), e, diags);
                return None;
            }
        };
        match IdentityCodec::flatten(&identity, state) {
            Ok(next) => Some(next),
            Err(e) => {
                diags.error("Unable to interpret security identity", e);
                None
            }
        }
    }

    async fn update(
        &self,
        api: &dyn KeyfactorApi,
        prior: &IdentityState,
        planned: &IdentityState,
        diags: &mut Diagnostics,
    ) -> Option<IdentityState> {
        let planned = Self::carry_computed(prior, planned);
        if !check_updatable::<Self>(prior, &planned, diags) {
            return None;
        }
        let id: i32 = parse_id(Self::TYPE_NAME, prior.id.as_deref(), diags)?;
        if let Err(e) = reconcile_identity_roles(api, id, &planned.roles).await {
            diags.api_error("Unable to update security identity roles", &e);
            return None;
        }
        self.read(api, &planned, diags).await
    }

    async fn delete(&self, api: &dyn KeyfactorApi, state: &IdentityState, diags: &mut Diagnostics) {
        let Some(id) = parse_id::<i32>(Self::TYPE_NAME, state.id.as_deref(), diags) else {
            return;
        };
        let result = api.delete_identity(id).await;
        if result.is_ok() {
            info!("Deleted identity {}", state.account_name);
        }
        delete_result(Self::TYPE_NAME, &id.to_string(), result, diags);
    }

    fn carry_computed(prior: &IdentityState, planned: &IdentityState) -> IdentityState {
        IdentityState {
            id: prior.id.clone(),
            identity_type: prior.identity_type.clone(),
            valid: prior.valid,
            ..planned.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyfactor::fake::{ApiCall, FakeKeyfactor};

    fn seeded() -> FakeKeyfactor {
        let fake = FakeKeyfactor::new();
        fake.insert_role(5, "Operators", &[]);
        fake.insert_role(7, "Auditors", &[]);
        fake.insert_role(9, "Legacy", &[]);
        fake
    }

    fn planned(roles: &[i32]) -> IdentityState {
        IdentityState {
            account_name: "CORP\\jdoe".into(),
            roles: roles.iter().copied().collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_roles() {
        let fake = seeded();
        let mut diags = Diagnostics::new();
        let state = IdentityResource
            .create(&fake, &planned(&[5, 7]), &mut diags)
            .await
            .unwrap();
        assert!(diags.is_empty());
        assert_eq!(state.roles, BTreeSet::from([5, 7]));
        assert_eq!(state.identity_type.as_deref(), Some("User"));
        assert_eq!(fake.role(5).unwrap().identities[0].account_name, "CORP\\jdoe");
    }

    #[tokio::test]
    async fn update_touches_only_changed_roles() {
        let fake = seeded();
        let mut diags = Diagnostics::new();
        let prior = IdentityResource
            .create(&fake, &planned(&[5, 9]), &mut diags)
            .await
            .unwrap();
        fake.clear_calls();

        let updated = IdentityResource
            .update(&fake, &prior, &planned(&[5, 7]), &mut diags)
            .await
            .unwrap();
        assert!(!diags.has_errors());
        assert_eq!(updated.roles, BTreeSet::from([5, 7]));
        let written: Vec<i32> = fake
            .mutations()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::UpdateRole(role) => Some(role.id),
                _ => None,
            })
            .collect();
        assert_eq!(written, vec![7, 9]);
    }

    #[tokio::test]
    async fn role_failure_during_create_keeps_identity_tracked() {
        let fake = seeded();
        fake.fail_calls_named("update_role");
        let mut diags = Diagnostics::new();
        let state = IdentityResource
            .create(&fake, &planned(&[5]), &mut diags)
            .await
            .unwrap();
        assert!(diags.has_errors());
        assert!(state.id.is_some());
    }

    #[tokio::test]
    async fn renaming_is_rejected() {
        let fake = seeded();
        let mut diags = Diagnostics::new();
        let prior = IdentityResource
            .create(&fake, &planned(&[]), &mut diags)
            .await
            .unwrap();
        fake.clear_calls();
        let mut next = planned(&[]);
        next.account_name = "CORP\\jsmith".into();
        assert!(IdentityResource
            .update(&fake, &prior, &next, &mut diags)
            .await
            .is_none());
        assert!(diags.has_errors());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn deleted_identity_reads_as_gone() {
        let fake = seeded();
        let mut diags = Diagnostics::new();
        let state = IdentityResource
            .create(&fake, &planned(&[5]), &mut diags)
            .await
            .unwrap();
        IdentityResource.delete(&fake, &state, &mut diags).await;
        assert!(IdentityResource.read(&fake, &state, &mut diags).await.is_none());
        assert!(!diags.has_errors());
        assert!(fake.role(5).unwrap().identities.is_empty());
    }
}
