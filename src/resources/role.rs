//! Security roles, their permissions and member identities, and the
//! certificate templates they may enroll from.

use crate::codec::{Codec, RoleCodec};
use crate::diagnostics::Diagnostics;
use crate::keyfactor::{KeyfactorApi, KeyfactorError};
use crate::reconcile::{observed_templates, reconcile_role_templates};
use crate::resources::{check_updatable, delete_result, parse_id, read_failure, Resource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Member account names. `None` leaves membership to identity resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identities: Option<BTreeSet<String>>,
    #[serde(default)]
    pub template_ids: BTreeSet<i32>,
}

pub struct RoleResource;

impl RoleResource {
    async fn write_role(
        api: &dyn KeyfactorApi,
        id: i32,
        planned: &RoleState,
    ) -> Result<(), KeyfactorError> {
        let mut role = api.get_role(id).await?;
        RoleCodec::merge_into(planned, &mut role);
        api.update_role(&role).await?;
        Ok(())
    }
}

#[async_trait]
impl Resource for RoleResource {
    type State = RoleState;

    const TYPE_NAME: &'static str = "security_role";
    const UPDATABLE: &'static [&'static str] =
        &["description", "permissions", "identities", "template_ids"];

    async fn create(
        &self,
        api: &dyn KeyfactorApi,
        planned: &RoleState,
        diags: &mut Diagnostics,
    ) -> Option<RoleState> {
        let request = match RoleCodec::expand(planned) {
            Ok(request) => request,
            Err(e) => {
                diags.error("Invalid security role configuration", e);
                return None;
            }
        };
        let role = match api.create_role(&request).await {
            Ok(role) => role,
            Err(e) => {
                diags.api_error("Unable to create security role", &e);
                return None;
            }
        };
        info!("Created role {} ({})", role.name, role.id);

        let mut state = planned.clone();
        state.id = Some(role.id.to_string());
        if !planned.template_ids.is_empty() {
            if let Err(e) = reconcile_role_templates(api, &role.name, &planned.template_ids).await {
                diags.api_error("Unable to allow security role on templates", &e);
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
        state: &RoleState,
        diags: &mut Diagnostics,
    ) -> Option<RoleState> {
        let id: i32 = parse_id(Self::TYPE_NAME, state.id.as_deref(), diags)?;
        let role = match api.get_role(id).await {
            Ok(role) => role,
            Err(e) => {
                read_failure(Self::TYPE_NAME, &id.to_string(), e, diags);
                return None;
            }
        };
        let mut next = match RoleCodec::flatten(&role, state) {
            Ok(next) => next,
            Err(e) => {
                diags.error("Unable to interpret security role", e);
                return None;
            }
        };
        match observed_templates(api, &role.name).await {
            Ok(templates) => next.template_ids = templates.into_iter().collect(),
            Err(e) => {
                diags.api_error("Unable to list certificate templates", &e);
                return None;
            }
        }
        Some(next)
    }

    async fn update(
        &self,
        api: &dyn KeyfactorApi,
        prior: &RoleState,
        planned: &RoleState,
        diags: &mut Diagnostics,
    ) -> Option<RoleState> {
        let planned = Self::carry_computed(prior, planned);
        if !check_updatable::<Self>(prior, &planned, diags) {
            return None;
        }
        let id: i32 = parse_id(Self::TYPE_NAME, prior.id.as_deref(), diags)?;

        let role_changed = prior.description != planned.description
            || prior.permissions != planned.permissions
            || prior.identities != planned.identities;
        if role_changed {
            if let Err(e) = Self::write_role(api, id, &planned).await {
                diags.api_error("Unable to update security role", &e);
                return None;
            }
        }
        if prior.template_ids != planned.template_ids {
            if let Err(e) =
                reconcile_role_templates(api, &planned.role_name, &planned.template_ids).await
            {
                diags.api_error("Unable to update security role templates", &e);
                return None;
            }
        }
        self.read(api, &planned, diags).await
    }

    async fn delete(&self, api: &dyn KeyfactorApi, state: &RoleState, diags: &mut Diagnostics) {
        let Some(id) = parse_id::<i32>(Self::TYPE_NAME, state.id.as_deref(), diags) else {
            return;
        };
        let result = api.delete_role(id).await;
        if result.is_ok() {
            info!("Deleted role {}", state.role_name);
        }
        delete_result(Self::TYPE_NAME, &id.to_string(), result, diags);
    }

    fn carry_computed(prior: &RoleState, planned: &RoleState) -> RoleState {
        RoleState {
            id: prior.id.clone(),
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
        fake.insert_template(10, "WebServer", &["Administrators"]);
        fake.insert_template(11, "User", &[]);
        fake
    }

    fn planned() -> RoleState {
        RoleState {
            role_name: "Operators".into(),
            description: "Certificate operators".into(),
            permissions: BTreeSet::from(["Certificates:Read".to_string()]),
            template_ids: BTreeSet::from([10]),
            ..Default::default()
        }
    }

    async fn created(fake: &FakeKeyfactor) -> RoleState {
        let mut diags = Diagnostics::new();
        let state = RoleResource
            .create(fake, &planned(), &mut diags)
            .await
            .unwrap();
        assert!(!diags.has_errors(), "{:?}", diags);
        fake.clear_calls();
        state
    }

    #[tokio::test]
    async fn create_binds_templates() {
        let fake = seeded();
        let state = created(&fake).await;
        assert_eq!(state.template_ids, BTreeSet::from([10]));
        assert_eq!(state.identities, None);
        assert_eq!(
            fake.template(10).unwrap().allowed_requesters,
            vec!["Administrators", "Operators"]
        );
    }

    #[tokio::test]
    async fn template_only_change_skips_role_write() {
        let fake = seeded();
        let prior = created(&fake).await;
        let mut next = planned();
        next.template_ids = BTreeSet::from([11]);

        let mut diags = Diagnostics::new();
        let updated = RoleResource
            .update(&fake, &prior, &next, &mut diags)
            .await
            .unwrap();
        assert!(!diags.has_errors());
        assert_eq!(updated.template_ids, BTreeSet::from([11]));
        assert!(!fake
            .mutations()
            .iter()
            .any(|c| matches!(c, ApiCall::UpdateRole(_))));
        assert_eq!(
            fake.template(10).unwrap().allowed_requesters,
            vec!["Administrators"]
        );
    }

    #[tokio::test]
    async fn permission_change_rewrites_the_role() {
        let fake = seeded();
        let prior = created(&fake).await;
        let mut next = planned();
        next.permissions.insert("Certificates:Revoke".into());
        next.identities = Some(BTreeSet::from(["CORP\\jdoe".to_string()]));

        let mut diags = Diagnostics::new();
        let updated = RoleResource
            .update(&fake, &prior, &next, &mut diags)
            .await
            .unwrap();
        assert!(!diags.has_errors());
        assert_eq!(updated.permissions.len(), 2);
        assert_eq!(updated.identities, next.identities);
        let writes: Vec<&'static str> = fake.mutations().iter().map(ApiCall::name).collect();
        assert_eq!(writes, vec!["update_role"]);
    }

    #[tokio::test]
    async fn renaming_is_rejected() {
        let fake = seeded();
        let prior = created(&fake).await;
        let mut next = planned();
        next.role_name = "Ops".into();
        let mut diags = Diagnostics::new();
        assert!(RoleResource
            .update(&fake, &prior, &next, &mut diags)
            .await
            .is_none());
        assert!(diags.errors().any(|d| d.detail.contains("role_name")));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_leaves_no_role_behind() {
        let fake = seeded();
        let state = created(&fake).await;
        let mut diags = Diagnostics::new();
        RoleResource.delete(&fake, &state, &mut diags).await;
        assert!(!diags.has_errors());
        assert!(RoleResource.read(&fake, &state, &mut diags).await.is_none());
        assert!(!diags.has_errors());
    }
}
