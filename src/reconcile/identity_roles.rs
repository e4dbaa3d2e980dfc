//! Identity -> role membership. Roles own the relationship through their
//! `Identities` list.

use crate::keyfactor::models::RoleIdentity;
use crate::keyfactor::{KeyfactorApi, KeyfactorError};
use crate::reconcile::{compute_delta, ReconcileReport};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Makes the identity a member of exactly the `desired` roles.
pub async fn reconcile_identity_roles(
    api: &dyn KeyfactorApi,
    identity_id: i32,
    desired: &BTreeSet<i32>,
) -> Result<ReconcileReport<i32>, KeyfactorError> {
    let identity = api.get_identity(identity_id).await?;
    let account_name = identity.account_name.clone();
    let desired: Vec<i32> = desired.iter().copied().collect();
    let observed: Vec<i32> = identity.roles.iter().map(|r| r.id).collect();
    let mut report = ReconcileReport::default();

    let delta = compute_delta(&desired, &observed);
    for role_id in delta.to_add {
        if attach_identity(api, role_id, &account_name).await? {
            report.added.push(role_id);
        }
    }

    // Membership may have shifted while adding; removals use a fresh read.
    let to_remove = if report.added.is_empty() {
        delta.to_remove
    } else {
        let current: Vec<i32> = api
            .get_identity(identity_id)
            .await?
            .roles
            .iter()
            .map(|r| r.id)
            .collect();
        compute_delta(&desired, &current).to_remove
    };

    for role_id in to_remove {
        if detach_identity(api, role_id, &account_name).await? {
            report.removed.push(role_id);
        }
    }

    info!(
        "Identity {} roles reconciled: added {:?}, removed {:?}",
        account_name, report.added, report.removed
    );
    Ok(report)
}

/// Adds the identity to the role. Returns false when it was already there.
async fn attach_identity(
    api: &dyn KeyfactorApi,
    role_id: i32,
    account_name: &str,
) -> Result<bool, KeyfactorError> {
    let mut role = api.get_role(role_id).await?;
    if role
        .identities
        .iter()
        .any(|i| i.account_name.eq_ignore_ascii_case(account_name))
    {
        debug!("{} is already a member of role {}", account_name, role.name);
        return Ok(false);
    }
    role.identities.push(RoleIdentity::named(account_name));
    debug!("Writing role {} with {} identities", role.name, role.identities.len());
    api.update_role(&role).await?;
    Ok(true)
}

/// Removes the identity from the role. Returns false when it was not there.
async fn detach_identity(
    api: &dyn KeyfactorApi,
    role_id: i32,
    account_name: &str,
) -> Result<bool, KeyfactorError> {
    let mut role = api.get_role(role_id).await?;
    let before = role.identities.len();
    role.identities
        .retain(|i| !i.account_name.eq_ignore_ascii_case(account_name));
    if role.identities.len() == before {
        debug!("{} is not a member of role {}", account_name, role.name);
        return Ok(false);
    }
    debug!("Writing role {} with {} identities", role.name, role.identities.len());
    api.update_role(&role).await?;
    Ok(true)
}
