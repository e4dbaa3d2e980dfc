//! Role -> certificate template binding. Templates own the relationship as
//! the role names in `AllowedRequesters`.

use crate::keyfactor::{KeyfactorApi, KeyfactorError};
use crate::reconcile::{compute_delta, contains_name, ReconcileReport};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// IDs of the templates whose allowed requesters include `role_name`.
pub async fn observed_templates(
    api: &dyn KeyfactorApi,
    role_name: &str,
) -> Result<Vec<i32>, KeyfactorError> {
    Ok(api
        .list_templates()
        .await?
        .into_iter()
        .filter(|t| contains_name(&t.allowed_requesters, role_name))
        .map(|t| t.id)
        .collect())
}

/// Makes `role_name` an allowed requester on exactly the `desired` templates.
pub async fn reconcile_role_templates(
    api: &dyn KeyfactorApi,
    role_name: &str,
    desired: &BTreeSet<i32>,
) -> Result<ReconcileReport<i32>, KeyfactorError> {
    let desired: Vec<i32> = desired.iter().copied().collect();
    let observed = observed_templates(api, role_name).await?;
    let mut report = ReconcileReport::default();

    let delta = compute_delta(&desired, &observed);
    for template_id in delta.to_add {
        if attach_role(api, template_id, role_name).await? {
            report.added.push(template_id);
        }
    }

    let to_remove = if report.added.is_empty() {
        delta.to_remove
    } else {
        let current = observed_templates(api, role_name).await?;
        compute_delta(&desired, &current).to_remove
    };

    for template_id in to_remove {
        if detach_role(api, template_id, role_name).await? {
            report.removed.push(template_id);
        }
    }

    info!(
        "Role {} templates reconciled: added {:?}, removed {:?}",
        role_name, report.added, report.removed
    );
    Ok(report)
}

async fn attach_role(
    api: &dyn KeyfactorApi,
    template_id: i32,
    role_name: &str,
) -> Result<bool, KeyfactorError> {
    let mut template = api.get_template(template_id).await?;
    if contains_name(&template.allowed_requesters, role_name) {
        debug!("{} already allowed on template {}", role_name, template_id);
        return Ok(false);
    }
    template.allowed_requesters.push(role_name.to_string());
    debug!("Writing template {} requesters {:?}", template_id, template.allowed_requesters);
    api.update_template(&template).await?;
    Ok(true)
}

async fn detach_role(
    api: &dyn KeyfactorApi,
    template_id: i32,
    role_name: &str,
) -> Result<bool, KeyfactorError> {
    let mut template = api.get_template(template_id).await?;
    let before = template.allowed_requesters.len();
    template
        .allowed_requesters
        .retain(|r| !r.eq_ignore_ascii_case(role_name));
    if template.allowed_requesters.len() == before {
        debug!("{} not allowed on template {}", role_name, template_id);
        return Ok(false);
    }
    debug!("Writing template {} requesters {:?}", template_id, template.allowed_requesters);
    api.update_template(&template).await?;
    Ok(true)
}
