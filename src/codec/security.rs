//! Security identities and roles.

use crate::codec::{required, Codec, CodecError};
use crate::keyfactor::models::{
    CreateIdentityRequest, CreateRoleRequest, RoleIdentity, SecurityIdentity, SecurityRole,
};
use crate::resources::identity::IdentityState;
use crate::resources::role::RoleState;

pub struct IdentityCodec;

impl Codec for IdentityCodec {
    type Config = IdentityState;
    type Request = CreateIdentityRequest;
    type Response = SecurityIdentity;

    fn expand(config: &IdentityState) -> Result<CreateIdentityRequest, CodecError> {
        Ok(CreateIdentityRequest {
            account_name: required(&config.account_name, "account_name")?.to_string(),
        })
    }

    fn flatten(
        response: &SecurityIdentity,
        previous: &IdentityState,
    ) -> Result<IdentityState, CodecError> {
        Ok(IdentityState {
            id: Some(response.id.to_string()),
            account_name: response.account_name.clone(),
            roles: response.roles.iter().map(|r| r.id).collect(),
            identity_type: response.identity_type.clone(),
            valid: response.valid,
            ..previous.clone()
        })
    }
}

pub struct RoleCodec;

impl RoleCodec {
    /// Writes the configured attributes onto a freshly read role, leaving
    /// everything the configuration does not manage untouched.
    pub fn merge_into(config: &RoleState, role: &mut SecurityRole) {
        role.description = config.description.clone();
        role.permissions = config.permissions.iter().cloned().collect();
        if let Some(identities) = &config.identities {
            role.identities = identities
                .iter()
                .map(|name| {
                    role.identities
                        .iter()
                        .find(|existing| existing.account_name.eq_ignore_ascii_case(name))
                        .cloned()
                        .unwrap_or_else(|| RoleIdentity::named(name))
                })
                .collect();
        }
    }
}

impl Codec for RoleCodec {
    type Config = RoleState;
    type Request = CreateRoleRequest;
    type Response = SecurityRole;

    fn expand(config: &RoleState) -> Result<CreateRoleRequest, CodecError> {
        Ok(CreateRoleRequest {
            name: required(&config.role_name, "role_name")?.to_string(),
            description: config.description.clone(),
            permissions: config.permissions.iter().cloned().collect(),
            identities: config
                .identities
                .iter()
                .flatten()
                .map(|name| RoleIdentity::named(name))
                .collect(),
        })
    }

    fn flatten(response: &SecurityRole, previous: &RoleState) -> Result<RoleState, CodecError> {
        Ok(RoleState {
            id: Some(response.id.to_string()),
            role_name: response.name.clone(),
            description: response.description.clone(),
            permissions: response.permissions.iter().cloned().collect(),
            // Account names match case-insensitively; keep the configured spelling.
            identities: previous.identities.as_ref().map(|configured| {
                response
                    .identities
                    .iter()
                    .map(|i| {
                        configured
                            .iter()
                            .find(|name| name.eq_ignore_ascii_case(&i.account_name))
                            .unwrap_or(&i.account_name)
                            .clone()
                    })
                    .collect()
            }),
            ..previous.clone()
        })
    }
}
