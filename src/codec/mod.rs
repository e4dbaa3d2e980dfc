//! Schema codec: conversion between typed resource state and Keyfactor DTOs.
//!
//! `expand` turns configuration into an API request, `flatten` turns an API
//! response back into configuration shape, using the previous state to
//! recover what the API does not echo back (ordering, secrets, the set of
//! names the user chose to manage).

pub mod certificate;
pub mod material;
pub mod metadata;
pub mod san;
pub mod security;
pub mod store;
pub mod subject;

pub use certificate::{CertificateCodec, EnrollmentRequest};
pub use security::{IdentityCodec, RoleCodec};
pub use store::{DeploymentCodec, StoreCodec};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("malformed distinguished name segment `{segment}` in `{dn}`")]
    MalformedDn { dn: String, segment: String },

    #[error("inventory schedule sets more than one of: {0}")]
    ConflictingSchedule(String),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("store properties are not a JSON object: {0}")]
    MalformedProperties(String),
}

/// Two-way mapping between one resource's state and its API shapes.
pub trait Codec {
    type Config;
    type Request;
    type Response;

    fn expand(config: &Self::Config) -> Result<Self::Request, CodecError>;

    fn flatten(
        response: &Self::Response,
        previous: &Self::Config,
    ) -> Result<Self::Config, CodecError>;
}

/// Returns the trimmed value, or `None` for absent and blank strings.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub(crate) fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, CodecError> {
    let value = value.trim();
    if value.is_empty() {
        Err(CodecError::MissingField(field))
    } else {
        Ok(value)
    }
}
