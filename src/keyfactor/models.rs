//! Wire types for the Keyfactor Command REST API.
//!
//! Field names follow the API's PascalCase JSON. Optional request fields are
//! skipped when absent so the server applies its own defaults; a field the
//! API distinguishes as "absent" is never sent as an empty value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Subject alternative name as reported by the certificate context endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubjectAltNameElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub value: String,
    #[serde(rename = "Type")]
    pub type_code: i32,
}

/// SANs block of an enrollment request. Empty buckets are never serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentSans {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip4: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uri: Vec<String>,
}

impl EnrollmentSans {
    pub fn is_empty(&self) -> bool {
        self.dns.is_empty() && self.ip4.is_empty() && self.uri.is_empty()
    }
}

/// Key-generating (PFX) enrollment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PfxEnrollmentRequest {
    pub subject: String,
    pub include_chain: bool,
    pub certificate_authority: String,
    pub template: String,
    pub timestamp: DateTime<Utc>,
    pub password: String,
    #[serde(rename = "SANs", skip_serializing_if = "Option::is_none")]
    pub sans: Option<EnrollmentSans>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Enrollment from a caller-supplied certificate signing request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CsrEnrollmentRequest {
    #[serde(rename = "CSR")]
    pub csr: String,
    pub include_chain: bool,
    pub certificate_authority: String,
    pub template: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "SANs", skip_serializing_if = "Option::is_none")]
    pub sans: Option<EnrollmentSans>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateInformation {
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(rename = "IssuerDN", default)]
    pub issuer_dn: Option<String>,
    #[serde(default)]
    pub thumbprint: Option<String>,
    #[serde(rename = "KeyfactorID")]
    pub keyfactor_id: i64,
    #[serde(default)]
    pub keyfactor_request_id: Option<i64>,
    #[serde(rename = "PKCS12Blob", default)]
    pub pkcs12_blob: Option<String>,
    #[serde(default)]
    pub certificates: Option<Vec<String>>,
    #[serde(default)]
    pub request_disposition: Option<String>,
    #[serde(default)]
    pub disposition_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnrollmentResponse {
    pub certificate_information: CertificateInformation,
}

/// Certificate as returned by `GET /Certificates/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateContext {
    pub id: i64,
    #[serde(default)]
    pub thumbprint: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(rename = "IssuedDN", default)]
    pub issued_dn: Option<String>,
    #[serde(rename = "IssuerDN", default)]
    pub issuer_dn: Option<String>,
    #[serde(default)]
    pub keyfactor_request_id: Option<i64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub subject_alt_name_elements: Vec<SubjectAltNameElement>,
    #[serde(default)]
    pub cert_state: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DownloadRequest {
    #[serde(rename = "CertID")]
    pub cert_id: i64,
    pub include_chain: bool,
    pub chain_order: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DownloadResponse {
    /// Base64 of the PEM bundle.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetadataUpdateRequest {
    pub id: i64,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RevokeRequest {
    pub certificate_ids: Vec<i64>,
    pub reason: i32,
    pub comment: String,
    pub effective_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateLocation {
    pub store_id: String,
    #[serde(default)]
    pub store_machine: Option<String>,
    #[serde(default)]
    pub store_path: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocationGroup {
    #[serde(default)]
    pub store_type: Option<String>,
    #[serde(default)]
    pub store_count: Option<i32>,
    #[serde(default)]
    pub locations: Vec<CertificateLocation>,
}

/// Response of `GET /Certificates/Locations/{id}`, grouped by store type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateLocations {
    #[serde(default)]
    pub details: Vec<LocationGroup>,
}

impl CertificateLocations {
    pub fn into_locations(self) -> Vec<CertificateLocation> {
        self.details
            .into_iter()
            .flat_map(|group| group.locations)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobSchedule {
    pub immediate: bool,
}

impl Default for JobSchedule {
    fn default() -> Self {
        Self { immediate: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoreTarget {
    pub certificate_store_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub overwrite: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pfx_password: Option<String>,
}

/// `POST /CertificateStores/Certificates/Add`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddToStoresRequest {
    pub certificate_id: i64,
    pub certificate_stores: Vec<StoreTarget>,
    pub schedule: JobSchedule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<i32>,
}

/// `POST /CertificateStores/Certificates/Remove`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoveFromStoresRequest {
    pub certificate_stores: Vec<StoreTarget>,
    pub schedule: JobSchedule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IntervalSchedule {
    pub minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimeSchedule {
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WeeklySchedule {
    pub days: Vec<String>,
    pub time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InventorySchedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<IntervalSchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily: Option<TimeSchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly: Option<WeeklySchedule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exactly_once: Option<TimeSchedule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StorePassword {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_type_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_guid: Option<String>,
}

/// Body shared by store create (`POST`) and update (`PUT`); `id` is only set
/// on update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoreRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<i32>,
    pub client_machine: String,
    pub store_path: String,
    pub cert_store_type: i32,
    pub agent_id: String,
    pub create_if_missing: bool,
    /// JSON-encoded object of `{"name": {"value": ...}}` entries.
    pub properties: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory_schedule: Option<InventorySchedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<StorePassword>,
    pub set_new_password_allowed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateStore {
    pub id: String,
    #[serde(default)]
    pub container_id: Option<i32>,
    pub client_machine: String,
    #[serde(rename = "Storepath", alias = "StorePath")]
    pub store_path: String,
    pub cert_store_type: i32,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub create_if_missing: bool,
    #[serde(default)]
    pub properties: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub agent_assigned: bool,
    #[serde(default)]
    pub inventory_schedule: Option<InventorySchedule>,
    #[serde(default)]
    pub set_new_password_allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateIdentityRequest {
    pub account_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleRef {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityIdentity {
    pub id: i32,
    pub account_name: String,
    #[serde(default)]
    pub identity_type: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleRef>,
    #[serde(default)]
    pub valid: Option<bool>,
}

/// Identity entry embedded in a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    pub account_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

impl RoleIdentity {
    pub fn named(account_name: &str) -> Self {
        Self {
            id: None,
            account_name: account_name.to_string(),
            identity_type: None,
            sid: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRoleRequest {
    pub name: String,
    pub description: String,
    pub permissions: Vec<String>,
    pub identities: Vec<RoleIdentity>,
}

/// Security role. Unknown fields are kept in `extra` so a read-modify-write
/// round trip sends the whole object back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityRole {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub identities: Vec<RoleIdentity>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Certificate template. Role membership lives in `allowed_requesters` as
/// role names; everything else passes through `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateTemplate {
    pub id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(default)]
    pub allowed_requesters: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Error body returned by Keyfactor on failed requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
