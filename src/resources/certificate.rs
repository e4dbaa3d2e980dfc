//! Certificate enrollment, metadata maintenance and revocation.

use crate::codec::material::{decode_download, split_pem_bundle, unpack_pkcs12, CertificateMaterial};
use crate::codec::metadata::{self, MetadataEntry};
use crate::codec::san::SubjectAltNames;
use crate::codec::subject::Subject;
use crate::codec::{present, Codec, CertificateCodec, EnrollmentRequest};
use crate::diagnostics::Diagnostics;
use crate::keyfactor::models::{
    CertificateInformation, DownloadRequest, MetadataUpdateRequest, RevokeRequest,
};
use crate::keyfactor::{KeyfactorApi, KeyfactorError};
use crate::resources::{check_updatable, delete_result, parse_id, read_failure, Resource};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// RFC 5280 reason code used when the resource is destroyed.
pub const REVOKE_REASON_CESSATION_OF_OPERATION: i32 = 5;
pub const REVOKE_COMMENT: &str = "Revoked by the Keyfactor provider on resource deletion";
const CHAIN_ORDER: &str = "EndEntityFirst";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificateState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sans: Option<SubjectAltNames>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetadataEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_password: Option<String>,
    pub certificate_authority: String,
    pub certificate_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_dn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyfactor_request_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_pem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_chain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

pub struct CertificateResource;

fn generate_key_password() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Certificate material the enrollment response carried, if any.
fn enrolled_material(
    info: &CertificateInformation,
    password: Option<&str>,
) -> Result<Option<CertificateMaterial>, KeyfactorError> {
    if let (Some(blob), Some(password)) = (info.pkcs12_blob.as_deref(), password) {
        return unpack_pkcs12(blob, password).map(Some);
    }
    match info.certificates.as_deref() {
        Some(certs) if !certs.is_empty() => split_pem_bundle(&certs.concat()).map(Some),
        _ => Ok(None),
    }
}

impl CertificateResource {
    async fn enroll(
        api: &dyn KeyfactorApi,
        request: &EnrollmentRequest,
    ) -> Result<CertificateInformation, KeyfactorError> {
        let response = match request {
            EnrollmentRequest::Pfx(pfx) => {
                debug!("PFX enrollment for {}", pfx.subject);
                api.enroll_pfx(pfx).await?
            }
            EnrollmentRequest::Csr(csr) => {
                debug!("CSR enrollment with template {}", csr.template);
                api.enroll_csr(csr).await?
            }
        };
        Ok(response.certificate_information)
    }

    /// Metadata request for a planned change: configured values, plus empty
    /// values for names no longer configured so the server clears them.
    fn metadata_update(
        id: i64,
        prior: &[MetadataEntry],
        planned: &[MetadataEntry],
    ) -> MetadataUpdateRequest {
        let mut values: BTreeMap<String, String> =
            metadata::expand(planned).unwrap_or_default();
        for entry in prior {
            values.entry(entry.name.clone()).or_default();
        }
        MetadataUpdateRequest {
            id,
            metadata: values,
        }
    }
}

#[async_trait]
impl Resource for CertificateResource {
    type State = CertificateState;

    const TYPE_NAME: &'static str = "certificate";
    const UPDATABLE: &'static [&'static str] = &["metadata"];

    async fn create(
        &self,
        api: &dyn KeyfactorApi,
        planned: &CertificateState,
        diags: &mut Diagnostics,
    ) -> Option<CertificateState> {
        let mut state = planned.clone();
        if present(&state.csr).is_none() && present(&state.key_password).is_none() {
            debug!("No key password configured, generating one");
            state.key_password = Some(generate_key_password());
        }

        let request = match CertificateCodec::expand(&state) {
            Ok(request) => request,
            Err(e) => {
                diags.error("Invalid certificate configuration", e);
                return None;
            }
        };
        let info = match Self::enroll(api, &request).await {
            Ok(info) => info,
            Err(e) => {
                diags.api_error("Certificate enrollment failed", &e);
                return None;
            }
        };
        if info.keyfactor_id <= 0 {
            diags.error(
                "Certificate was not issued",
                format!(
                    "enrollment returned disposition {}: {}",
                    info.request_disposition.as_deref().unwrap_or("unknown"),
                    info.disposition_message.as_deref().unwrap_or("")
                ),
            );
            return None;
        }

        state.id = Some(info.keyfactor_id.to_string());
        state.keyfactor_request_id = info.keyfactor_request_id;
        match enrolled_material(&info, present(&state.key_password)) {
            Ok(Some(material)) => {
                state.certificate_pem = Some(material.certificate_pem);
                state.certificate_chain = Some(material.chain_pem);
                if material.private_key_pem.is_some() {
                    state.private_key = material.private_key_pem;
                }
            }
            Ok(None) => {}
            Err(e) => diags.warning("Unable to decode enrolled certificate", e),
        }
        info!("Enrolled certificate {}", info.keyfactor_id);

        match self.read(api, &state, diags).await {
            Some(read) => Some(read),
            None => Some(state),
        }
    }

    async fn read(
        &self,
        api: &dyn KeyfactorApi,
        state: &CertificateState,
        diags: &mut Diagnostics,
    ) -> Option<CertificateState> {
        let id: i64 = parse_id(Self::TYPE_NAME, state.id.as_deref(), diags)?;

        let context = match api.get_certificate(id, state.collection_id).await {
            Ok(context) => context,
            Err(e) => {
                read_failure(Self::TYPE_NAME, &id.to_string(), e, diags);
                return None;
            }
        };
        let mut next = match CertificateCodec::flatten(&context, state) {
            Ok(next) => next,
            Err(e) => {
                diags.error("Unable to interpret certificate", e);
                return None;
            }
        };

        let download = DownloadRequest {
            cert_id: id,
            include_chain: true,
            chain_order: CHAIN_ORDER.to_string(),
        };
        let material = match api.download_certificate(&download, state.collection_id).await {
            Ok(response) => decode_download(&response.content),
            Err(e) => Err(e),
        };
        match material {
            Ok(material) => {
                next.certificate_pem = Some(material.certificate_pem);
                next.certificate_chain = Some(material.chain_pem);
            }
            Err(e) => {
                diags.api_error("Unable to download certificate", &e);
                return None;
            }
        }
        Some(next)
    }

    async fn update(
        &self,
        api: &dyn KeyfactorApi,
        prior: &CertificateState,
        planned: &CertificateState,
        diags: &mut Diagnostics,
    ) -> Option<CertificateState> {
        let planned = Self::carry_computed(prior, planned);
        if !check_updatable::<Self>(prior, &planned, diags) {
            return None;
        }
        if prior.metadata == planned.metadata {
            return Some(planned);
        }

        let id: i64 = parse_id(Self::TYPE_NAME, prior.id.as_deref(), diags)?;
        let request = Self::metadata_update(id, &prior.metadata, &planned.metadata);
        if let Err(e) = api
            .update_certificate_metadata(&request, prior.collection_id)
            .await
        {
            diags.api_error("Unable to update certificate metadata", &e);
            return None;
        }
        info!("Updated metadata on certificate {}", id);
        self.read(api, &planned, diags).await
    }

    async fn delete(&self, api: &dyn KeyfactorApi, state: &CertificateState, diags: &mut Diagnostics) {
        let Some(id) = parse_id::<i64>(Self::TYPE_NAME, state.id.as_deref(), diags) else {
            return;
        };
        let request = RevokeRequest {
            certificate_ids: vec![id],
            reason: REVOKE_REASON_CESSATION_OF_OPERATION,
            comment: REVOKE_COMMENT.to_string(),
            effective_date: Utc::now(),
            collection_id: state.collection_id,
        };
        let result = api.revoke_certificates(&request).await;
        if result.is_ok() {
            info!("Revoked certificate {}", id);
        }
        delete_result(Self::TYPE_NAME, &id.to_string(), result, diags);
    }

    fn carry_computed(prior: &CertificateState, planned: &CertificateState) -> CertificateState {
        CertificateState {
            id: prior.id.clone(),
            key_password: planned
                .key_password
                .clone()
                .or_else(|| prior.key_password.clone()),
            serial_number: prior.serial_number.clone(),
            issuer_dn: prior.issuer_dn.clone(),
            thumbprint: prior.thumbprint.clone(),
            keyfactor_request_id: prior.keyfactor_request_id,
            certificate_pem: prior.certificate_pem.clone(),
            certificate_chain: prior.certificate_chain.clone(),
            private_key: prior.private_key.clone(),
            ..planned.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyfactor::fake::{ApiCall, FakeKeyfactor};

    fn planned() -> CertificateState {
        CertificateState {
            subject: Some(Subject {
                subject_common_name: Some("web.example.com".into()),
                subject_organization: Some("Example".into()),
                ..Default::default()
            }),
            sans: Some(SubjectAltNames {
                dns: Some(vec!["web.example.com".into()]),
                ip4: Some(vec!["10.0.0.5".into()]),
                ..Default::default()
            }),
            metadata: vec![
                MetadataEntry::new("Owner", "alice"),
                MetadataEntry::new("CostCenter", "42"),
            ],
            certificate_authority: "ca.example.com\\Issuing CA".into(),
            certificate_template: "WebServer".into(),
            ..Default::default()
        }
    }

    async fn created(fake: &FakeKeyfactor) -> CertificateState {
        let mut diags = Diagnostics::new();
        let state = CertificateResource
            .create(fake, &planned(), &mut diags)
            .await
            .unwrap();
        assert!(!diags.has_errors(), "{:?}", diags);
        fake.clear_calls();
        state
    }

    #[tokio::test]
    async fn create_enrolls_pfx_and_reads_back() {
        let fake = FakeKeyfactor::new();
        let mut diags = Diagnostics::new();
        let state = CertificateResource
            .create(&fake, &planned(), &mut diags)
            .await
            .unwrap();

        assert!(diags.is_empty());
        let names: Vec<&str> = fake.calls().iter().map(ApiCall::name).collect();
        assert_eq!(
            names,
            vec!["enroll_pfx", "get_certificate", "download_certificate"]
        );
        assert!(state.id.is_some());
        assert!(state.key_password.as_deref().is_some_and(|p| !p.is_empty()));
        assert!(state
            .private_key
            .as_deref()
            .is_some_and(|k| k.contains("PRIVATE KEY")));
        assert!(state
            .certificate_pem
            .as_deref()
            .is_some_and(|c| c.starts_with("-----BEGIN CERTIFICATE-----")));
        assert_eq!(state.subject, planned().subject);
        assert_eq!(state.sans, planned().sans);
        assert_eq!(state.metadata, planned().metadata);
        assert_eq!(state.issuer_dn.as_deref(), Some("CN=Fake Issuing CA"));
    }

    #[tokio::test]
    async fn organization_with_comma_can_be_created_and_read() {
        let fake = FakeKeyfactor::new();
        let mut config = planned();
        if let Some(subject) = config.subject.as_mut() {
            subject.subject_organization = Some("Example, Inc.".into());
        }

        let mut diags = Diagnostics::new();
        let state = CertificateResource
            .create(&fake, &config, &mut diags)
            .await
            .unwrap();
        assert!(!diags.has_errors(), "{:?}", diags);
        assert_eq!(state.subject, config.subject);

        let read = CertificateResource
            .read(&fake, &state, &mut diags)
            .await
            .unwrap();
        assert!(!diags.has_errors(), "{:?}", diags);
        assert_eq!(
            read.subject
                .as_ref()
                .and_then(|s| s.subject_organization.as_deref()),
            Some("Example, Inc.")
        );
    }

    #[tokio::test]
    async fn create_with_csr_uses_csr_enrollment() {
        let fake = FakeKeyfactor::new();
        let mut config = planned();
        config.csr = Some("-----BEGIN CERTIFICATE REQUEST-----\nMIIB\n-----END CERTIFICATE REQUEST-----".into());
        config.subject = None;
        let mut diags = Diagnostics::new();
        let state = CertificateResource
            .create(&fake, &config, &mut diags)
            .await
            .unwrap();
        assert!(matches!(fake.calls()[0], ApiCall::EnrollCsr(_)));
        assert_eq!(state.key_password, None);
        assert_eq!(state.private_key, None);
        // The subject of a CSR certificate is not taken over from the server.
        assert_eq!(state.subject, None);
    }

    #[tokio::test]
    async fn create_rejects_invalid_configuration_before_any_call() {
        let fake = FakeKeyfactor::new();
        let mut config = planned();
        config.certificate_template = String::new();
        let mut diags = Diagnostics::new();
        assert!(CertificateResource
            .create(&fake, &config, &mut diags)
            .await
            .is_none());
        assert!(diags.has_errors());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn read_of_missing_certificate_is_none_without_errors() {
        let fake = FakeKeyfactor::new();
        let state = created(&fake).await;
        fake.remove_certificate(state.id.as_deref().unwrap().parse().unwrap());

        let mut diags = Diagnostics::new();
        assert!(CertificateResource
            .read(&fake, &state, &mut diags)
            .await
            .is_none());
        assert!(!diags.has_errors());
    }

    #[tokio::test]
    async fn read_keeps_private_key_and_configured_metadata_order() {
        let fake = FakeKeyfactor::new();
        let state = created(&fake).await;
        let id: i64 = state.id.as_deref().unwrap().parse().unwrap();
        fake.set_certificate_metadata(id, &[("Owner", "bob"), ("Unmanaged", "x")]);

        let mut diags = Diagnostics::new();
        let read = CertificateResource
            .read(&fake, &state, &mut diags)
            .await
            .unwrap();
        assert_eq!(read.private_key, state.private_key);
        assert_eq!(
            read.metadata,
            vec![
                MetadataEntry::new("Owner", "bob"),
                MetadataEntry::new("CostCenter", "42")
            ]
        );
    }

    #[tokio::test]
    async fn metadata_update_is_the_only_mutation() {
        let fake = FakeKeyfactor::new();
        let state = created(&fake).await;

        let mut planned = state.clone();
        planned.metadata = vec![MetadataEntry::new("Owner", "carol")];
        let mut diags = Diagnostics::new();
        let updated = CertificateResource
            .update(&fake, &state, &planned, &mut diags)
            .await
            .unwrap();

        assert!(!diags.has_errors());
        assert_eq!(updated.metadata, vec![MetadataEntry::new("Owner", "carol")]);
        let mutations = fake.mutations();
        assert_eq!(mutations.len(), 1);
        match &mutations[0] {
            ApiCall::UpdateMetadata(request) => {
                assert_eq!(request.metadata["Owner"], "carol");
                assert_eq!(request.metadata["CostCenter"], "");
            }
            other => panic!("expected metadata update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn changing_certificate_authority_is_rejected_without_calls() {
        let fake = FakeKeyfactor::new();
        let state = created(&fake).await;

        let mut planned = state.clone();
        planned.certificate_authority = "ca.example.com\\Other CA".into();
        planned.metadata = vec![MetadataEntry::new("Owner", "carol")];
        let mut diags = Diagnostics::new();
        assert!(CertificateResource
            .update(&fake, &state, &planned, &mut diags)
            .await
            .is_none());

        assert!(diags.has_errors());
        let detail = &diags.errors().next().unwrap().detail;
        assert!(detail.contains("certificate_authority"));
        assert!(detail.contains("cannot be updated in place"));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn unset_computed_fields_do_not_block_update() {
        let fake = FakeKeyfactor::new();
        let state = created(&fake).await;

        // Planned state as the host sends it: configuration only.
        let mut planned = planned();
        planned.metadata = vec![MetadataEntry::new("Owner", "dave")];
        let mut diags = Diagnostics::new();
        let updated = CertificateResource
            .update(&fake, &state, &planned, &mut diags)
            .await
            .unwrap();
        assert!(!diags.has_errors(), "{:?}", diags);
        assert_eq!(updated.id, state.id);
        assert_eq!(updated.key_password, state.key_password);
    }

    #[tokio::test]
    async fn delete_revokes_exactly_once() {
        let fake = FakeKeyfactor::new();
        let mut state = created(&fake).await;
        state.collection_id = Some(4);

        let mut diags = Diagnostics::new();
        CertificateResource.delete(&fake, &state, &mut diags).await;

        assert!(!diags.has_errors());
        let mutations = fake.mutations();
        assert_eq!(mutations.len(), 1);
        match &mutations[0] {
            ApiCall::Revoke(request) => {
                assert_eq!(request.certificate_ids, vec![state.id.unwrap().parse::<i64>().unwrap()]);
                assert_eq!(request.reason, REVOKE_REASON_CESSATION_OF_OPERATION);
                assert_eq!(request.collection_id, Some(4));
                let json = serde_json::to_value(request).unwrap();
                assert_eq!(json["CollectionId"], 4);
            }
            other => panic!("expected revoke, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn revoke_omits_collection_when_unset() {
        let fake = FakeKeyfactor::new();
        let state = created(&fake).await;
        let mut diags = Diagnostics::new();
        CertificateResource.delete(&fake, &state, &mut diags).await;
        let ApiCall::Revoke(request) = &fake.mutations()[0] else {
            panic!("expected revoke");
        };
        let json = serde_json::to_value(request).unwrap();
        assert!(json.get("CollectionId").is_none());
    }

    #[tokio::test]
    async fn enrollment_failure_is_reported_verbatim() {
        let fake = FakeKeyfactor::new();
        fake.fail_calls_named("enroll_pfx");
        let mut diags = Diagnostics::new();
        assert!(CertificateResource
            .create(&fake, &planned(), &mut diags)
            .await
            .is_none());
        assert!(diags
            .errors()
            .any(|d| d.detail.contains("injected failure in enroll_pfx")));
    }
}
