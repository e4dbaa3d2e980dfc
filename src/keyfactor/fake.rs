//! In-memory stand-in for Keyfactor Command.
//!
//! Keeps just enough server state to answer every `KeyfactorApi` call
//! consistently and records each call so tests can assert on the exact
//! mutations a lifecycle operation issued.

use crate::keyfactor::api::KeyfactorApi;
use crate::keyfactor::models::{
    AddToStoresRequest, CertificateContext, CertificateInformation, CertificateLocation,
    CertificateStore, CertificateTemplate, CreateIdentityRequest, CreateRoleRequest,
    CsrEnrollmentRequest, DownloadRequest, DownloadResponse, EnrollmentResponse,
    MetadataUpdateRequest, PfxEnrollmentRequest, RemoveFromStoresRequest, RevokeRequest, RoleRef,
    SecurityIdentity, SecurityRole, StoreRequest, SubjectAltNameElement,
};
use crate::keyfactor::KeyfactorError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509NameBuilder, X509};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

/// One recorded API call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    EnrollPfx(PfxEnrollmentRequest),
    EnrollCsr(CsrEnrollmentRequest),
    GetCertificate(i64),
    DownloadCertificate(i64),
    UpdateMetadata(MetadataUpdateRequest),
    Revoke(RevokeRequest),
    GetLocations(i64),
    AddToStores(AddToStoresRequest),
    RemoveFromStores(RemoveFromStoresRequest),
    CreateStore(StoreRequest),
    GetStore(String),
    UpdateStore(StoreRequest),
    DeleteStore(String),
    CreateIdentity(String),
    GetIdentity(i32),
    DeleteIdentity(i32),
    CreateRole(String),
    GetRole(i32),
    UpdateRole(SecurityRole),
    DeleteRole(i32),
    ListTemplates,
    GetTemplate(i32),
    UpdateTemplate(CertificateTemplate),
}

impl ApiCall {
    pub fn name(&self) -> &'static str {
        match self {
            ApiCall::EnrollPfx(_) => "enroll_pfx",
            ApiCall::EnrollCsr(_) => "enroll_csr",
            ApiCall::GetCertificate(_) => "get_certificate",
            ApiCall::DownloadCertificate(_) => "download_certificate",
            ApiCall::UpdateMetadata(_) => "update_certificate_metadata",
            ApiCall::Revoke(_) => "revoke_certificates",
            ApiCall::GetLocations(_) => "get_certificate_locations",
            ApiCall::AddToStores(_) => "add_certificate_to_stores",
            ApiCall::RemoveFromStores(_) => "remove_certificate_from_stores",
            ApiCall::CreateStore(_) => "create_store",
            ApiCall::GetStore(_) => "get_store",
            ApiCall::UpdateStore(_) => "update_store",
            ApiCall::DeleteStore(_) => "delete_store",
            ApiCall::CreateIdentity(_) => "create_identity",
            ApiCall::GetIdentity(_) => "get_identity",
            ApiCall::DeleteIdentity(_) => "delete_identity",
            ApiCall::CreateRole(_) => "create_role",
            ApiCall::GetRole(_) => "get_role",
            ApiCall::UpdateRole(_) => "update_role",
            ApiCall::DeleteRole(_) => "delete_role",
            ApiCall::ListTemplates => "list_templates",
            ApiCall::GetTemplate(_) => "get_template",
            ApiCall::UpdateTemplate(_) => "update_template",
        }
    }

    /// True for calls that change server state.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            ApiCall::GetCertificate(_)
                | ApiCall::DownloadCertificate(_)
                | ApiCall::GetLocations(_)
                | ApiCall::GetStore(_)
                | ApiCall::GetIdentity(_)
                | ApiCall::GetRole(_)
                | ApiCall::ListTemplates
                | ApiCall::GetTemplate(_)
        )
    }
}

struct FakeCertificate {
    context: CertificateContext,
    pem_bundle: String,
    locations: Vec<CertificateLocation>,
}

#[derive(Default)]
struct FakeState {
    next_id: i64,
    certificates: BTreeMap<i64, FakeCertificate>,
    stores: BTreeMap<String, CertificateStore>,
    identities: BTreeMap<i32, SecurityIdentity>,
    roles: BTreeMap<i32, SecurityRole>,
    templates: BTreeMap<i32, CertificateTemplate>,
    calls: Vec<ApiCall>,
    failing: HashSet<&'static str>,
    rejected_stores: HashSet<String>,
}

impl FakeState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        1000 + self.next_id
    }

    fn record(&mut self, call: ApiCall) -> Result<(), KeyfactorError> {
        let name = call.name();
        self.calls.push(call);
        if self.failing.contains(name) {
            return Err(KeyfactorError::Api(format!("injected failure in {}", name)));
        }
        Ok(())
    }

    fn roles_of(&self, account_name: &str) -> Vec<RoleRef> {
        self.roles
            .values()
            .filter(|role| {
                role.identities
                    .iter()
                    .any(|i| i.account_name.eq_ignore_ascii_case(account_name))
            })
            .map(|role| RoleRef {
                id: role.id,
                name: role.name.clone(),
            })
            .collect()
    }
}

/// In-memory Keyfactor server.
#[derive(Default)]
pub struct FakeKeyfactor {
    state: Mutex<FakeState>,
}

impl FakeKeyfactor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    /// Only the state-changing calls made so far.
    pub fn mutations(&self) -> Vec<ApiCall> {
        self.calls().into_iter().filter(ApiCall::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Makes every subsequent call with this name fail with an API error.
    pub fn fail_calls_named(&self, name: &'static str) {
        self.state().failing.insert(name);
    }

    /// Makes bulk adds silently skip this store (no job is scheduled).
    pub fn reject_store(&self, store_id: &str) {
        self.state().rejected_stores.insert(store_id.to_string());
    }

    pub fn insert_role(&self, id: i32, name: &str, members: &[&str]) {
        let role = SecurityRole {
            id,
            name: name.to_string(),
            description: format!("{} role", name),
            permissions: vec!["Certificates:Read".to_string()],
            identities: members
                .iter()
                .map(|m| crate::keyfactor::models::RoleIdentity::named(m))
                .collect(),
            extra: Default::default(),
        };
        self.state().roles.insert(id, role);
    }

    pub fn insert_identity(&self, id: i32, account_name: &str) {
        let identity = SecurityIdentity {
            id,
            account_name: account_name.to_string(),
            identity_type: Some("User".to_string()),
            roles: Vec::new(),
            valid: Some(true),
        };
        self.state().identities.insert(id, identity);
    }

    pub fn insert_template(&self, id: i32, name: &str, allowed_requesters: &[&str]) {
        let mut extra = serde_json::Map::new();
        extra.insert("KeySize".to_string(), serde_json::json!("2048"));
        let template = CertificateTemplate {
            id,
            common_name: Some(name.to_string()),
            template_name: Some(name.to_string()),
            allowed_requesters: allowed_requesters.iter().map(|r| r.to_string()).collect(),
            extra,
        };
        self.state().templates.insert(id, template);
    }

    pub fn insert_store(&self, store: CertificateStore) {
        self.state().stores.insert(store.id.clone(), store);
    }

    /// Seeds an issued certificate deployed at the given (store, alias) pairs.
    pub fn insert_certificate(&self, id: i64, subject: &str, locations: &[(&str, &str)]) {
        let (cert, _) = self_signed(subject);
        let pem = pem_string(&cert);
        let context = CertificateContext {
            id,
            thumbprint: Some(format!("THUMB{}", id)),
            serial_number: Some(format!("{:X}", id)),
            issued_dn: Some(subject.to_string()),
            issuer_dn: Some(subject.to_string()),
            keyfactor_request_id: Some(id + 7),
            ..Default::default()
        };
        let locations = locations
            .iter()
            .map(|(store, alias)| CertificateLocation {
                store_id: store.to_string(),
                alias: Some(alias.to_string()),
                ..Default::default()
            })
            .collect();
        self.state().certificates.insert(
            id,
            FakeCertificate {
                context,
                pem_bundle: pem,
                locations,
            },
        );
    }

    pub fn set_certificate_metadata(&self, id: i64, metadata: &[(&str, &str)]) {
        if let Some(cert) = self.state().certificates.get_mut(&id) {
            cert.context.metadata = metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }
    }

    pub fn remove_certificate(&self, id: i64) {
        self.state().certificates.remove(&id);
    }

    pub fn role(&self, id: i32) -> Option<SecurityRole> {
        self.state().roles.get(&id).cloned()
    }

    pub fn template(&self, id: i32) -> Option<CertificateTemplate> {
        self.state().templates.get(&id).cloned()
    }

    pub fn store(&self, id: &str) -> Option<CertificateStore> {
        self.state().stores.get(id).cloned()
    }

    pub fn locations(&self, certificate_id: i64) -> Vec<CertificateLocation> {
        self.state()
            .certificates
            .get(&certificate_id)
            .map(|c| c.locations.clone())
            .unwrap_or_default()
    }

    fn issue(
        state: &mut FakeState,
        subject: &str,
        sans: Option<&crate::keyfactor::models::EnrollmentSans>,
        metadata: Option<&BTreeMap<String, String>>,
    ) -> (i64, X509, PKey<Private>) {
        let id = state.allocate_id();
        let (cert, key) = self_signed(subject);
        let mut elements = Vec::new();
        if let Some(sans) = sans {
            for dns in &sans.dns {
                elements.push(SubjectAltNameElement {
                    id: None,
                    value: dns.clone(),
                    type_code: 2,
                });
            }
            for ip in &sans.ip4 {
                elements.push(SubjectAltNameElement {
                    id: None,
                    value: ip.clone(),
                    type_code: 7,
                });
            }
            for uri in &sans.uri {
                elements.push(SubjectAltNameElement {
                    id: None,
                    value: uri.clone(),
                    type_code: 6,
                });
            }
        }
        let context = CertificateContext {
            id,
            thumbprint: Some(format!("THUMB{}", id)),
            serial_number: Some(format!("{:X}", id)),
            issued_dn: Some(subject.to_string()),
            issuer_dn: Some("CN=Fake Issuing CA".to_string()),
            keyfactor_request_id: Some(id + 7),
            metadata: metadata.cloned().unwrap_or_default(),
            subject_alt_name_elements: elements,
            cert_state: Some(1),
        };
        state.certificates.insert(
            id,
            FakeCertificate {
                context,
                pem_bundle: pem_string(&cert),
                locations: Vec::new(),
            },
        );
        (id, cert, key)
    }

    fn information(state: &FakeState, id: i64) -> CertificateInformation {
        let context = &state.certificates[&id].context;
        CertificateInformation {
            serial_number: context.serial_number.clone(),
            issuer_dn: context.issuer_dn.clone(),
            thumbprint: context.thumbprint.clone(),
            keyfactor_id: id,
            keyfactor_request_id: context.keyfactor_request_id,
            request_disposition: Some("ISSUED".to_string()),
            ..Default::default()
        }
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> KeyfactorError {
    KeyfactorError::NotFound(format!("{} {} was not found", what, id))
}

fn pem_string(cert: &X509) -> String {
    cert.to_pem()
        .map(|pem| String::from_utf8_lossy(&pem).into_owned())
        .unwrap_or_default()
}

/// Generates a throwaway self-signed certificate for the given DN's CN.
pub fn self_signed(subject: &str) -> (X509, PKey<Private>) {
    let common_name = subject
        .split(',')
        .find_map(|seg| seg.trim().strip_prefix("CN="))
        .unwrap_or("fake.example.com");

    let rsa = Rsa::generate(2048).expect("generate rsa key");
    let key = PKey::from_rsa(rsa).expect("wrap rsa key");
    let mut name = X509NameBuilder::new().expect("name builder");
    name.append_entry_by_text("CN", common_name)
        .expect("set common name");
    let name = name.build();

    let mut serial = BigNum::new().expect("bignum");
    serial
        .rand(64, MsbOption::MAYBE_ZERO, false)
        .expect("random serial");
    let mut builder = X509::builder().expect("x509 builder");
    builder.set_version(2).expect("version");
    builder
        .set_serial_number(&serial.to_asn1_integer().expect("asn1 serial"))
        .expect("serial");
    builder.set_subject_name(&name).expect("subject");
    builder.set_issuer_name(&name).expect("issuer");
    builder.set_pubkey(&key).expect("pubkey");
    builder
        .set_not_before(&Asn1Time::days_from_now(0).expect("not before"))
        .expect("not before");
    builder
        .set_not_after(&Asn1Time::days_from_now(30).expect("not after"))
        .expect("not after");
    builder.sign(&key, MessageDigest::sha256()).expect("sign");
    (builder.build(), key)
}

#[async_trait]
impl KeyfactorApi for FakeKeyfactor {
    async fn enroll_pfx(
        &self,
        request: &PfxEnrollmentRequest,
    ) -> Result<EnrollmentResponse, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::EnrollPfx(request.clone()))?;
        let (id, cert, key) = Self::issue(
            &mut state,
            &request.subject,
            request.sans.as_ref(),
            request.metadata.as_ref(),
        );
        let pkcs12 = Pkcs12::builder()
            .name("fake")
            .pkey(&key)
            .cert(&cert)
            .build2(&request.password)?;
        let mut info = Self::information(&state, id);
        info.pkcs12_blob = Some(STANDARD.encode(pkcs12.to_der()?));
        Ok(EnrollmentResponse {
            certificate_information: info,
        })
    }

    async fn enroll_csr(
        &self,
        request: &CsrEnrollmentRequest,
    ) -> Result<EnrollmentResponse, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::EnrollCsr(request.clone()))?;
        let (id, cert, _) = Self::issue(
            &mut state,
            "CN=csr.example.com",
            request.sans.as_ref(),
            request.metadata.as_ref(),
        );
        let mut info = Self::information(&state, id);
        info.certificates = Some(vec![pem_string(&cert)]);
        Ok(EnrollmentResponse {
            certificate_information: info,
        })
    }

    async fn get_certificate(
        &self,
        id: i64,
        _collection_id: Option<i32>,
    ) -> Result<CertificateContext, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::GetCertificate(id))?;
        state
            .certificates
            .get(&id)
            .map(|c| c.context.clone())
            .ok_or_else(|| not_found("Certificate", id))
    }

    async fn download_certificate(
        &self,
        request: &DownloadRequest,
        _collection_id: Option<i32>,
    ) -> Result<DownloadResponse, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::DownloadCertificate(request.cert_id))?;
        let cert = state
            .certificates
            .get(&request.cert_id)
            .ok_or_else(|| not_found("Certificate", request.cert_id))?;
        Ok(DownloadResponse {
            content: STANDARD.encode(cert.pem_bundle.as_bytes()),
        })
    }

    async fn update_certificate_metadata(
        &self,
        request: &MetadataUpdateRequest,
        _collection_id: Option<i32>,
    ) -> Result<(), KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::UpdateMetadata(request.clone()))?;
        let cert = state
            .certificates
            .get_mut(&request.id)
            .ok_or_else(|| not_found("Certificate", request.id))?;
        for (name, value) in &request.metadata {
            cert.context.metadata.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    async fn revoke_certificates(&self, request: &RevokeRequest) -> Result<(), KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::Revoke(request.clone()))?;
        for id in &request.certificate_ids {
            if let Some(cert) = state.certificates.get_mut(id) {
                cert.context.cert_state = Some(2);
            }
        }
        Ok(())
    }

    async fn get_certificate_locations(
        &self,
        certificate_id: i64,
    ) -> Result<Vec<CertificateLocation>, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::GetLocations(certificate_id))?;
        state
            .certificates
            .get(&certificate_id)
            .map(|c| c.locations.clone())
            .ok_or_else(|| not_found("Certificate", certificate_id))
    }

    async fn add_certificate_to_stores(
        &self,
        request: &AddToStoresRequest,
    ) -> Result<Vec<String>, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::AddToStores(request.clone()))?;
        let rejected = state.rejected_stores.clone();
        let cert = state
            .certificates
            .get_mut(&request.certificate_id)
            .ok_or_else(|| not_found("Certificate", request.certificate_id))?;
        let mut jobs = Vec::new();
        for target in &request.certificate_stores {
            if rejected.contains(&target.certificate_store_id) {
                continue;
            }
            let present = cert.locations.iter().any(|l| {
                l.store_id.eq_ignore_ascii_case(&target.certificate_store_id)
                    && l.alias == target.alias
            });
            if !present {
                cert.locations.push(CertificateLocation {
                    store_id: target.certificate_store_id.clone(),
                    alias: target.alias.clone(),
                    ..Default::default()
                });
            }
            jobs.push(uuid::Uuid::new_v4().to_string());
        }
        Ok(jobs)
    }

    async fn remove_certificate_from_stores(
        &self,
        request: &RemoveFromStoresRequest,
    ) -> Result<Vec<String>, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::RemoveFromStores(request.clone()))?;
        let mut jobs = Vec::new();
        for cert in state.certificates.values_mut() {
            let before = cert.locations.len();
            cert.locations.retain(|l| {
                !request.certificate_stores.iter().any(|t| {
                    t.certificate_store_id.eq_ignore_ascii_case(&l.store_id) && t.alias == l.alias
                })
            });
            for _ in cert.locations.len()..before {
                jobs.push(uuid::Uuid::new_v4().to_string());
            }
        }
        Ok(jobs)
    }

    async fn create_store(
        &self,
        request: &StoreRequest,
    ) -> Result<CertificateStore, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::CreateStore(request.clone()))?;
        let store = CertificateStore {
            id: uuid::Uuid::new_v4().to_string(),
            container_id: request.container_id,
            client_machine: request.client_machine.clone(),
            store_path: request.store_path.clone(),
            cert_store_type: request.cert_store_type,
            approved: true,
            create_if_missing: request.create_if_missing,
            properties: request.properties.clone(),
            agent_id: request.agent_id.clone(),
            agent_assigned: !request.agent_id.is_empty(),
            inventory_schedule: request.inventory_schedule.clone(),
            set_new_password_allowed: request.set_new_password_allowed,
        };
        state.stores.insert(store.id.clone(), store.clone());
        Ok(store)
    }

    async fn get_store(&self, id: &str) -> Result<CertificateStore, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::GetStore(id.to_string()))?;
        state
            .stores
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("Certificate store", id))
    }

    async fn update_store(
        &self,
        request: &StoreRequest,
    ) -> Result<CertificateStore, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::UpdateStore(request.clone()))?;
        let id = request.id.clone().unwrap_or_default();
        let store = state
            .stores
            .get_mut(&id)
            .ok_or_else(|| not_found("Certificate store", &id))?;
        store.properties = request.properties.clone();
        store.inventory_schedule = request.inventory_schedule.clone();
        store.set_new_password_allowed = request.set_new_password_allowed;
        Ok(store.clone())
    }

    async fn delete_store(&self, id: &str) -> Result<(), KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::DeleteStore(id.to_string()))?;
        state
            .stores
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("Certificate store", id))
    }

    async fn create_identity(
        &self,
        request: &CreateIdentityRequest,
    ) -> Result<SecurityIdentity, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::CreateIdentity(request.account_name.clone()))?;
        let id = state.allocate_id() as i32;
        let identity = SecurityIdentity {
            id,
            account_name: request.account_name.clone(),
            identity_type: Some("User".to_string()),
            roles: Vec::new(),
            valid: Some(true),
        };
        state.identities.insert(id, identity.clone());
        Ok(identity)
    }

    async fn get_identity(&self, id: i32) -> Result<SecurityIdentity, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::GetIdentity(id))?;
        let mut identity = state
            .identities
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Identity", id))?;
        identity.roles = state.roles_of(&identity.account_name);
        Ok(identity)
    }

    async fn delete_identity(&self, id: i32) -> Result<(), KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::DeleteIdentity(id))?;
        let identity = state
            .identities
            .remove(&id)
            .ok_or_else(|| not_found("Identity", id))?;
        for role in state.roles.values_mut() {
            role.identities
                .retain(|i| !i.account_name.eq_ignore_ascii_case(&identity.account_name));
        }
        Ok(())
    }

    async fn create_role(
        &self,
        request: &CreateRoleRequest,
    ) -> Result<SecurityRole, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::CreateRole(request.name.clone()))?;
        let id = state.allocate_id() as i32;
        let role = SecurityRole {
            id,
            name: request.name.clone(),
            description: request.description.clone(),
            permissions: request.permissions.clone(),
            identities: request.identities.clone(),
            extra: Default::default(),
        };
        state.roles.insert(id, role.clone());
        Ok(role)
    }

    async fn get_role(&self, id: i32) -> Result<SecurityRole, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::GetRole(id))?;
        state
            .roles
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Role", id))
    }

    async fn update_role(&self, role: &SecurityRole) -> Result<SecurityRole, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::UpdateRole(role.clone()))?;
        if !state.roles.contains_key(&role.id) {
            return Err(not_found("Role", role.id));
        }
        state.roles.insert(role.id, role.clone());
        Ok(role.clone())
    }

    async fn delete_role(&self, id: i32) -> Result<(), KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::DeleteRole(id))?;
        let role = state.roles.remove(&id).ok_or_else(|| not_found("Role", id))?;
        for template in state.templates.values_mut() {
            template
                .allowed_requesters
                .retain(|r| !r.eq_ignore_ascii_case(&role.name));
        }
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<CertificateTemplate>, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::ListTemplates)?;
        Ok(state.templates.values().cloned().collect())
    }

    async fn get_template(&self, id: i32) -> Result<CertificateTemplate, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::GetTemplate(id))?;
        state
            .templates
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Template", id))
    }

    async fn update_template(
        &self,
        template: &CertificateTemplate,
    ) -> Result<CertificateTemplate, KeyfactorError> {
        let mut state = self.state();
        state.record(ApiCall::UpdateTemplate(template.clone()))?;
        if !state.templates.contains_key(&template.id) {
            return Err(not_found("Template", template.id));
        }
        state.templates.insert(template.id, template.clone());
        Ok(template.clone())
    }
}
