//! The remote operations the provider performs against Keyfactor Command.
//!
//! Resources and reconcilers only ever see `&dyn KeyfactorApi`; the HTTP
//! implementation lives in `client.rs` and an in-memory one in `fake.rs`.

use crate::keyfactor::models::{
    AddToStoresRequest, CertificateContext, CertificateLocation, CertificateStore,
    CertificateTemplate, CreateIdentityRequest, CreateRoleRequest, CsrEnrollmentRequest,
    DownloadRequest, DownloadResponse, EnrollmentResponse, MetadataUpdateRequest,
    PfxEnrollmentRequest, RemoveFromStoresRequest, RevokeRequest, SecurityIdentity,
    SecurityRole, StoreRequest,
};
use crate::keyfactor::KeyfactorError;
use async_trait::async_trait;

#[async_trait]
pub trait KeyfactorApi: Send + Sync {
    // Certificates
    async fn enroll_pfx(
        &self,
        request: &PfxEnrollmentRequest,
    ) -> Result<EnrollmentResponse, KeyfactorError>;
    async fn enroll_csr(
        &self,
        request: &CsrEnrollmentRequest,
    ) -> Result<EnrollmentResponse, KeyfactorError>;
    async fn get_certificate(
        &self,
        id: i64,
        collection_id: Option<i32>,
    ) -> Result<CertificateContext, KeyfactorError>;
    async fn download_certificate(
        &self,
        request: &DownloadRequest,
        collection_id: Option<i32>,
    ) -> Result<DownloadResponse, KeyfactorError>;
    async fn update_certificate_metadata(
        &self,
        request: &MetadataUpdateRequest,
        collection_id: Option<i32>,
    ) -> Result<(), KeyfactorError>;
    async fn revoke_certificates(&self, request: &RevokeRequest) -> Result<(), KeyfactorError>;

    // Certificate <-> store deployment
    async fn get_certificate_locations(
        &self,
        certificate_id: i64,
    ) -> Result<Vec<CertificateLocation>, KeyfactorError>;
    async fn add_certificate_to_stores(
        &self,
        request: &AddToStoresRequest,
    ) -> Result<Vec<String>, KeyfactorError>;
    async fn remove_certificate_from_stores(
        &self,
        request: &RemoveFromStoresRequest,
    ) -> Result<Vec<String>, KeyfactorError>;

    // Certificate stores
    async fn create_store(&self, request: &StoreRequest)
        -> Result<CertificateStore, KeyfactorError>;
    async fn get_store(&self, id: &str) -> Result<CertificateStore, KeyfactorError>;
    async fn update_store(&self, request: &StoreRequest)
        -> Result<CertificateStore, KeyfactorError>;
    async fn delete_store(&self, id: &str) -> Result<(), KeyfactorError>;

    // Security identities
    async fn create_identity(
        &self,
        request: &CreateIdentityRequest,
    ) -> Result<SecurityIdentity, KeyfactorError>;
    async fn get_identity(&self, id: i32) -> Result<SecurityIdentity, KeyfactorError>;
    async fn delete_identity(&self, id: i32) -> Result<(), KeyfactorError>;

    // Security roles
    async fn create_role(&self, request: &CreateRoleRequest)
        -> Result<SecurityRole, KeyfactorError>;
    async fn get_role(&self, id: i32) -> Result<SecurityRole, KeyfactorError>;
    async fn update_role(&self, role: &SecurityRole) -> Result<SecurityRole, KeyfactorError>;
    async fn delete_role(&self, id: i32) -> Result<(), KeyfactorError>;

    // Certificate templates
    async fn list_templates(&self) -> Result<Vec<CertificateTemplate>, KeyfactorError>;
    async fn get_template(&self, id: i32) -> Result<CertificateTemplate, KeyfactorError>;
    async fn update_template(
        &self,
        template: &CertificateTemplate,
    ) -> Result<CertificateTemplate, KeyfactorError>;
}
