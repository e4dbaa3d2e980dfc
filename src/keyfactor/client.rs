//! Client implementation for Keyfactor Command API interactions.
//!
//! This module provides a client for making HTTP requests to the Keyfactor
//! REST API with the required headers, basic authentication and error mapping.

use crate::config::ConnectionSettings;
use crate::keyfactor::api::KeyfactorApi;
use crate::keyfactor::models::{
    AddToStoresRequest, ApiErrorBody, CertificateContext, CertificateLocation, CertificateLocations,
    CertificateStore, CertificateTemplate, CreateIdentityRequest, CreateRoleRequest,
    CsrEnrollmentRequest, DownloadRequest, DownloadResponse, EnrollmentResponse,
    MetadataUpdateRequest, PfxEnrollmentRequest, RemoveFromStoresRequest, RevokeRequest,
    SecurityIdentity, SecurityRole, StoreRequest,
};
use crate::keyfactor::KeyfactorError;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT},
    Client, Method, Response, StatusCode,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use tracing::debug;

const REQUESTED_WITH_HEADER: &str = "x-keyfactor-requested-with";
const API_VERSION_HEADER: &str = "x-keyfactor-api-version";
const APPKEY_HEADER: &str = "x-keyfactor-appkey";

/// Client for interacting with the Keyfactor Command HTTP API.
pub struct HttpKeyfactorClient {
    /// Base URL including the `/KeyfactorAPI` path
    pub base_url: String,
    username: String,
    password: String,
    /// HTTP client for making requests
    client: Client,
    /// Headers sent with every request
    default_headers: HeaderMap,
}

impl HttpKeyfactorClient {
    /// Creates a new client from resolved provider settings.
    pub fn new(settings: &ConnectionSettings) -> Result<Self, KeyfactorError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(settings.dev_mode)
            .build()
            .map_err(|e| KeyfactorError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(REQUESTED_WITH_HEADER, HeaderValue::from_static("APIClient"));
        default_headers.insert(API_VERSION_HEADER, HeaderValue::from_static("1"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut this = Self {
            base_url: settings.base_url.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            client,
            default_headers,
        };
        if let Some(appkey) = &settings.appkey {
            this.add_header(APPKEY_HEADER, appkey);
        }
        Ok(this)
    }

    /// Adds a custom header sent with every request. Invalid names or
    /// values are ignored.
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        if let (Ok(header_name), Ok(header_value)) =
            (HeaderName::from_str(name), HeaderValue::from_str(value))
        {
            self.default_headers.insert(header_name, header_value);
        }
        self
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, KeyfactorError> {
        let resp = self.send(Method::GET, path, query, None::<&()>).await?;
        parse_json(resp).await
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T, KeyfactorError> {
        let resp = self.send(method, path, query, Some(body)).await?;
        parse_json(resp).await
    }

    async fn send_no_content<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<(), KeyfactorError> {
        self.send(method, path, query, body).await?;
        Ok(())
    }

    /// Sends one request and maps non-success statuses onto `KeyfactorError`.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<Response, KeyfactorError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .headers(self.default_headers.clone())
            .basic_auth(&self.username, Some(&self.password));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(json_body) = body {
            request = request.json(json_body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| KeyfactorError::Network(format!("Request to {} failed: {}", url, e)))?;
        check_response(response).await
    }
}

/// Passes successful responses through; otherwise extracts Keyfactor's
/// `Message` and classifies missing objects as `NotFound`.
pub async fn check_response(resp: Response) -> Result<Response, KeyfactorError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_error(status, &body))
}

pub(crate) fn classify_error(status: StatusCode, body: &str) -> KeyfactorError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|e| e.message)
        .filter(|m| !m.is_empty());

    if status == StatusCode::NOT_FOUND {
        return KeyfactorError::NotFound(message.unwrap_or_else(|| body.to_string()));
    }
    match message {
        // Keyfactor reports unknown ids on several endpoints as 400s.
        Some(msg) if status == StatusCode::BAD_REQUEST && mentions_missing(&msg) => {
            KeyfactorError::NotFound(msg)
        }
        Some(msg) => KeyfactorError::Api(msg),
        None => KeyfactorError::HttpStatus(status.as_u16(), body.to_string()),
    }
}

fn mentions_missing(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("not found") || lower.contains("does not exist")
}

async fn parse_json<T: DeserializeOwned>(resp: Response) -> Result<T, KeyfactorError> {
    // Some endpoints answer 204 on success; treat that as JSON null.
    if resp.status() == StatusCode::NO_CONTENT {
        return serde_json::from_value(Value::Null).map_err(|e| {
            KeyfactorError::ParseError(format!("Expected a response body, got none: {}", e))
        });
    }
    let text = resp.text().await?;
    serde_json::from_str(&text)
        .map_err(|e| KeyfactorError::ParseError(format!("Failed to parse response: {}", e)))
}

fn collection_query(collection_id: Option<i32>) -> Vec<(&'static str, String)> {
    collection_id
        .map(|id| vec![("collectionId", id.to_string())])
        .unwrap_or_default()
}

#[async_trait]
impl KeyfactorApi for HttpKeyfactorClient {
    async fn enroll_pfx(
        &self,
        request: &PfxEnrollmentRequest,
    ) -> Result<EnrollmentResponse, KeyfactorError> {
        self.send_json(Method::POST, "/Enrollment/PFX", &[], request)
            .await
    }

    async fn enroll_csr(
        &self,
        request: &CsrEnrollmentRequest,
    ) -> Result<EnrollmentResponse, KeyfactorError> {
        self.send_json(Method::POST, "/Enrollment/CSR", &[], request)
            .await
    }

    async fn get_certificate(
        &self,
        id: i64,
        collection_id: Option<i32>,
    ) -> Result<CertificateContext, KeyfactorError> {
        let mut query = vec![("includeMetadata", "true".to_string())];
        query.extend(collection_query(collection_id));
        self.get(&format!("/Certificates/{}", id), &query).await
    }

    async fn download_certificate(
        &self,
        request: &DownloadRequest,
        collection_id: Option<i32>,
    ) -> Result<DownloadResponse, KeyfactorError> {
        self.send_json(
            Method::POST,
            "/Certificates/Download",
            &collection_query(collection_id),
            request,
        )
        .await
    }

    async fn update_certificate_metadata(
        &self,
        request: &MetadataUpdateRequest,
        collection_id: Option<i32>,
    ) -> Result<(), KeyfactorError> {
        self.send_no_content(
            Method::PUT,
            "/Certificates/Metadata",
            &collection_query(collection_id),
            Some(request),
        )
        .await
    }

    async fn revoke_certificates(&self, request: &RevokeRequest) -> Result<(), KeyfactorError> {
        self.send_no_content(Method::POST, "/Certificates/Revoke", &[], Some(request))
            .await
    }

    async fn get_certificate_locations(
        &self,
        certificate_id: i64,
    ) -> Result<Vec<CertificateLocation>, KeyfactorError> {
        let locations: CertificateLocations = self
            .get(&format!("/Certificates/Locations/{}", certificate_id), &[])
            .await?;
        Ok(locations.into_locations())
    }

    async fn add_certificate_to_stores(
        &self,
        request: &AddToStoresRequest,
    ) -> Result<Vec<String>, KeyfactorError> {
        self.send_json(
            Method::POST,
            "/CertificateStores/Certificates/Add",
            &[],
            request,
        )
        .await
    }

    async fn remove_certificate_from_stores(
        &self,
        request: &RemoveFromStoresRequest,
    ) -> Result<Vec<String>, KeyfactorError> {
        self.send_json(
            Method::POST,
            "/CertificateStores/Certificates/Remove",
            &[],
            request,
        )
        .await
    }

    async fn create_store(
        &self,
        request: &StoreRequest,
    ) -> Result<CertificateStore, KeyfactorError> {
        self.send_json(Method::POST, "/CertificateStores", &[], request)
            .await
    }

    async fn get_store(&self, id: &str) -> Result<CertificateStore, KeyfactorError> {
        self.get(&format!("/CertificateStores/{}", id), &[]).await
    }

    async fn update_store(
        &self,
        request: &StoreRequest,
    ) -> Result<CertificateStore, KeyfactorError> {
        self.send_json(Method::PUT, "/CertificateStores", &[], request)
            .await
    }

    async fn delete_store(&self, id: &str) -> Result<(), KeyfactorError> {
        self.send_no_content(
            Method::DELETE,
            &format!("/CertificateStores/{}", id),
            &[],
            None::<&()>,
        )
        .await
    }

    async fn create_identity(
        &self,
        request: &CreateIdentityRequest,
    ) -> Result<SecurityIdentity, KeyfactorError> {
        self.send_json(Method::POST, "/Security/Identities", &[], request)
            .await
    }

    async fn get_identity(&self, id: i32) -> Result<SecurityIdentity, KeyfactorError> {
        self.get(&format!("/Security/Identities/{}", id), &[]).await
    }

    async fn delete_identity(&self, id: i32) -> Result<(), KeyfactorError> {
        self.send_no_content(
            Method::DELETE,
            &format!("/Security/Identities/{}", id),
            &[],
            None::<&()>,
        )
        .await
    }

    async fn create_role(
        &self,
        request: &CreateRoleRequest,
    ) -> Result<SecurityRole, KeyfactorError> {
        self.send_json(Method::POST, "/Security/Roles", &[], request)
            .await
    }

    async fn get_role(&self, id: i32) -> Result<SecurityRole, KeyfactorError> {
        self.get(&format!("/Security/Roles/{}", id), &[]).await
    }

    async fn update_role(&self, role: &SecurityRole) -> Result<SecurityRole, KeyfactorError> {
        self.send_json(Method::PUT, "/Security/Roles", &[], role).await
    }

    async fn delete_role(&self, id: i32) -> Result<(), KeyfactorError> {
        self.send_no_content(
            Method::DELETE,
            &format!("/Security/Roles/{}", id),
            &[],
            None::<&()>,
        )
        .await
    }

    async fn list_templates(&self) -> Result<Vec<CertificateTemplate>, KeyfactorError> {
        self.get("/Templates", &[]).await
    }

    async fn get_template(&self, id: i32) -> Result<CertificateTemplate, KeyfactorError> {
        self.get(&format!("/Templates/{}", id), &[]).await
    }

    async fn update_template(
        &self,
        template: &CertificateTemplate,
    ) -> Result<CertificateTemplate, KeyfactorError> {
        self.send_json(Method::PUT, "/Templates", &[], template)
            .await
    }
}
