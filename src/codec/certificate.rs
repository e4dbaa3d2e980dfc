use crate::codec::{metadata, present, required, san, subject, Codec, CodecError};
use crate::keyfactor::models::{CertificateContext, CsrEnrollmentRequest, PfxEnrollmentRequest};
use crate::resources::certificate::CertificateState;
use chrono::Utc;

/// Enrollment call chosen by `CertificateCodec::expand`.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentRequest {
    /// Keyfactor generates the key pair and returns a PKCS#12.
    Pfx(PfxEnrollmentRequest),
    /// Signs the configured CSR.
    Csr(CsrEnrollmentRequest),
}

pub struct CertificateCodec;

impl Codec for CertificateCodec {
    type Config = CertificateState;
    type Request = EnrollmentRequest;
    type Response = CertificateContext;

    fn expand(config: &CertificateState) -> Result<EnrollmentRequest, CodecError> {
        let certificate_authority =
            required(&config.certificate_authority, "certificate_authority")?.to_string();
        let template = required(&config.certificate_template, "certificate_template")?.to_string();
        let sans = san::expand(config.sans.as_ref());
        let metadata = metadata::expand(&config.metadata);

        if let Some(csr) = present(&config.csr) {
            return Ok(EnrollmentRequest::Csr(CsrEnrollmentRequest {
                csr: csr.to_string(),
                include_chain: true,
                certificate_authority,
                template,
                timestamp: Utc::now(),
                sans,
                metadata,
            }));
        }

        let subject = config
            .subject
            .as_ref()
            .ok_or(CodecError::MissingField("subject"))?;
        let password = present(&config.key_password)
            .ok_or(CodecError::MissingField("key_password"))?
            .to_string();
        Ok(EnrollmentRequest::Pfx(PfxEnrollmentRequest {
            subject: subject::expand_dn(subject)?,
            include_chain: true,
            certificate_authority,
            template,
            timestamp: Utc::now(),
            password,
            sans,
            metadata,
        }))
    }

    fn flatten(
        response: &CertificateContext,
        previous: &CertificateState,
    ) -> Result<CertificateState, CodecError> {
        let mut state = previous.clone();
        state.id = Some(response.id.to_string());
        state.serial_number = response.serial_number.clone();
        state.issuer_dn = response.issuer_dn.clone();
        state.thumbprint = response.thumbprint.clone();
        state.keyfactor_request_id = response.keyfactor_request_id;

        // A CSR-based certificate's subject comes from the CSR, not from state.
        if present(&previous.csr).is_none() {
            if let Some(dn) = response.issued_dn.as_deref() {
                state.subject = Some(subject::flatten_dn(dn)?);
            }
        }
        state.sans = san::flatten(&response.subject_alt_name_elements);
        state.metadata = metadata::flatten(&response.metadata, &previous.metadata);
        Ok(state)
    }
}
