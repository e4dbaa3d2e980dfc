//! Certificate material returned by enrollment and download.

use crate::keyfactor::KeyfactorError;
use base64::{engine::general_purpose::STANDARD, Engine};
use openssl::pkcs12::Pkcs12;
use openssl::x509::{X509Ref, X509};

/// PEM-encoded leaf, chain and (when known) private key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CertificateMaterial {
    pub certificate_pem: String,
    pub chain_pem: String,
    pub private_key_pem: Option<String>,
}

fn to_pem(cert: &X509Ref) -> Result<String, KeyfactorError> {
    Ok(String::from_utf8_lossy(&cert.to_pem()?).into_owned())
}

fn decode(content_b64: &str) -> Result<Vec<u8>, KeyfactorError> {
    let compact: String = content_b64.split_whitespace().collect();
    Ok(STANDARD.decode(compact)?)
}

/// Splits an end-entity-first PEM bundle into leaf and chain.
pub fn split_pem_bundle(bundle: &str) -> Result<CertificateMaterial, KeyfactorError> {
    let certs = X509::stack_from_pem(bundle.as_bytes())?;
    let mut certs = certs.iter();
    let leaf = certs
        .next()
        .ok_or_else(|| KeyfactorError::ParseError("no certificate in PEM bundle".to_string()))?;
    let chain = certs.map(|c| to_pem(c)).collect::<Result<Vec<_>, _>>()?;
    Ok(CertificateMaterial {
        certificate_pem: to_pem(leaf)?,
        chain_pem: chain.concat(),
        private_key_pem: None,
    })
}

/// Decodes the base64 `Content` of a certificate download.
pub fn decode_download(content_b64: &str) -> Result<CertificateMaterial, KeyfactorError> {
    let bytes = decode(content_b64)?;
    split_pem_bundle(&String::from_utf8_lossy(&bytes))
}

/// Opens a base64 PKCS#12 blob from PFX enrollment.
pub fn unpack_pkcs12(blob_b64: &str, password: &str) -> Result<CertificateMaterial, KeyfactorError> {
    let der = decode(blob_b64)?;
    let parsed = Pkcs12::from_der(&der)?.parse2(password)?;

    let leaf = parsed
        .cert
        .ok_or_else(|| KeyfactorError::ParseError("PKCS#12 holds no certificate".to_string()))?;
    let chain = match parsed.ca {
        Some(stack) => stack.iter().map(|c| to_pem(c)).collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    let private_key_pem = match parsed.pkey {
        Some(key) => Some(String::from_utf8_lossy(&key.private_key_to_pem_pkcs8()?).into_owned()),
        None => None,
    };

    Ok(CertificateMaterial {
        certificate_pem: to_pem(&leaf)?,
        chain_pem: chain.concat(),
        private_key_pem,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyfactor::fake::self_signed;

    #[test]
    fn split_bundle_separates_leaf_from_chain() {
        let (leaf, _) = self_signed("CN=leaf.example.com");
        let (issuer, _) = self_signed("CN=Issuing CA");
        let bundle = format!("{}{}", to_pem(&leaf).unwrap(), to_pem(&issuer).unwrap());

        let material = split_pem_bundle(&bundle).unwrap();
        assert_eq!(material.certificate_pem, to_pem(&leaf).unwrap());
        assert_eq!(material.chain_pem, to_pem(&issuer).unwrap());
        assert!(material.private_key_pem.is_none());
    }

    #[test]
    fn download_content_is_base64_pem() {
        let (leaf, _) = self_signed("CN=only.example.com");
        let encoded = STANDARD.encode(leaf.to_pem().unwrap());
        let material = decode_download(&encoded).unwrap();
        assert!(material.certificate_pem.contains("BEGIN CERTIFICATE"));
        assert!(material.chain_pem.is_empty());
    }

    #[test]
    fn pkcs12_yields_private_key() {
        let (cert, key) = self_signed("CN=pfx.example.com");
        let pkcs12 = Pkcs12::builder()
            .name("test")
            .pkey(&key)
            .cert(&cert)
            .build2("s3cret")
            .unwrap();
        let blob = STANDARD.encode(pkcs12.to_der().unwrap());

        let material = unpack_pkcs12(&blob, "s3cret").unwrap();
        assert!(material.certificate_pem.contains("BEGIN CERTIFICATE"));
        assert!(material
            .private_key_pem
            .unwrap()
            .contains("BEGIN PRIVATE KEY"));

        assert!(unpack_pkcs12(&blob, "wrong").is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_download("!!!not base64!!!").is_err());
        assert!(split_pem_bundle("no pem here").is_err());
    }
}
