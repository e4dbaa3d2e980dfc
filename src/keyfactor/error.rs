use crate::codec::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum KeyfactorError {
    #[error("Provider configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Network(String),

    #[error("Keyfactor API error: {0}")]
    Api(String),

    #[error("HTTP status {0}: {1}")]
    HttpStatus(u16, String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Schema mismatch: {0}")]
    Codec(#[from] CodecError),

    #[error("Error from reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Certificate material error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl KeyfactorError {
    /// True when the remote object addressed by the request no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeyfactorError::NotFound(_))
    }
}
