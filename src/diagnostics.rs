//! Diagnostics reported back to the host for one lifecycle call.
//!
//! Errors fail the call; warnings let it succeed for the parts that worked.

use crate::keyfactor::KeyfactorError;
use serde::Serialize;
use std::fmt;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
        };
        write!(f, "{}: {}: {}", level, self.summary, self.detail)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, summary: &str, detail: impl fmt::Display) {
        let detail = detail.to_string();
        error!("{}: {}", summary, detail);
        self.0.push(Diagnostic {
            severity: Severity::Error,
            summary: summary.to_string(),
            detail,
        });
    }

    pub fn warning(&mut self, summary: &str, detail: impl fmt::Display) {
        let detail = detail.to_string();
        warn!("{}: {}", summary, detail);
        self.0.push(Diagnostic {
            severity: Severity::Warning,
            summary: summary.to_string(),
            detail,
        });
    }

    /// Records a remote failure with the API's own message as the detail.
    pub fn api_error(&mut self, summary: &str, err: &KeyfactorError) {
        self.error(summary, err);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_do_not_count_as_errors() {
        let mut diags = Diagnostics::new();
        diags.warning("Partial deployment", "store B did not accept the job");
        assert!(!diags.has_errors());
        diags.api_error(
            "Unable to read certificate",
            &KeyfactorError::Api("Certificate is revoked".into()),
        );
        assert!(diags.has_errors());
        assert_eq!(diags.len(), 2);
        assert_eq!(
            diags.errors().next().unwrap().detail,
            "Keyfactor API error: Certificate is revoked"
        );
    }

    #[test]
    fn serializes_as_a_plain_list() {
        let mut diags = Diagnostics::new();
        diags.warning("w", "d");
        let json = serde_json::to_value(&diags).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "severity": "warning", "summary": "w", "detail": "d" }])
        );
    }
}
