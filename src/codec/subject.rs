//! Certificate subject <-> distinguished name string.

use crate::codec::{present, CodecError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_organizational_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_country: Option<String>,
}

impl Subject {
    /// Fields in the order they are written to the DN.
    fn segments(&self) -> [(&'static str, &Option<String>); 6] {
        [
            ("CN", &self.subject_common_name),
            ("OU", &self.subject_organizational_unit),
            ("O", &self.subject_organization),
            ("L", &self.subject_locality),
            ("ST", &self.subject_state),
            ("C", &self.subject_country),
        ]
    }

    fn slot(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            "CN" => Some(&mut self.subject_common_name),
            "OU" => Some(&mut self.subject_organizational_unit),
            "O" => Some(&mut self.subject_organization),
            "L" => Some(&mut self.subject_locality),
            "ST" => Some(&mut self.subject_state),
            "C" => Some(&mut self.subject_country),
            _ => None,
        }
    }
}

/// RFC 4514 characters that must be backslash-escaped inside a value.
const SPECIAL: &[char] = &[',', '+', '"', '\\', '<', '>', ';', '='];

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Strips escapes and surrounding quotes from a raw attribute value.
fn unescape_value(raw: &str) -> String {
    let mut value = String::with_capacity(raw.len());
    let mut escaped = false;
    for c in raw.trim().chars() {
        match c {
            _ if escaped => {
                value.push(c);
                escaped = false;
            }
            '\\' => escaped = true,
            '"' => {}
            _ => value.push(c),
        }
    }
    value
}

/// Splits on commas that are neither escaped nor inside a quoted value.
fn split_segments(dn: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut quoted = false;
    for (i, c) in dn.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => quoted = !quoted,
            ',' if !quoted => {
                segments.push(&dn[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&dn[start..]);
    segments
}

/// Builds `CN=..,OU=..,O=..,L=..,ST=..,C=..` from the configured fields,
/// escaping special characters in values.
pub fn expand_dn(subject: &Subject) -> Result<String, CodecError> {
    let segments: Vec<String> = subject
        .segments()
        .iter()
        .filter_map(|(key, value)| {
            present(value).map(|v| format!("{}={}", key, escape_value(v)))
        })
        .collect();
    if segments.is_empty() {
        return Err(CodecError::MissingField("subject"));
    }
    Ok(segments.join(","))
}

/// Parses a comma-joined DN back into a `Subject`. Escaped (`\,`) and
/// quoted commas belong to the value. Attributes other than CN/OU/O/L/ST/C
/// are dropped.
pub fn flatten_dn(dn: &str) -> Result<Subject, CodecError> {
    let mut subject = Subject::default();
    for segment in split_segments(dn) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (key, value) = segment
            .split_once('=')
            .filter(|(key, _)| !key.trim().is_empty())
            .ok_or_else(|| CodecError::MalformedDn {
                dn: dn.to_string(),
                segment: segment.to_string(),
            })?;
        if let Some(slot) = subject.slot(&key.trim().to_ascii_uppercase()) {
            *slot = Some(unescape_value(value));
        }
    }
    Ok(subject)
}
