//! Subject alternative names.
//!
//! Keyfactor reports SANs as `(type code, value)` pairs. Only DNS, IPv4 and
//! URI entries are managed; a bucket the server returned nothing for is
//! left out entirely so it never shows up as an empty list in state.

use crate::keyfactor::models::{EnrollmentSans, SubjectAltNameElement};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use tracing::debug;

/// Keyfactor's SAN type taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanType {
    OtherName,
    Rfc822Name,
    DnsName,
    X400Address,
    DirectoryName,
    EdiPartyName,
    Uri,
    IpAddress,
    RegisteredId,
    MsNtPrincipalName,
    MsNtdsReplication,
}

impl SanType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(SanType::OtherName),
            1 => Some(SanType::Rfc822Name),
            2 => Some(SanType::DnsName),
            3 => Some(SanType::X400Address),
            4 => Some(SanType::DirectoryName),
            5 => Some(SanType::EdiPartyName),
            6 => Some(SanType::Uri),
            7 => Some(SanType::IpAddress),
            8 => Some(SanType::RegisteredId),
            100 => Some(SanType::MsNtPrincipalName),
            101 => Some(SanType::MsNtdsReplication),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            SanType::OtherName => 0,
            SanType::Rfc822Name => 1,
            SanType::DnsName => 2,
            SanType::X400Address => 3,
            SanType::DirectoryName => 4,
            SanType::EdiPartyName => 5,
            SanType::Uri => 6,
            SanType::IpAddress => 7,
            SanType::RegisteredId => 8,
            SanType::MsNtPrincipalName => 100,
            SanType::MsNtdsReplication => 101,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAltNames {
    #[serde(rename = "san_dns", default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Vec<String>>,
    #[serde(rename = "san_ip4", default, skip_serializing_if = "Option::is_none")]
    pub ip4: Option<Vec<String>>,
    #[serde(rename = "san_uri", default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<Vec<String>>,
}

fn configured(bucket: &Option<Vec<String>>) -> Vec<String> {
    bucket
        .iter()
        .flatten()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn non_empty(bucket: Vec<String>) -> Option<Vec<String>> {
    if bucket.is_empty() {
        None
    } else {
        Some(bucket)
    }
}

/// Packs the configured SANs into the enrollment shape; `None` when nothing
/// is configured so the request omits the block.
pub fn expand(sans: Option<&SubjectAltNames>) -> Option<EnrollmentSans> {
    let sans = sans?;
    let packed = EnrollmentSans {
        dns: configured(&sans.dns),
        ip4: configured(&sans.ip4),
        uri: configured(&sans.uri),
    };
    if packed.is_empty() {
        None
    } else {
        Some(packed)
    }
}

/// Classifies reported SANs into DNS / IPv4 / URI buckets.
pub fn flatten(elements: &[SubjectAltNameElement]) -> Option<SubjectAltNames> {
    let mut dns = Vec::new();
    let mut ip4 = Vec::new();
    let mut uri = Vec::new();

    for element in elements {
        match SanType::from_code(element.type_code) {
            Some(SanType::DnsName) => dns.push(element.value.clone()),
            Some(SanType::Uri) => uri.push(element.value.clone()),
            Some(SanType::IpAddress) if element.value.parse::<Ipv4Addr>().is_ok() => {
                ip4.push(element.value.clone())
            }
            other => debug!(
                "Ignoring SAN {:?} of type {} ({:?})",
                element.value, element.type_code, other
            ),
        }
    }

    let sans = SubjectAltNames {
        dns: non_empty(dns),
        ip4: non_empty(ip4),
        uri: non_empty(uri),
    };
    if sans == SubjectAltNames::default() {
        None
    } else {
        Some(sans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(type_code: i32, value: &str) -> SubjectAltNameElement {
        SubjectAltNameElement {
            id: None,
            value: value.to_string(),
            type_code,
        }
    }

    #[test]
    fn taxonomy_codes_round_trip() {
        for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 100, 101] {
            assert_eq!(SanType::from_code(code).unwrap().code(), code);
        }
        assert_eq!(SanType::from_code(9), None);
    }

    #[test]
    fn flatten_classifies_into_buckets() {
        let sans = flatten(&[
            element(2, "a.example.com"),
            element(7, "10.0.0.1"),
            element(6, "https://a.example.com"),
            element(2, "b.example.com"),
            element(1, "ops@example.com"),
            element(100, "svc@corp.example.com"),
        ])
        .unwrap();
        assert_eq!(
            sans.dns,
            Some(vec!["a.example.com".to_string(), "b.example.com".to_string()])
        );
        assert_eq!(sans.ip4, Some(vec!["10.0.0.1".to_string()]));
        assert_eq!(sans.uri, Some(vec!["https://a.example.com".to_string()]));
    }

    #[test]
    fn empty_buckets_are_never_serialized() {
        let sans = flatten(&[element(7, "192.168.1.10")]).unwrap();
        let json = serde_json::to_value(&sans).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("san_dns"));
        assert!(!object.contains_key("san_uri"));
        assert_eq!(object["san_ip4"], serde_json::json!(["192.168.1.10"]));
    }

    #[test]
    fn ipv6_addresses_are_not_ipv4() {
        assert_eq!(flatten(&[element(7, "2001:db8::1")]), None);
    }

    #[test]
    fn nothing_reported_means_no_sans() {
        assert_eq!(flatten(&[]), None);
        assert_eq!(flatten(&[element(1, "ops@example.com")]), None);
    }

    #[test]
    fn expand_omits_empty_buckets_and_blank_values() {
        let sans = SubjectAltNames {
            dns: Some(vec!["a.example.com".into(), "  ".into()]),
            ip4: Some(vec![]),
            uri: None,
        };
        let packed = expand(Some(&sans)).unwrap();
        let json = serde_json::to_value(&packed).unwrap();
        assert_eq!(json, serde_json::json!({ "dns": ["a.example.com"] }));

        assert_eq!(expand(Some(&SubjectAltNames::default())), None);
        assert_eq!(expand(None), None);
    }
}
