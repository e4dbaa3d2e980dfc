//! Provider configuration.
//!
//! Values come from explicit configuration first and fall back to the
//! `KEYFACTOR_*` environment variables. Resolution validates the required
//! fields before any API call is attempted.

use crate::keyfactor::KeyfactorError;
use serde::{Deserialize, Serialize};
use std::env;

pub const ENV_HOSTNAME: &str = "KEYFACTOR_HOSTNAME";
pub const ENV_USERNAME: &str = "KEYFACTOR_USERNAME";
pub const ENV_PASSWORD: &str = "KEYFACTOR_PASSWORD";
pub const ENV_APPKEY: &str = "KEYFACTOR_APPKEY";
pub const ENV_DOMAIN: &str = "KEYFACTOR_DOMAIN";
pub const ENV_DEV_MODE: &str = "KEYFACTOR_DEV_MODE";

/// Path prefix of the Keyfactor Command REST API on the host.
pub const API_PATH: &str = "/KeyfactorAPI";

/// Provider settings as supplied by the host. Every field is optional here;
/// `resolve` decides what is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub hostname: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub appkey: Option<String>,
    pub domain: Option<String>,
    pub dev_mode: Option<bool>,
}

/// Validated connection settings used to build the HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    /// e.g. `https://keyfactor.example.com/KeyfactorAPI`
    pub base_url: String,
    /// Basic-auth user, `DOMAIN\user` when a domain is known.
    pub username: String,
    pub password: String,
    pub appkey: Option<String>,
    pub dev_mode: bool,
}

impl ProviderConfig {
    /// Reads every recognized `KEYFACTOR_*` variable.
    pub fn from_env() -> Self {
        Self {
            hostname: read_env(ENV_HOSTNAME),
            username: read_env(ENV_USERNAME),
            password: read_env(ENV_PASSWORD),
            appkey: read_env(ENV_APPKEY),
            domain: read_env(ENV_DOMAIN),
            dev_mode: read_env(ENV_DEV_MODE).map(|v| parse_flag(&v)),
        }
    }

    /// Fills every unset field from `fallback`. Explicit values win.
    pub fn merge(self, fallback: ProviderConfig) -> Self {
        Self {
            hostname: non_empty(self.hostname).or(fallback.hostname),
            username: non_empty(self.username).or(fallback.username),
            password: non_empty(self.password).or(fallback.password),
            appkey: non_empty(self.appkey).or(fallback.appkey),
            domain: non_empty(self.domain).or(fallback.domain),
            dev_mode: self.dev_mode.or(fallback.dev_mode),
        }
    }

    /// Validates the configuration and derives the connection settings.
    pub fn resolve(&self) -> Result<ConnectionSettings, KeyfactorError> {
        let hostname = non_empty(self.hostname.clone());
        let username = non_empty(self.username.clone());
        let password = non_empty(self.password.clone());

        let mut missing = Vec::new();
        if hostname.is_none() {
            missing.push("hostname");
        }
        if username.is_none() {
            missing.push("username");
        }
        if password.is_none() {
            missing.push("password");
        }
        let (Some(hostname), Some(username), Some(password)) = (hostname, username, password)
        else {
            return Err(KeyfactorError::Config(format!(
                "missing required provider configuration: {}",
                missing.join(", ")
            )));
        };

        Ok(ConnectionSettings {
            base_url: base_url(&hostname),
            username: qualified_username(&username, self.domain.as_deref()),
            password,
            appkey: non_empty(self.appkey.clone()),
            dev_mode: self.dev_mode.unwrap_or(false),
        })
    }
}

fn read_env(name: &str) -> Option<String> {
    non_empty(env::var(name).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Strips trailing slashes, defaults the scheme to https and appends the
/// API path unless the hostname already carries it.
fn base_url(hostname: &str) -> String {
    let host = hostname.trim().trim_end_matches('/');
    let host = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };
    if host.to_ascii_lowercase().ends_with(&API_PATH.to_ascii_lowercase()) {
        host
    } else {
        format!("{}{}", host, API_PATH)
    }
}

fn qualified_username(username: &str, domain: Option<&str>) -> String {
    let (embedded_domain, user) = match username.split_once('\\') {
        Some((domain, user)) => (Some(domain), user),
        None => (None, username),
    };
    let domain = domain
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .or(embedded_domain);
    match domain {
        Some(domain) => format!("{}\\{}", domain, user),
        None => user.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn explicit() -> ProviderConfig {
        ProviderConfig {
            hostname: Some("keyfactor.example.com/".to_string()),
            username: Some("svc-terraform".to_string()),
            password: Some("hunter2".to_string()),
            appkey: None,
            domain: Some("CORP".to_string()),
            dev_mode: None,
        }
    }

    fn clear_env() {
        for name in [
            ENV_HOSTNAME,
            ENV_USERNAME,
            ENV_PASSWORD,
            ENV_APPKEY,
            ENV_DOMAIN,
            ENV_DEV_MODE,
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn resolve_strips_trailing_slashes_and_adds_api_path() {
        let settings = explicit().resolve().unwrap();
        assert_eq!(settings.base_url, "https://keyfactor.example.com/KeyfactorAPI");
        assert_eq!(settings.username, "CORP\\svc-terraform");
        assert!(!settings.dev_mode);
    }

    #[test]
    fn resolve_keeps_explicit_scheme_and_api_path() {
        let mut config = explicit();
        config.hostname = Some("http://localhost:8080/KeyfactorAPI//".to_string());
        let settings = config.resolve().unwrap();
        assert_eq!(settings.base_url, "http://localhost:8080/KeyfactorAPI");
    }

    #[test]
    fn resolve_reports_every_missing_field() {
        let config = ProviderConfig {
            hostname: Some("   ".to_string()),
            ..Default::default()
        };
        let err = config.resolve().unwrap_err();
        assert!(matches!(err, KeyfactorError::Config(_)));
        let message = err.to_string();
        assert!(message.contains("hostname"));
        assert!(message.contains("username"));
        assert!(message.contains("password"));
    }

    #[test]
    fn domain_embedded_in_username_is_used_when_none_configured() {
        let mut config = explicit();
        config.domain = None;
        config.username = Some("LAB\\admin".to_string());
        assert_eq!(config.resolve().unwrap().username, "LAB\\admin");

        config.domain = Some("CORP".to_string());
        assert_eq!(config.resolve().unwrap().username, "CORP\\admin");
    }

    #[test]
    #[serial]
    fn explicit_values_win_over_environment() {
        clear_env();
        env::set_var(ENV_HOSTNAME, "env-host.example.com");
        env::set_var(ENV_USERNAME, "env-user");
        env::set_var(ENV_PASSWORD, "env-pass");
        env::set_var(ENV_APPKEY, "c2VjcmV0");
        env::set_var(ENV_DEV_MODE, "true");

        let config = ProviderConfig {
            hostname: Some("explicit.example.com".to_string()),
            ..Default::default()
        }
        .merge(ProviderConfig::from_env());

        assert_eq!(config.hostname.as_deref(), Some("explicit.example.com"));
        assert_eq!(config.username.as_deref(), Some("env-user"));
        assert_eq!(config.appkey.as_deref(), Some("c2VjcmV0"));
        assert_eq!(config.dev_mode, Some(true));
        clear_env();
    }

    #[test]
    #[serial]
    fn empty_environment_yields_config_error() {
        clear_env();
        let err = ProviderConfig::from_env().resolve().unwrap_err();
        assert!(matches!(err, KeyfactorError::Config(_)));
    }
}
