//! Portal configuration as handed over by the host process.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

use crate::error::{PortalError, Result};
use crate::key::KeyAlgorithm;
use crate::profile::{ClaimedRoles, Profile};

fn default_username_header() -> String {
    "X-Forwarded-User".to_string()
}

fn default_fullname_header() -> String {
    "X-Forwarded-Fullname".to_string()
}

fn default_roles_header() -> String {
    "X-Forwarded-Roles".to_string()
}

fn default_bootstrap_dir() -> PathBuf {
    PathBuf::from("/tmp/tls")
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

/// Names of the headers the upstream proxy sets for the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HeaderNames {
    #[serde(default = "default_username_header")]
    pub username_header: String,
    #[serde(default = "default_fullname_header")]
    pub fullname_header: String,
    #[serde(default = "default_roles_header")]
    pub roles_header: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            username_header: default_username_header(),
            fullname_header: default_fullname_header(),
            roles_header: default_roles_header(),
        }
    }
}

impl HeaderNames {
    /// Reads the caller's identity through `header`, a lookup by header name.
    ///
    /// Missing headers read as empty; the values are trusted verbatim.
    pub fn extract_identity<'a, F>(&self, header: F) -> Identity
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        Identity {
            username: header(&self.username_header).unwrap_or_default().to_string(),
            full_name: header(&self.fullname_header).unwrap_or_default().to_string(),
            roles: ClaimedRoles::parse(header(&self.roles_header).unwrap_or_default()),
        }
    }
}

/// The identity asserted by the upstream authentication proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub full_name: String,
    pub roles: ClaimedRoles,
}

/// Where the authority's key material comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthoritySource {
    /// Generate a fresh authority and export bootstrap material to `bootstrap_dir`.
    Generate {
        algorithm: KeyAlgorithm,
        bootstrap_dir: PathBuf,
    },
    /// Load the authority from PEM files.
    Load {
        private_key: PathBuf,
        certificate: PathBuf,
        algorithm: Option<KeyAlgorithm>,
    },
}

/// Top level portal configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PortalConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(flatten)]
    pub headers: HeaderNames,
    #[serde(default)]
    pub ca_private_file: Option<PathBuf>,
    #[serde(default)]
    pub ca_certificate_file: Option<PathBuf>,
    /// Algorithm of a generated authority, or the algorithm a loaded one
    /// must have.
    #[serde(default)]
    pub ca_key_algorithm: Option<KeyAlgorithm>,
    #[serde(default = "default_bootstrap_dir")]
    pub bootstrap_dir: PathBuf,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    /// Client configuration template, rendered outside this crate.
    #[serde(default)]
    pub template: String,
}

impl PortalConfig {
    /// Parses and validates a YAML configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: PortalConfig =
            serde_yaml::from_str(yaml).map_err(|e| PortalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks what must hold before the portal starts: authority paths are
    /// both set or both unset, and every profile has a usable duration.
    pub fn validate(&self) -> Result<()> {
        self.authority_source()?;

        for profile in &self.profiles {
            if profile.roles.is_empty() {
                warn!(profile = %profile.name, "Profile has no roles and can never be issued");
            }
            profile
                .max_session_duration()
                .map_err(|e| PortalError::Config(e.to_string()))?;
        }
        Ok(())
    }

    /// Resolves where the authority comes from.
    pub fn authority_source(&self) -> Result<AuthoritySource> {
        let non_empty = |path: &Option<PathBuf>| {
            path.as_ref()
                .filter(|p| !p.as_os_str().is_empty())
                .cloned()
        };
        match (
            non_empty(&self.ca_private_file),
            non_empty(&self.ca_certificate_file),
        ) {
            (None, None) => Ok(AuthoritySource::Generate {
                algorithm: self.ca_key_algorithm.unwrap_or_default(),
                bootstrap_dir: self.bootstrap_dir.clone(),
            }),
            (Some(private_key), Some(certificate)) => Ok(AuthoritySource::Load {
                private_key,
                certificate,
                algorithm: self.ca_key_algorithm,
            }),
            (None, Some(_)) => Err(PortalError::Config(
                "ca-private-file isn't set but ca-certificate-file is; both must be unset to auto-generate the CA"
                    .to_string(),
            )),
            (Some(_), None) => Err(PortalError::Config(
                "ca-certificate-file isn't set but ca-private-file is; both must be unset to auto-generate the CA"
                    .to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const CONFIG: &str = r#"
listen: 127.0.0.1:9000
username-header: X-User
roles-header: X-Roles
ca-key-algorithm: P384
profiles:
  - name: staff
    description: Staff network
    max-session: 8h
    roles: [staff, admin]
    routes:
      - route: 10.0.0.0
        netmask: 255.255.0.0
    rules:
      - dest: 10.0.1.10
        port: 443
        protocol: tcp
        action: ACCEPT
  - name: guest
    max-session: 30m
    roles: [guest]
"#;

    #[test]
    fn parses_yaml() {
        let config = PortalConfig::from_yaml_str(CONFIG).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.headers.username_header, "X-User");
        assert_eq!(config.headers.fullname_header, "X-Forwarded-Fullname");
        assert_eq!(config.ca_key_algorithm, Some(KeyAlgorithm::EcdsaP384));
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.profiles[0].rules[0].port, Some(443));
        assert_eq!(config.profiles[0].routes[0].netmask, "255.255.0.0");
        assert_eq!(
            config.authority_source().unwrap(),
            AuthoritySource::Generate {
                algorithm: KeyAlgorithm::EcdsaP384,
                bootstrap_dir: PathBuf::from("/tmp/tls"),
            }
        );
    }

    #[test]
    fn requires_both_authority_paths() {
        let yaml = format!("ca-certificate-file: /etc/ca/cert.pem\n{CONFIG}");
        assert!(matches!(
            PortalConfig::from_yaml_str(&yaml),
            Err(PortalError::Config(_))
        ));
        let yaml = format!("ca-private-file: /etc/ca/key.pem\n{CONFIG}");
        assert!(matches!(
            PortalConfig::from_yaml_str(&yaml),
            Err(PortalError::Config(_))
        ));
    }

    #[test]
    fn loads_when_both_paths_set() {
        let yaml = format!(
            "ca-private-file: /etc/ca/key.pem\nca-certificate-file: /etc/ca/cert.pem\n{CONFIG}"
        );
        let config = PortalConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(
            config.authority_source().unwrap(),
            AuthoritySource::Load {
                private_key: PathBuf::from("/etc/ca/key.pem"),
                certificate: PathBuf::from("/etc/ca/cert.pem"),
                algorithm: Some(KeyAlgorithm::EcdsaP384),
            }
        );
    }

    #[test]
    fn rejects_bad_duration_at_startup() {
        let yaml = CONFIG.replace("max-session: 30m", "max-session: soon");
        assert!(matches!(
            PortalConfig::from_yaml_str(&yaml),
            Err(PortalError::Config(_))
        ));
    }

    #[test]
    fn rejects_sub_second_session_at_startup() {
        let yaml = CONFIG.replace("max-session: 30m", "max-session: 500ms");
        assert!(matches!(
            PortalConfig::from_yaml_str(&yaml),
            Err(PortalError::Config(_))
        ));
    }

    #[test]
    fn rejects_unknown_key_algorithm() {
        let yaml = CONFIG.replace("P384", "P192");
        assert!(matches!(
            PortalConfig::from_yaml_str(&yaml),
            Err(PortalError::Config(_))
        ));
    }

    #[test]
    fn extracts_identity_from_headers() {
        let headers: HashMap<&str, &str> = [
            ("X-Forwarded-User", "alice"),
            ("X-Forwarded-Fullname", "Alice Example"),
            ("X-Forwarded-Roles", "staff, vpn"),
        ]
        .into_iter()
        .collect();
        let identity = HeaderNames::default().extract_identity(|name| headers.get(name).copied());
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.full_name, "Alice Example");
        assert!(identity.roles.contains("staff"));
        assert!(identity.roles.contains("vpn"));

        let anonymous = HeaderNames::default().extract_identity(|_| None);
        assert!(anonymous.roles.is_empty());
    }
}
