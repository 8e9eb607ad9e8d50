//! The issuance workflow: authorize, issue, record, return.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::authority::{CertificateAuthority, IssuedCredential};
use crate::cert::Certificate;
use crate::config::{AuthoritySource, Identity, PortalConfig};
use crate::error::{PortalError, Result};
use crate::profile::{ClaimedRoles, ProfileCatalog};
use crate::session::{SessionRecord, SessionRegistry};

/// Everything a caller needs to render a client configuration download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedBundle {
    pub credential: IssuedCredential,
    pub profile_name: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub duration: Duration,
}

impl IssuedBundle {
    /// `<profile>-<expiry unix seconds>.ovpn`
    pub fn download_filename(&self) -> String {
        format!(
            "{}-{}.ovpn",
            self.profile_name,
            self.expires_at.unix_timestamp()
        )
    }
}

/// Owns the authority, the profile catalog and the session registry.
///
/// Safe to share across request handlers; `issue` takes `&self`.
#[derive(Debug)]
pub struct IssuanceService {
    authority: Arc<CertificateAuthority>,
    catalog: ProfileCatalog,
    sessions: SessionRegistry,
}

impl IssuanceService {
    pub fn new(authority: Arc<CertificateAuthority>, catalog: ProfileCatalog) -> Self {
        Self {
            authority,
            catalog,
            sessions: SessionRegistry::new(),
        }
    }

    /// Startup sequence: validate `config`, then load the configured
    /// authority or generate one and export its bootstrap material.
    pub fn from_config(config: &PortalConfig) -> Result<Self> {
        config.validate()?;
        let authority = match config.authority_source()? {
            AuthoritySource::Generate {
                algorithm,
                bootstrap_dir,
            } => {
                warn!(
                    dir = %bootstrap_dir.display(),
                    "No certificate authority configured, generating one"
                );
                let authority = CertificateAuthority::generate(algorithm)?;
                authority.export_bootstrap_material(&bootstrap_dir)?;
                authority
            }
            AuthoritySource::Load {
                private_key,
                certificate,
                algorithm,
            } => {
                let mut authority = CertificateAuthority::uninitialized();
                match algorithm {
                    Some(expected) => {
                        authority.load_from_files_as(&private_key, &certificate, expected)?
                    }
                    None => authority.load_from_files(&private_key, &certificate)?,
                }
                authority
            }
        };
        let catalog = ProfileCatalog::new(config.profiles.iter().cloned());
        Ok(Self::new(Arc::new(authority), catalog))
    }

    pub fn authority(&self) -> &Arc<CertificateAuthority> {
        &self.authority
    }

    pub fn catalog(&self) -> &ProfileCatalog {
        &self.catalog
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Issues a certificate for `profile_name` if `claimed` grants it, and
    /// records the session.
    ///
    /// Nothing is recorded when any step fails.
    pub fn issue(
        &self,
        claimed: &ClaimedRoles,
        profile_name: &str,
        client_address: &str,
        subject_user: &str,
    ) -> Result<IssuedBundle> {
        let profile = self.catalog.check_authorized(profile_name, claimed)?;
        let duration = profile.max_session_duration()?;

        let issued_at = now_in_whole_seconds()?;
        let expires_at = i64::try_from(duration.as_secs())
            .ok()
            .map(time::Duration::seconds)
            .and_then(|d| issued_at.checked_add(d))
            .ok_or_else(|| {
                PortalError::InvalidDuration(format!(
                    "profile {profile_name}: session of {duration:?} overflows"
                ))
            })?;

        let credential = self
            .authority
            .issue_certificate(issued_at, expires_at, &profile.name)?;
        let serial_number = Certificate::from_pem(&credential.certificate_pem)
            .map_err(|e| PortalError::Issuance(e.to_string()))?
            .serial_hex();

        self.sessions.record(SessionRecord {
            issued_at,
            expires_at,
            subject_user: subject_user.to_string(),
            profile_name: profile.name.clone(),
            client_address: client_address.to_string(),
            duration,
            serial_number: serial_number.clone(),
            certificate_pem: credential.certificate_pem.clone(),
            issuing_ca_pem: credential.issuing_ca_pem.clone(),
            private_key_pem: credential.private_key_pem.clone(),
        });
        info!(
            profile = %profile.name,
            user = subject_user,
            client = client_address,
            serial = %serial_number,
            expires = %expires_at,
            "Issued session certificate"
        );

        Ok(IssuedBundle {
            credential,
            profile_name: profile.name.clone(),
            issued_at,
            expires_at,
            duration,
        })
    }

    /// [`Self::issue`] for an identity read from the proxy headers.
    pub fn issue_for(
        &self,
        identity: &Identity,
        profile_name: &str,
        client_address: &str,
    ) -> Result<IssuedBundle> {
        self.issue(&identity.roles, profile_name, client_address, &identity.username)
    }
}

fn now_in_whole_seconds() -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(OffsetDateTime::now_utc().unix_timestamp())
        .map_err(|e| PortalError::InvalidDuration(e.to_string()))
}
