//! Certificate authority holding the portal's signing key.
//!
//! An authority starts [`CertificateAuthority::uninitialized`] and becomes
//! ready through exactly one of [`CertificateAuthority::initialize_fresh`] or
//! [`CertificateAuthority::load_from_files`]. Once ready its key material is
//! never replaced, so a ready authority can be shared behind an `Arc` by every
//! request without locking.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::cert::Certificate;
use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::cert::params::{CertificationRequestInfo, DistinguishedName, Validity};
use crate::error::{PortalError, Result};
use crate::issuer::{Issuer, SelfIssuer};
use crate::key::{KeyAlgorithm, KeyPair};

/// Lifetime of generated authority and bootstrap certificates.
const AUTHORITY_VALIDITY_DAYS: i64 = 3650;

/// Common name of a freshly generated authority.
pub const DEFAULT_AUTHORITY_NAME: &str = "VPN Portal CA";

/// Common name of the bootstrap server certificate.
pub const BOOTSTRAP_SERVER_NAME: &str = "openvpn-server";

/// PEM material handed out for one issued certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    pub private_key_pem: String,
    pub certificate_pem: String,
    pub issuing_ca_pem: String,
}

impl fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("certificate_pem", &self.certificate_pem)
            .field("issuing_ca_pem", &self.issuing_ca_pem)
            .field("private_key_pem", &"[REDACTED]")
            .finish()
    }
}

/// Signing key and certificate of a ready authority.
struct AuthorityMaterial {
    key: KeyPair,
    cert: Certificate,
    cert_pem: String,
}

impl Issuer for AuthorityMaterial {
    fn issuer_name(&self) -> DistinguishedName {
        self.cert.subject()
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }
}

/// The certificate authority that signs every client certificate.
pub struct CertificateAuthority {
    material: Option<AuthorityMaterial>,
    leaf_algorithm: KeyAlgorithm,
}

impl Default for CertificateAuthority {
    fn default() -> Self {
        Self::uninitialized()
    }
}

impl CertificateAuthority {
    /// An authority without key material. Issuing from it fails.
    pub fn uninitialized() -> Self {
        Self {
            material: None,
            leaf_algorithm: KeyAlgorithm::default(),
        }
    }

    /// Generates a fresh self-signed authority.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        let mut ca = Self::uninitialized();
        ca.initialize_fresh(algorithm)?;
        Ok(ca)
    }

    /// Loads an authority from PEM files.
    pub fn load(private_key_path: impl AsRef<Path>, certificate_path: impl AsRef<Path>) -> Result<Self> {
        let mut ca = Self::uninitialized();
        ca.load_from_files(private_key_path, certificate_path)?;
        Ok(ca)
    }

    /// Sets the algorithm used for leaf keys (P-256 unless changed).
    pub fn with_leaf_algorithm(mut self, algorithm: KeyAlgorithm) -> Self {
        self.leaf_algorithm = algorithm;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.material.is_some()
    }

    /// Algorithm of the signing key, if the authority is ready.
    pub fn key_algorithm(&self) -> Option<KeyAlgorithm> {
        self.material.as_ref().map(|m| m.key.algorithm())
    }

    pub fn leaf_algorithm(&self) -> KeyAlgorithm {
        self.leaf_algorithm
    }

    /// The authority certificate, if the authority is ready.
    pub fn certificate(&self) -> Option<&Certificate> {
        self.material.as_ref().map(|m| &m.cert)
    }

    /// Generates a key pair and a self-signed CA certificate valid for ten
    /// years, and adopts them.
    pub fn initialize_fresh(&mut self, algorithm: KeyAlgorithm) -> Result<()> {
        if self.is_ready() {
            return Err(PortalError::AlreadyInitialized);
        }
        info!(%algorithm, "Generating certificate authority");

        let key = KeyPair::generate(algorithm)?;
        let subject = DistinguishedName::builder()
            .common_name(DEFAULT_AUTHORITY_NAME.to_string())
            .organization("VPN Portal".to_string())
            .build();
        let cert_info = CertificationRequestInfo::builder()
            .subject(subject.clone())
            .subject_public_key(key.public_key_info()?)
            .usages(vec![
                ExtendedKeyUsageOption::ClientAuth,
                ExtendedKeyUsageOption::ServerAuth,
            ])
            .is_ca(true)
            .build();
        let validity = Validity::for_days(AUTHORITY_VALIDITY_DAYS)
            .map_err(|e| PortalError::KeyGeneration(e.to_string()))?;

        let cert = SelfIssuer {
            name: subject,
            key: &key,
        }
        .issue(&cert_info, validity)
        .map_err(|e| PortalError::KeyGeneration(e.to_string()))?;

        self.adopt(key, cert)
            .map_err(|e| PortalError::KeyGeneration(e.to_string()))?;
        debug!("Certificate authority generated");
        Ok(())
    }

    /// Reads a PEM private key and certificate and adopts them.
    ///
    /// The key encoding is taken from its PEM label (see [`KeyPair::from_pem`]).
    /// The certificate must carry the public half of the loaded key.
    pub fn load_from_files(
        &mut self,
        private_key_path: impl AsRef<Path>,
        certificate_path: impl AsRef<Path>,
    ) -> Result<()> {
        if self.is_ready() {
            return Err(PortalError::AlreadyInitialized);
        }
        let private_key_path = private_key_path.as_ref();
        let certificate_path = certificate_path.as_ref();
        info!(
            key = %private_key_path.display(),
            cert = %certificate_path.display(),
            "Loading certificate authority"
        );

        let cert_pem = fs::read_to_string(certificate_path).map_err(|e| {
            PortalError::KeyLoad(format!("{}: {e}", certificate_path.display()))
        })?;
        let cert = Certificate::from_pem(&cert_pem)
            .map_err(|e| PortalError::KeyLoad(format!("{}: {e}", certificate_path.display())))?;

        let key_pem = fs::read_to_string(private_key_path).map_err(|e| {
            PortalError::KeyLoad(format!("{}: {e}", private_key_path.display()))
        })?;
        let key = KeyPair::from_pem(&key_pem)?;

        if key.public_key_info()?.subject_public_key != cert.public_key_info().subject_public_key {
            return Err(PortalError::KeyLoad(format!(
                "{} does not hold the key certified by {}",
                private_key_path.display(),
                certificate_path.display()
            )));
        }
        if cert.subject() != cert.issuer() {
            warn!("Loaded authority certificate is not self-signed");
        }

        self.adopt(key, cert)?;
        debug!("Certificate authority loaded");
        Ok(())
    }

    /// Like [`Self::load_from_files`], but also requires the key to be of
    /// `expected` algorithm.
    pub fn load_from_files_as(
        &mut self,
        private_key_path: impl AsRef<Path>,
        certificate_path: impl AsRef<Path>,
        expected: KeyAlgorithm,
    ) -> Result<()> {
        if self.is_ready() {
            return Err(PortalError::AlreadyInitialized);
        }
        let mut loaded = Self::uninitialized();
        loaded.load_from_files(private_key_path, certificate_path)?;
        match loaded.key_algorithm() {
            Some(found) if found != expected => Err(PortalError::KeyLoad(format!(
                "authority key is {found}, configuration expects {expected}"
            ))),
            _ => {
                self.material = loaded.material;
                Ok(())
            }
        }
    }

    fn adopt(&mut self, key: KeyPair, cert: Certificate) -> Result<()> {
        let cert_pem = cert.to_pem()?;
        self.material = Some(AuthorityMaterial {
            key,
            cert,
            cert_pem,
        });
        Ok(())
    }

    fn material(&self) -> Result<&AuthorityMaterial> {
        self.material
            .as_ref()
            .ok_or_else(|| PortalError::Issuance("certificate authority is not initialized".to_string()))
    }

    /// Issues a client certificate for `subject_common_name`, valid from
    /// `not_before` to `not_after`, on a freshly generated key.
    pub fn issue_certificate(
        &self,
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
        subject_common_name: &str,
    ) -> Result<IssuedCredential> {
        let material = self.material()?;
        let validity = Validity::new(not_before, not_after)?;
        let (key, cert) = self.issue_leaf(
            material,
            subject_common_name,
            vec![ExtendedKeyUsageOption::ClientAuth],
            validity,
        )?;

        debug!(
            subject = subject_common_name,
            serial = %cert.serial_hex(),
            "Issued client certificate"
        );

        Ok(IssuedCredential {
            private_key_pem: key
                .to_pem()
                .map_err(|e| PortalError::Issuance(e.to_string()))?,
            certificate_pem: cert
                .to_pem()
                .map_err(|e| PortalError::Issuance(e.to_string()))?,
            issuing_ca_pem: material.cert_pem.clone(),
        })
    }

    fn issue_leaf(
        &self,
        material: &AuthorityMaterial,
        common_name: &str,
        usages: Vec<ExtendedKeyUsageOption>,
        validity: Validity,
    ) -> Result<(KeyPair, Certificate)> {
        let key = KeyPair::generate(self.leaf_algorithm)
            .map_err(|e| PortalError::Issuance(e.to_string()))?;
        let cert_info = CertificationRequestInfo::builder()
            .subject(DistinguishedName::common_name(common_name))
            .subject_public_key(key.public_key_info()?)
            .usages(usages)
            .build();
        let cert = material
            .issue(&cert_info, validity)
            .map_err(|e| match e {
                PortalError::InvalidDuration(_) => e,
                other => PortalError::Issuance(other.to_string()),
            })?;
        Ok((key, cert))
    }

    /// Writes the authority and a bootstrap server identity below `path`:
    /// `ca/key.pem`, `ca/cert.pem`, `openvpn/key.pem` and `openvpn/cert.pem`.
    ///
    /// Files already written stay in place when a later write fails.
    pub fn export_bootstrap_material(&self, path: impl AsRef<Path>) -> Result<()> {
        let material = self
            .material()
            .map_err(|e| PortalError::Persistence(e.to_string()))?;
        let path = path.as_ref();
        let validity = Validity::for_days(AUTHORITY_VALIDITY_DAYS)?;
        let (server_key, server_cert) = self
            .issue_leaf(
                material,
                BOOTSTRAP_SERVER_NAME,
                vec![
                    ExtendedKeyUsageOption::ServerAuth,
                    ExtendedKeyUsageOption::ClientAuth,
                ],
                validity,
            )
            .map_err(|e| PortalError::Persistence(e.to_string()))?;

        let encoding_failed = |e: PortalError| PortalError::Persistence(e.to_string());
        write_pem(&path.join("openvpn"), "key.pem", &server_key.to_pem().map_err(encoding_failed)?, true)?;
        write_pem(&path.join("openvpn"), "cert.pem", &server_cert.to_pem().map_err(encoding_failed)?, false)?;
        write_pem(&path.join("ca"), "key.pem", &material.key.to_pem().map_err(encoding_failed)?, true)?;
        write_pem(&path.join("ca"), "cert.pem", &material.cert_pem, false)?;

        info!(path = %path.display(), "Wrote bootstrap certificate material");
        Ok(())
    }
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("ready", &self.is_ready())
            .field("key_algorithm", &self.key_algorithm())
            .field("leaf_algorithm", &self.leaf_algorithm)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Writes `contents` to `dir/name`. Private files are owner-only before any
/// byte is written, including when the file already exists.
fn write_pem(dir: &Path, name: &str, contents: &str, private: bool) -> Result<()> {
    let path = dir.join(name);
    let persistence = |e: io::Error| PortalError::Persistence(format!("{}: {e}", path.display()));
    fs::create_dir_all(dir).map_err(persistence)?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if private {
        create_owner_only(&mut options);
    }
    let mut file = options.open(&path).map_err(persistence)?;
    if private {
        restrict_to_owner(&file).map_err(persistence)?;
    }
    file.write_all(contents.as_bytes()).map_err(persistence)?;
    Ok(())
}

#[cfg(unix)]
fn create_owner_only(options: &mut OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
}

#[cfg(not(unix))]
fn create_owner_only(_options: &mut OpenOptions) {}

#[cfg(unix)]
fn restrict_to_owner(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_to_owner(_file: &File) -> io::Result<()> {
    Ok(())
}
