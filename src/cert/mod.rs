pub mod extensions;
pub mod params;

use std::fmt::Write as _;

use der::{DecodePem, EncodePem};
use time::OffsetDateTime;
use x509_cert::certificate::CertificateInner;

use crate::error::{PortalError, Result};
use params::DistinguishedName;

/// Represents the supported signature algorithms for certificates.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption.
    Sha256WithRSA,
    /// SHA-224 with ECDSA (P-224).
    Sha224WithECDSA,
    /// SHA-256 with ECDSA (P-256).
    Sha256WithECDSA,
    /// SHA-384 with ECDSA (P-384).
    Sha384WithECDSA,
    /// SHA-512 with ECDSA (P-521).
    Sha512WithECDSA,
}

impl From<SignatureAlgorithm> for x509_cert::spki::AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA identifiers carry an explicit NULL parameter, ECDSA ones carry none
    /// (RFC 4055, RFC 5758).
    fn from(value: SignatureAlgorithm) -> Self {
        let (oid, parameters) = match value {
            SignatureAlgorithm::Sha256WithRSA => (
                const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                Some(der::asn1::Any::null()),
            ),
            SignatureAlgorithm::Sha224WithECDSA => (const_oid::db::rfc5912::ECDSA_WITH_SHA_224, None),
            SignatureAlgorithm::Sha256WithECDSA => (const_oid::db::rfc5912::ECDSA_WITH_SHA_256, None),
            SignatureAlgorithm::Sha384WithECDSA => (const_oid::db::rfc5912::ECDSA_WITH_SHA_384, None),
            SignatureAlgorithm::Sha512WithECDSA => (const_oid::db::rfc5912::ECDSA_WITH_SHA_512, None),
        };
        x509_cert::spki::AlgorithmIdentifierOwned { oid, parameters }
    }
}

/// Represents an X.509 certificate.
///
/// This struct provides methods to encode the certificate into PEM format
/// and read back the fields the portal displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(pkcs8::LineEnding::LF)
            .map_err(|e| PortalError::Encoding(e.to_string()))
    }

    /// Decodes a PEM encoded certificate.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = CertificateInner::from_pem(pem.as_bytes())
            .map_err(|e| PortalError::Decoding(e.to_string()))?;
        Ok(Self { inner })
    }

    /// The subject distinguished name.
    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.subject)
    }

    /// The issuer distinguished name.
    pub fn issuer(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.issuer)
    }

    /// The serial number as lowercase hex.
    pub fn serial_hex(&self) -> String {
        self.inner
            .tbs_certificate
            .serial_number
            .as_bytes()
            .iter()
            .fold(String::new(), |mut out, b| {
                let _ = write!(out, "{b:02x}");
                out
            })
    }

    pub fn not_before(&self) -> Result<OffsetDateTime> {
        to_offset_date_time(self.inner.tbs_certificate.validity.not_before)
    }

    pub fn not_after(&self) -> Result<OffsetDateTime> {
        to_offset_date_time(self.inner.tbs_certificate.validity.not_after)
    }

    /// The subject public key info the certificate binds.
    pub fn public_key_info(&self) -> &x509_cert::spki::SubjectPublicKeyInfoOwned {
        &self.inner.tbs_certificate.subject_public_key_info
    }
}

fn to_offset_date_time(time: x509_cert::time::Time) -> Result<OffsetDateTime> {
    let secs = i64::try_from(time.to_unix_duration().as_secs())
        .map_err(|e| PortalError::Decoding(e.to_string()))?;
    OffsetDateTime::from_unix_timestamp(secs).map_err(|e| PortalError::Decoding(e.to_string()))
}
