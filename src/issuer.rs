use der::Encode;
use der::flagset::FlagSet;
use rand_core::{OsRng, RngCore};
use sha1::Sha1;
use x509_cert::certificate::CertificateInner;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::Certificate;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages,
    SubjectKeyIdentifier,
};
use crate::cert::params::{CertificationRequestInfo, DistinguishedName, ExtensionParam, Validity};
use crate::error::{PortalError, Result};
use crate::key::KeyPair;
use crate::tbs_certificate::TbsCertificate;

/// Length in bytes of generated serial numbers.
const SERIAL_NUMBER_LEN: usize = 16;

/// Represents an entity capable of issuing certificates.
///
/// Implementors provide the name and key that go into the issuer side of a
/// certificate; [`Issuer::issue`] assembles and signs the rest.
pub trait Issuer {
    /// Returns the distinguished name of the issuer.
    fn issuer_name(&self) -> DistinguishedName;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Issues a certificate based on the provided certification request information.
    ///
    /// # Arguments
    /// * `cert_request` - The certification request information containing details about the certificate to be issued.
    /// * `validity` - The validity window of the new certificate.
    ///
    /// # Returns
    /// The signed certificate, with a fresh random serial number.
    fn issue(&self, cert_request: &CertificationRequestInfo, validity: Validity) -> Result<Certificate> {
        let signing_key = self.signing_key();
        let signature_algo = signing_key.signature_algorithm();
        let issuer_key_id = key_identifier(&signing_key.public_key_info()?);
        let subject_key_id = key_identifier(&cert_request.subject_public_key);

        let basic_constraints = BasicConstraints {
            is_ca: cert_request.is_ca,
            max_path_length: cert_request.is_ca.then_some(0),
        };

        let mut key_usage_flags: FlagSet<KeyUsages> = KeyUsages::DigitalSignature.into();
        if cert_request.is_ca {
            key_usage_flags |= KeyUsages::KeyCertSign;
        } else if is_rsa(&cert_request.subject_public_key) {
            key_usage_flags |= KeyUsages::KeyEncipherment;
        }

        let mut extensions: Vec<ExtensionParam> = vec![
            ExtensionParam::from_extension(basic_constraints, true)?,
            ExtensionParam::from_extension(KeyUsage(key_usage_flags), true)?,
            ExtensionParam::from_extension(SubjectKeyIdentifier(subject_key_id), false)?,
            ExtensionParam::from_extension(
                AuthorityKeyIdentifier {
                    key_identifier: issuer_key_id,
                },
                false,
            )?,
        ];

        if !cert_request.usages.is_empty() {
            let extended_key_usage = ExtendedKeyUsage {
                usage: cert_request.usages.clone(),
            };
            extensions.push(ExtensionParam::from_extension(extended_key_usage, false)?);
        }

        let tbs_cert = TbsCertificate {
            serial_number: random_serial_number()?,
            signature_algorithm: signature_algo,
            issuer: self.issuer_name(),
            validity,
            subject: cert_request.subject.clone(),
            subject_public_key: cert_request.subject_public_key.clone(),
            extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;
        let signature = signing_key.sign_data(&tbs_cert_inner.to_der()?)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algo.into(),
            signature: der::asn1::BitString::from_bytes(&signature)?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}

/// Issuer for self-signed certificates: the subject names itself.
pub struct SelfIssuer<'a> {
    pub name: DistinguishedName,
    pub key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> DistinguishedName {
        self.name.clone()
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }
}

/// SHA-1 over the subject public key bits (RFC 5280, 4.2.1.2 method 1).
fn key_identifier(spki: &SubjectPublicKeyInfoOwned) -> Vec<u8> {
    <Sha1 as sha1::Digest>::digest(spki.subject_public_key.raw_bytes()).to_vec()
}

fn is_rsa(spki: &SubjectPublicKeyInfoOwned) -> bool {
    spki.algorithm.oid == const_oid::db::rfc5912::RSA_ENCRYPTION
}

/// A random positive serial number of [`SERIAL_NUMBER_LEN`] bytes.
fn random_serial_number() -> Result<Vec<u8>> {
    let mut serial = vec![0u8; SERIAL_NUMBER_LEN];
    OsRng
        .try_fill_bytes(&mut serial)
        .map_err(|e| PortalError::Issuance(format!("serial number randomness: {e}")))?;
    // Clear the sign bit and keep the leading octet non-zero so the
    // INTEGER encodes in exactly SERIAL_NUMBER_LEN octets.
    serial[0] = (serial[0] & 0x7f) | 0x40;
    Ok(serial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::{ExtendedKeyUsageOption, ToAndFromX509Extension};
    use crate::key::KeyAlgorithm;

    fn self_signed(is_ca: bool) -> (Certificate, KeyPair) {
        let key = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let info = CertificationRequestInfo::builder()
            .subject(DistinguishedName::common_name("issuer.test"))
            .subject_public_key(key.public_key_info().unwrap())
            .usages(vec![ExtendedKeyUsageOption::ClientAuth])
            .is_ca(is_ca)
            .build();
        let issuer = SelfIssuer {
            name: info.subject.clone(),
            key: &key,
        };
        let cert = issuer.issue(&info, Validity::for_days(1).unwrap()).unwrap();
        (cert, key)
    }

    fn extension<E: ToAndFromX509Extension>(cert: &Certificate) -> Option<E> {
        cert.inner
            .tbs_certificate
            .extensions
            .as_ref()?
            .iter()
            .find(|ext| ext.extn_id == E::OID)
            .and_then(|ext| E::from_x509_extension_value(ext.extn_value.as_bytes()).ok())
    }

    #[test]
    fn serial_numbers_are_positive_and_fixed_length() {
        for _ in 0..64 {
            let serial = random_serial_number().unwrap();
            assert_eq!(serial.len(), SERIAL_NUMBER_LEN);
            assert_eq!(serial[0] & 0x80, 0);
            assert_ne!(serial[0], 0);
        }
    }

    #[test]
    fn ca_certificate_can_sign_certificates() {
        let (cert, _) = self_signed(true);
        let bc: BasicConstraints = extension(&cert).unwrap();
        assert!(bc.is_ca);
        let ku: KeyUsage = extension(&cert).unwrap();
        assert!(ku.0.contains(KeyUsages::KeyCertSign));
        assert!(ku.0.contains(KeyUsages::DigitalSignature));
    }

    #[test]
    fn leaf_certificate_is_not_a_ca() {
        let (cert, _) = self_signed(false);
        let bc: BasicConstraints = extension(&cert).unwrap();
        assert!(!bc.is_ca);
        let ku: KeyUsage = extension(&cert).unwrap();
        assert!(!ku.0.contains(KeyUsages::KeyCertSign));
        let eku: ExtendedKeyUsage = extension(&cert).unwrap();
        assert_eq!(eku.usage, vec![ExtendedKeyUsageOption::ClientAuth]);
    }

    #[test]
    fn self_signed_key_identifiers_match() {
        let (cert, _) = self_signed(true);
        let ski: SubjectKeyIdentifier = extension(&cert).unwrap();
        let aki: AuthorityKeyIdentifier = extension(&cert).unwrap();
        assert_eq!(ski.0, aki.key_identifier);
        assert_eq!(cert.subject(), cert.issuer());
    }
}
