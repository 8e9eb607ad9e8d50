#![allow(dead_code)]

use time::{Duration, OffsetDateTime};
use vpn_portal::authority::{CertificateAuthority, IssuedCredential};
use vpn_portal::key::KeyAlgorithm;

/// Start of a validity window, truncated to whole seconds.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(OffsetDateTime::now_utc().unix_timestamp()).unwrap()
}

/// Generates an authority whose own key and leaf keys both use `algorithm`,
/// and issues one client certificate from it.
pub fn issue_with(algorithm: KeyAlgorithm) -> (CertificateAuthority, IssuedCredential) {
    let ca = CertificateAuthority::generate(algorithm)
        .unwrap()
        .with_leaf_algorithm(algorithm);
    let not_before = now();
    let issued = ca
        .issue_certificate(not_before, not_before + Duration::hours(8), "staff")
        .unwrap();
    (ca, issued)
}
