//! # VPN Portal - Role-Gated Client Certificate Issuance
//!
//! The issuance core of a self-service VPN portal. Users authenticated by an
//! upstream proxy pick a profile, and if one of their roles grants it they
//! receive a short-lived client certificate signed by the portal's own
//! certificate authority. Certificates are built and signed entirely with
//! rustcrypto libraries.
//!
//! ## Supported Key Types
//!
//! The authority and issued client certificates can use:
//! - **ECDSA**: P-224, P-256 (default), P-384 and P-521 curves
//! - **RSA**: 2048 and 4096-bit keys, signed with PKCS#1 v1.5 and SHA-256
//!
//! ## Key Features
//!
//! - **Self-Contained Authority**: Generate a CA on first start or load one from PEM files
//! - **Bootstrap Material**: Export the CA and a server identity for the VPN daemon
//! - **Role-Based Profiles**: A profile is granted when claimed and allowed roles intersect
//! - **Session Audit Trail**: Every issued certificate is recorded
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vpn_portal::{
//!     authority::CertificateAuthority,
//!     issuance::IssuanceService,
//!     key::KeyAlgorithm,
//!     profile::{ClaimedRoles, Profile, ProfileCatalog},
//! };
//!
//! # fn main() -> Result<(), vpn_portal::error::PortalError> {
//! let authority = CertificateAuthority::generate(KeyAlgorithm::EcdsaP256)?;
//! authority.export_bootstrap_material("/tmp/tls")?;
//!
//! let catalog = ProfileCatalog::new([Profile {
//!     name: "staff".to_string(),
//!     description: "Office network".to_string(),
//!     max_session: "8h".to_string(),
//!     roles: vec!["staff".to_string(), "admin".to_string()],
//!     routes: vec![],
//!     rules: vec![],
//! }]);
//!
//! let service = IssuanceService::new(Arc::new(authority), catalog);
//! let bundle = service.issue(&ClaimedRoles::parse("admin,guest"), "staff", "192.0.2.1", "alice")?;
//! println!("{}", bundle.download_filename());
//! # Ok(())
//! # }
//! ```
//!
//! ## Starting From Configuration
//!
//! ```rust,no_run
//! use vpn_portal::{config::PortalConfig, issuance::IssuanceService};
//!
//! # fn main() -> Result<(), vpn_portal::error::PortalError> {
//! let config = PortalConfig::from_yaml_str(
//!     r#"
//! ca-private-file: /etc/vpn-portal/ca/key.pem
//! ca-certificate-file: /etc/vpn-portal/ca/cert.pem
//! profiles:
//!   - name: staff
//!     max-session: 8h
//!     roles: [staff]
//! "#,
//! )?;
//! let service = IssuanceService::from_config(&config)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use vpn_portal::{
//!     error::PortalError,
//!     profile::{ClaimedRoles, ProfileCatalog},
//! };
//!
//! let catalog = ProfileCatalog::default();
//! match catalog.check_authorized("staff", &ClaimedRoles::parse("guest")) {
//!     Ok(profile) => println!("granted {}", profile.name),
//!     Err(PortalError::ProfileNotFound(name)) => println!("no profile named {name}"),
//!     Err(PortalError::NotAuthorized(name)) => println!("not allowed to use {name}"),
//!     Err(e) => println!("Other error: {e}"),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`authority`]: The certificate authority and bootstrap export
//! - [`profile`]: Profiles, claimed roles and authorization
//! - [`session`]: Record of issued sessions
//! - [`issuance`]: The authorize, issue and record workflow
//! - [`config`]: YAML configuration and identity headers
//! - [`key`]: Key generation, PEM import/export and signing
//! - [`cert`]: Certificate encoding, decoding and extensions
//! - [`issuer`]: Certificate signing
//! - [`tbs_certificate`]: Low-level certificate structure
//! - [`error`]: Error types

pub mod authority;
pub mod cert;
pub mod config;
pub mod error;
pub mod issuance;
pub mod issuer;
pub mod key;
pub mod profile;
pub mod session;
pub mod tbs_certificate;
