//! use vpn_portal::error::PortalError;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PortalError>;

/// Represents errors that can occur while running the portal core.
///
/// Startup errors (see [`PortalError::is_fatal`]) must stop the process.
/// Everything else rejects a single request and leaves the authority and the
/// session registry untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortalError {
    /// Key pair generation failed.
    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    /// Authority key or certificate could not be read or decoded.
    #[error("Failed to load authority material: {0}")]
    KeyLoad(String),

    /// Certificate issuance failed or the authority is not initialized.
    #[error("Issuance error: {0}")]
    Issuance(String),

    /// Bootstrap material could not be written.
    #[error("Failed to persist bootstrap material: {0}")]
    Persistence(String),

    /// No profile with the requested name exists.
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// The claimed roles do not entitle the caller to the profile.
    #[error("Not authorized for profile {0}")]
    NotAuthorized(String),

    /// A session duration is unparsable or yields an empty validity window.
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    Encoding(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    Decoding(String),

    /// The configuration is inconsistent.
    #[error("Config error: {0}")]
    Config(String),

    /// The authority already holds key material.
    #[error("Authority is already initialized")]
    AlreadyInitialized,
}

impl PortalError {
    /// Returns `true` for errors raised while bringing the portal up.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PortalError::KeyGeneration(_)
                | PortalError::KeyLoad(_)
                | PortalError::Persistence(_)
                | PortalError::Config(_)
                | PortalError::AlreadyInitialized
        )
    }
}

impl From<der::Error> for PortalError {
    /// Converts a `der::Error` into a `PortalError`.
    fn from(err: der::Error) -> Self {
        PortalError::Encoding(err.to_string())
    }
}
