//! Append-only audit trail of issued certificates.

use std::fmt;
use std::time::Duration;

use parking_lot::RwLock;
use time::OffsetDateTime;

/// One issuance event.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub subject_user: String,
    pub profile_name: String,
    pub client_address: String,
    pub duration: Duration,
    /// Certificate serial number as lowercase hex.
    pub serial_number: String,
    pub certificate_pem: String,
    pub issuing_ca_pem: String,
    pub private_key_pem: String,
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("subject_user", &self.subject_user)
            .field("profile_name", &self.profile_name)
            .field("client_address", &self.client_address)
            .field("duration", &self.duration)
            .field("serial_number", &self.serial_number)
            .field("private_key_pem", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Every session issued since the process started, in issue order.
///
/// Records are never removed; the registry grows for the life of the process.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    records: RwLock<Vec<SessionRecord>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    pub fn record(&self, record: SessionRecord) {
        self.records.write().push(record);
    }

    /// A point-in-time copy of all records.
    pub fn snapshot(&self) -> Vec<SessionRecord> {
        self.records.read().clone()
    }

    /// Records issued to `username`, oldest first.
    pub fn for_user(&self, username: &str) -> Vec<SessionRecord> {
        self.records
            .read()
            .iter()
            .filter(|record| record.subject_user == username)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
