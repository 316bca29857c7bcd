//! Tamper-evident fingerprints for stored ballots.
//!
//! The digest covers the ciphertext and the election context only. It never includes the
//! voter, so an auditor can recompute it without learning who cast the ballot.
use crate::{cipher::Ciphertext, error::IntegrityError, serde_hex, ElectionId};
use chrono::{DateTime, SecondsFormat, Utc};
use digest::Digest;
use serde::{Deserialize, Serialize};
use sha3::Sha3_256;

/// Length of a SHA3-256 digest
const DIGEST_BYTES: usize = 32;

/// SHA3-256 digest of a ballot, rendered as lowercase hex
#[derive(Debug, Eq, PartialEq, Hash, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrityHash(String);

impl IntegrityHash {
    pub fn compute(ciphertext: &Ciphertext, election_id: ElectionId, cast_at: &DateTime<Utc>) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(canonical_string(ciphertext, election_id, cast_at).as_bytes());
        return Self(hex::encode(hasher.finalize()));
    }

    /// Recompute from the stored fields and compare
    pub fn verify(
        &self,
        ciphertext: &Ciphertext,
        election_id: ElectionId,
        cast_at: &DateTime<Utc>,
    ) -> bool {
        return *self == Self::compute(ciphertext, election_id, cast_at);
    }

    /// Parse a digest read back from storage
    pub fn from_hex(text: &str) -> Result<Self, IntegrityError> {
        let bytes = hex::decode(text).map_err(|_| IntegrityError::MalformedDigest)?;
        if bytes.len() != DIGEST_BYTES {
            return Err(IntegrityError::MalformedDigest);
        }
        return Ok(Self(hex::encode(bytes)));
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IntegrityHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// "<c1 hex>:<c2 hex>:<election id>:<cast time, RFC 3339 in whole seconds>"
fn canonical_string(ciphertext: &Ciphertext, election_id: ElectionId, cast_at: &DateTime<Utc>) -> String {
    return format!(
        "{}:{}:{}:{}",
        serde_hex::encode(ciphertext.get_c1()),
        serde_hex::encode(ciphertext.get_c2()),
        election_id,
        cast_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
}

pub fn compute_integrity_hash(
    ciphertext: &Ciphertext,
    election_id: ElectionId,
    timestamp: &DateTime<Utc>,
) -> IntegrityHash {
    return IntegrityHash::compute(ciphertext, election_id, timestamp);
}
