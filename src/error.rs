use crate::{election::ElectionStatus, ElectionId, MAX_MODULUS_BITS, MIN_MODULUS_BITS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the cryptographic primitives. All of them are local to the call site.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error(
        "modulus of {0} bits is outside the supported range {MIN_MODULUS_BITS}..={MAX_MODULUS_BITS}"
    )]
    UnsupportedModulusBits(usize),

    #[error("message too large for key size")]
    MessageTooLarge,

    #[error("encoded ballot does not fit below the key modulus")]
    EncodingTooLarge,

    #[error("ciphertext component outside the multiplicative group")]
    CiphertextOutOfRange,

    #[error("malformed key material: {0}")]
    MalformedKey(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a ledger implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(Constraint),

    #[error("election {0} does not exist")]
    MissingElection(ElectionId),

    #[error("election still referenced by {ballots} ballots")]
    Restricted { ballots: usize },

    #[error("ledger lock poisoned")]
    Poisoned,

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Storage-level uniqueness constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// One cast record per (voter, election)
    CastRecord,
    /// One ballot per integrity hash
    VoteHash,
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CastRecord => write!(f, "cast_record(voter_id, election_id)"),
            Self::VoteHash => write!(f, "ballot(vote_hash)"),
        }
    }
}

/// Reasons a stored ballot is excluded from a tally.
/// None of them carries any information about the plaintext choice.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum IntegrityError {
    #[error("stored ciphertext envelope could not be parsed")]
    MalformedEnvelope,

    #[error("stored ballot digest is not 32 bytes of hex")]
    MalformedDigest,

    #[error("ciphertext component outside the multiplicative group")]
    CiphertextOutOfRange,

    #[error("decrypted payload is a legacy bare value without a candidate")]
    LegacyPayload,

    #[error("decrypted payload belongs to another election")]
    ElectionMismatch,

    #[error("decrypted payload names a candidate not registered in this election")]
    UnknownCandidate,
}

/// Errors surfaced by the ballot box to the surrounding application
#[derive(Debug, Error)]
pub enum Error {
    #[error("voter has already voted in this election")]
    AlreadyVoted,

    #[error("election is not open for voting ({0})")]
    ElectionNotOpen(ElectionStatus),

    #[error("election {0} not found")]
    ElectionNotFound(ElectionId),

    #[error("candidate is not registered in this election")]
    UnknownCandidate,

    #[error("election window starts after it ends")]
    InvalidWindow,

    #[error("cannot reopen an election whose end date has passed")]
    ReopenAfterExpiry,

    #[error("election still holds {0} ballots")]
    ElectionHasBallots(usize),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to initialise logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
