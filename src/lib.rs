//! ElGamal ballot encryption with an anonymity-preserving ballot ledger
use crypto_bigint::U2048;

/// Use the same big integer type everywhere
pub type BigInt = U2048;
pub const LIMBS: usize = BigInt::LIMBS; // 32 words each 64 bits, a total of 2048 bits

/// Smallest and largest supported modulus, in bits
pub const MIN_MODULUS_BITS: usize = 64;
pub const MAX_MODULUS_BITS: usize = BigInt::BITS;

pub type ElectionId = u64;
pub type CandidateId = u64;
pub type VoterId = u64;
pub type BallotId = u64;

pub mod arithmetics;
pub mod ballot_box;
pub mod cipher;
pub mod clock;
pub mod config;
pub mod election;
pub mod encoding;
pub mod error;
pub mod integrity;
pub mod keys;
pub mod ledger;
pub mod logging;
pub mod serde_hex;
pub mod tally;

pub use ballot_box::BallotBox;
pub use cipher::{encrypt_ballot, Ciphertext};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use election::{Election, ElectionStatus};
pub use encoding::{BallotPayload, DecodedBallot};
pub use error::{CryptoError, Error, IntegrityError, StoreError};
pub use integrity::{compute_integrity_hash, IntegrityHash};
pub use keys::{generate_election_keys, KeyPair, PublicKey, SecretKey};
pub use ledger::{Ledger, MemLedger};
pub use tally::TallyResult;
