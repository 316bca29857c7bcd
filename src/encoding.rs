//! Mapping between ballot payloads and integers below the key modulus
use crate::{
    arithmetics::{from_be_bytes, to_minimal_be_bytes},
    error::CryptoError,
    BigInt, CandidateId, ElectionId,
};
use serde::{Deserialize, Serialize};

/// The structured content of one vote
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotPayload {
    pub election_id: ElectionId,
    pub candidate_id: CandidateId,
    pub value: u64,
}

impl BallotPayload {
    /// A single vote for a candidate
    pub fn new(election_id: ElectionId, candidate_id: CandidateId) -> Self {
        return Self {
            election_id,
            candidate_id,
            value: 1,
        };
    }
}

/// A decrypted ballot. Ballots written before the structured payload format existed carry a
/// bare integer, which is kept as is.
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum DecodedBallot {
    Legacy(BigInt),
    Structured(BallotPayload),
}

/// Serialize the payload as compact JSON and read the bytes as a big-endian integer.
/// The integer must lie strictly below the modulus.
pub fn encode(payload: &BallotPayload, modulus: &BigInt) -> Result<BigInt, CryptoError> {
    let bytes = serde_json::to_vec(payload)?;
    let message = from_be_bytes(&bytes).ok_or(CryptoError::EncodingTooLarge)?;
    if message >= *modulus {
        return Err(CryptoError::EncodingTooLarge);
    }
    return Ok(message);
}

/// Reverse the byte conversion and parse the structured payload. Anything that does not parse
/// falls back to the bare integer; decoding never fails.
pub fn decode(message: &BigInt) -> DecodedBallot {
    let bytes = to_minimal_be_bytes(message);
    match serde_json::from_slice::<BallotPayload>(&bytes) {
        Ok(payload) => DecodedBallot::Structured(payload),
        Err(_) => DecodedBallot::Legacy(*message),
    }
}
