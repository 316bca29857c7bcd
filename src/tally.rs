//! Decrypt and count every ballot of an election.
//!
//! Ballots are decrypted one at a time; a ballot that cannot be decrypted or decoded is set
//! aside with its reason and the count carries on. The result depends only on the set of
//! ballots, not on the order they are read in.
use crate::{
    cipher::{decrypt, Ciphertext},
    encoding::{decode, DecodedBallot},
    error::IntegrityError,
    keys::SecretKey,
    ledger::Ballot,
    BallotId, CandidateId, ElectionId,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A ballot left out of the count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub ballot_id: BallotId,
    pub reason: IntegrityError,
}

/// Per-candidate totals, always recomputable from the stored ballots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyResult {
    pub election_id: ElectionId,
    pub totals: BTreeMap<CandidateId, u64>,
    pub counted: usize,
    pub exclusions: Vec<Exclusion>,
}

impl TallyResult {
    pub fn count(&self, candidate_id: CandidateId) -> u64 {
        return self.totals.get(&candidate_id).copied().unwrap_or(0);
    }
}

/// Open one ballot and return the candidate it counts for together with its value
fn open_ballot(
    ballot: &Ballot,
    election_id: ElectionId,
    candidates: &BTreeSet<CandidateId>,
    sk: &SecretKey,
) -> Result<(CandidateId, u64), IntegrityError> {
    if ballot.election_id != election_id {
        return Err(IntegrityError::ElectionMismatch);
    }
    let ciphertext = Ciphertext::from_envelope(&ballot.encrypted_vote)
        .map_err(|_| IntegrityError::MalformedEnvelope)?;
    let message = decrypt(&ciphertext, sk).map_err(|_| IntegrityError::CiphertextOutOfRange)?;
    let payload = match decode(&message) {
        DecodedBallot::Structured(payload) => payload,
        DecodedBallot::Legacy(_) => return Err(IntegrityError::LegacyPayload),
    };
    if payload.election_id != election_id {
        return Err(IntegrityError::ElectionMismatch);
    }
    if !candidates.contains(&payload.candidate_id) {
        return Err(IntegrityError::UnknownCandidate);
    }
    return Ok((payload.candidate_id, payload.value));
}

/// Count the ballots of one election. Every registered candidate appears in the totals, with
/// zero if nobody voted for them.
pub fn tally_ballots(
    election_id: ElectionId,
    candidates: &[CandidateId],
    ballots: &[Ballot],
    sk: &SecretKey,
) -> TallyResult {
    let registered = candidates.iter().copied().collect::<BTreeSet<CandidateId>>();
    let mut totals = registered
        .iter()
        .map(|candidate| (*candidate, 0u64))
        .collect::<BTreeMap<CandidateId, u64>>();
    let mut counted = 0usize;
    let mut exclusions = vec![];

    for ballot in ballots {
        match open_ballot(ballot, election_id, &registered, sk) {
            Ok((candidate_id, value)) => {
                let total = totals.entry(candidate_id).or_insert(0);
                *total = total.saturating_add(value);
                counted += 1;
            }
            Err(reason) => {
                warn!("ballot {} excluded from tally of election {election_id}: {reason}", ballot.id);
                exclusions.push(Exclusion {
                    ballot_id: ballot.id,
                    reason,
                });
            }
        }
    }
    exclusions.sort_by_key(|exclusion| exclusion.ballot_id);
    debug!(
        "tallied election {election_id}: {counted} counted, {} excluded",
        exclusions.len()
    );

    return TallyResult {
        election_id,
        totals,
        counted,
        exclusions,
    };
}
