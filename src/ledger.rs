//! The ballot ledger: storage for elections, candidates, ballots and cast records.
//!
//! Ballots and cast records are written together but never reference each other. A ballot row
//! holds no voter id and no plaintext choice; a cast record holds the voter and the election
//! and nothing about the ballot. Ballot ids are drawn at random so they cannot be matched to
//! the sequence of cast records, and ballot timestamps are coarsened by the caller so they
//! cannot be matched to the exact time of a cast record.
use crate::{
    election::{Candidate, Election, NewElection},
    error::{Constraint, StoreError},
    integrity::IntegrityHash,
    BallotId, CandidateId, ElectionId, VoterId,
};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// An anonymous encrypted vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub id: BallotId,
    pub election_id: ElectionId,
    /// JSON envelope of the ciphertext
    pub encrypted_vote: String,
    pub vote_hash: IntegrityHash,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBallot {
    pub election_id: ElectionId,
    pub encrypted_vote: String,
    pub vote_hash: IntegrityHash,
    pub timestamp: DateTime<Utc>,
}

/// Proof that a voter voted in an election, unlinked to any ballot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastRecord {
    pub id: u64,
    pub voter_id: VoterId,
    pub election_id: ElectionId,
    pub voted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCastRecord {
    pub voter_id: VoterId,
    pub election_id: ElectionId,
    pub voted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub elections: usize,
    pub active_elections: usize,
    pub candidates: usize,
    pub ballots: usize,
    pub cast_records: usize,
}

/// A ledger store. Implementations must enforce the uniqueness of (voter, election) cast
/// records and of ballot hashes themselves, and must apply `commit_vote` all-or-nothing.
pub trait Ledger: Send + Sync {
    fn insert_election(&self, election: NewElection) -> Result<Election, StoreError>;

    fn election(&self, id: ElectionId) -> Result<Option<Election>, StoreError>;

    fn elections(&self) -> Result<Vec<Election>, StoreError>;

    fn set_election_active(&self, id: ElectionId, active: bool) -> Result<(), StoreError>;

    /// Remove an election and its candidates; refused while ballots exist
    fn delete_election(&self, id: ElectionId) -> Result<(), StoreError>;

    /// Remove an election together with all of its ballots, cast records and candidates.
    /// This is the only way a ballot is ever deleted.
    fn purge_election(&self, id: ElectionId) -> Result<(), StoreError>;

    fn insert_candidate(
        &self,
        election_id: ElectionId,
        name: String,
        description: String,
    ) -> Result<Candidate, StoreError>;

    fn candidates(&self, election_id: ElectionId) -> Result<Vec<Candidate>, StoreError>;

    fn has_cast(&self, voter_id: VoterId, election_id: ElectionId) -> Result<bool, StoreError>;

    /// The global has-voted flag of a voter
    fn has_voted(&self, voter_id: VoterId) -> Result<bool, StoreError>;

    /// Insert the ballot, insert the cast record and raise the voter's has-voted flag as one
    /// unit. On any error nothing is written.
    fn commit_vote(&self, ballot: NewBallot, record: NewCastRecord) -> Result<(), StoreError>;

    fn ballots(&self, election_id: ElectionId) -> Result<Vec<Ballot>, StoreError>;

    fn cast_records(&self, election_id: ElectionId) -> Result<Vec<CastRecord>, StoreError>;

    fn stats(&self) -> Result<LedgerStats, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    elections: BTreeMap<ElectionId, Election>,
    candidates: BTreeMap<CandidateId, Candidate>,
    ballots: HashMap<BallotId, Ballot>,
    vote_hashes: HashSet<IntegrityHash>,
    cast_records: BTreeMap<u64, CastRecord>,
    cast_index: HashSet<(VoterId, ElectionId)>,
    has_voted: HashSet<VoterId>,
    last_election_id: ElectionId,
    last_candidate_id: CandidateId,
    last_cast_record_id: u64,
}

impl Tables {
    fn require_election(&self, id: ElectionId) -> Result<&Election, StoreError> {
        return self
            .elections
            .get(&id)
            .ok_or(StoreError::MissingElection(id));
    }

    fn fresh_ballot_id(&self) -> BallotId {
        loop {
            let id = OsRng.next_u64();
            if id != 0 && !self.ballots.contains_key(&id) {
                return id;
            }
        }
    }

    fn ballot_count(&self, election_id: ElectionId) -> usize {
        return self
            .ballots
            .values()
            .filter(|ballot| ballot.election_id == election_id)
            .count();
    }
}

/// A ledger held in memory behind a single lock. Every constraint is checked while holding the
/// lock and before any row is written.
#[derive(Debug, Default)]
pub struct MemLedger {
    inner: Mutex<Tables>,
}

impl MemLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Ledger for MemLedger {
    fn insert_election(&self, election: NewElection) -> Result<Election, StoreError> {
        let mut tables = self.tables()?;
        tables.last_election_id += 1;
        let election = Election {
            id: tables.last_election_id,
            title: election.title,
            description: election.description,
            start_date: election.start_date,
            end_date: election.end_date,
            is_active: true,
            public_key: election.public_key,
            private_key: election.private_key,
            created_at: election.created_at,
        };
        tables.elections.insert(election.id, election.clone());
        Ok(election)
    }

    fn election(&self, id: ElectionId) -> Result<Option<Election>, StoreError> {
        Ok(self.tables()?.elections.get(&id).cloned())
    }

    fn elections(&self) -> Result<Vec<Election>, StoreError> {
        Ok(self.tables()?.elections.values().cloned().collect())
    }

    fn set_election_active(&self, id: ElectionId, active: bool) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let election = tables
            .elections
            .get_mut(&id)
            .ok_or(StoreError::MissingElection(id))?;
        election.is_active = active;
        Ok(())
    }

    fn delete_election(&self, id: ElectionId) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        tables.require_election(id)?;
        let ballots = tables.ballot_count(id);
        if ballots > 0 {
            return Err(StoreError::Restricted { ballots });
        }
        tables.candidates.retain(|_, candidate| candidate.election_id != id);
        tables.elections.remove(&id);
        Ok(())
    }

    fn purge_election(&self, id: ElectionId) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        tables.require_election(id)?;
        let purged_hashes = tables
            .ballots
            .values()
            .filter(|ballot| ballot.election_id == id)
            .map(|ballot| ballot.vote_hash.clone())
            .collect::<Vec<IntegrityHash>>();
        for hash in purged_hashes.iter() {
            tables.vote_hashes.remove(hash);
        }
        tables.ballots.retain(|_, ballot| ballot.election_id != id);
        tables.cast_records.retain(|_, record| record.election_id != id);
        tables.cast_index.retain(|(_, election_id)| *election_id != id);
        tables.candidates.retain(|_, candidate| candidate.election_id != id);
        tables.elections.remove(&id);
        Ok(())
    }

    fn insert_candidate(
        &self,
        election_id: ElectionId,
        name: String,
        description: String,
    ) -> Result<Candidate, StoreError> {
        let mut tables = self.tables()?;
        tables.require_election(election_id)?;
        tables.last_candidate_id += 1;
        let candidate = Candidate {
            id: tables.last_candidate_id,
            name,
            description,
            election_id,
        };
        tables.candidates.insert(candidate.id, candidate.clone());
        Ok(candidate)
    }

    fn candidates(&self, election_id: ElectionId) -> Result<Vec<Candidate>, StoreError> {
        Ok(self
            .tables()?
            .candidates
            .values()
            .filter(|candidate| candidate.election_id == election_id)
            .cloned()
            .collect())
    }

    fn has_cast(&self, voter_id: VoterId, election_id: ElectionId) -> Result<bool, StoreError> {
        Ok(self.tables()?.cast_index.contains(&(voter_id, election_id)))
    }

    fn has_voted(&self, voter_id: VoterId) -> Result<bool, StoreError> {
        Ok(self.tables()?.has_voted.contains(&voter_id))
    }

    fn commit_vote(&self, ballot: NewBallot, record: NewCastRecord) -> Result<(), StoreError> {
        let mut tables = self.tables()?;

        // Constraints first, so a failure leaves every table untouched
        tables.require_election(ballot.election_id)?;
        tables.require_election(record.election_id)?;
        if tables
            .cast_index
            .contains(&(record.voter_id, record.election_id))
        {
            return Err(StoreError::UniqueViolation(Constraint::CastRecord));
        }
        if tables.vote_hashes.contains(&ballot.vote_hash) {
            return Err(StoreError::UniqueViolation(Constraint::VoteHash));
        }

        let ballot = Ballot {
            id: tables.fresh_ballot_id(),
            election_id: ballot.election_id,
            encrypted_vote: ballot.encrypted_vote,
            vote_hash: ballot.vote_hash,
            timestamp: ballot.timestamp,
        };
        tables.last_cast_record_id += 1;
        let record = CastRecord {
            id: tables.last_cast_record_id,
            voter_id: record.voter_id,
            election_id: record.election_id,
            voted_at: record.voted_at,
        };

        tables.vote_hashes.insert(ballot.vote_hash.clone());
        tables.ballots.insert(ballot.id, ballot);
        tables
            .cast_index
            .insert((record.voter_id, record.election_id));
        tables.has_voted.insert(record.voter_id);
        tables.cast_records.insert(record.id, record);
        Ok(())
    }

    /// Ballots are returned ordered by their random id, which carries no casting order
    fn ballots(&self, election_id: ElectionId) -> Result<Vec<Ballot>, StoreError> {
        let mut ballots = self
            .tables()?
            .ballots
            .values()
            .filter(|ballot| ballot.election_id == election_id)
            .cloned()
            .collect::<Vec<Ballot>>();
        ballots.sort_by_key(|ballot| ballot.id);
        Ok(ballots)
    }

    fn cast_records(&self, election_id: ElectionId) -> Result<Vec<CastRecord>, StoreError> {
        Ok(self
            .tables()?
            .cast_records
            .values()
            .filter(|record| record.election_id == election_id)
            .cloned()
            .collect())
    }

    fn stats(&self) -> Result<LedgerStats, StoreError> {
        let tables = self.tables()?;
        Ok(LedgerStats {
            elections: tables.elections.len(),
            active_elections: tables
                .elections
                .values()
                .filter(|election| election.is_active)
                .count(),
            candidates: tables.candidates.len(),
            ballots: tables.ballots.len(),
            cast_records: tables.cast_records.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use chrono::{Duration, TimeZone};

    fn ledger_with_election() -> (MemLedger, ElectionId) {
        let ledger = MemLedger::new();
        let (public_key, private_key) = testing::keypair().split();
        let start_date = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        let election = ledger
            .insert_election(NewElection {
                title: "Referendum".into(),
                description: String::new(),
                start_date,
                end_date: start_date + Duration::hours(8),
                public_key,
                private_key,
                created_at: start_date,
            })
            .unwrap();
        (ledger, election.id)
    }

    fn vote(election_id: ElectionId, voter_id: VoterId, hash: &str) -> (NewBallot, NewCastRecord) {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 10, 17, 3).unwrap();
        let ballot = NewBallot {
            election_id,
            encrypted_vote: "{}".into(),
            vote_hash: IntegrityHash::from_hex(&hash.repeat(32)).unwrap(),
            timestamp: now,
        };
        let record = NewCastRecord {
            voter_id,
            election_id,
            voted_at: now,
        };
        (ballot, record)
    }

    #[test]
    fn test_commit_vote() {
        let (ledger, election_id) = ledger_with_election();
        let (ballot, record) = vote(election_id, 11, "aa");
        ledger.commit_vote(ballot, record).unwrap();

        assert!(ledger.has_cast(11, election_id).unwrap());
        assert!(ledger.has_voted(11).unwrap());
        assert_eq!(ledger.ballots(election_id).unwrap().len(), 1);
        assert_eq!(ledger.cast_records(election_id).unwrap().len(), 1);
    }

    /// A second cast record for the same voter is refused and leaves no trace
    #[test]
    fn test_cast_record_unique() {
        let (ledger, election_id) = ledger_with_election();
        let (ballot, record) = vote(election_id, 11, "aa");
        ledger.commit_vote(ballot, record).unwrap();
        let (ballot, record) = vote(election_id, 11, "bb");
        assert!(matches!(
            ledger.commit_vote(ballot, record),
            Err(StoreError::UniqueViolation(Constraint::CastRecord))
        ));
        assert_eq!(ledger.ballots(election_id).unwrap().len(), 1);
        assert_eq!(ledger.cast_records(election_id).unwrap().len(), 1);
    }

    #[test]
    fn test_vote_hash_unique() {
        let (ledger, election_id) = ledger_with_election();
        let (ballot, record) = vote(election_id, 11, "aa");
        ledger.commit_vote(ballot, record).unwrap();
        let (ballot, record) = vote(election_id, 12, "aa");
        assert!(matches!(
            ledger.commit_vote(ballot, record),
            Err(StoreError::UniqueViolation(Constraint::VoteHash))
        ));
        assert!(!ledger.has_cast(12, election_id).unwrap());
        assert!(!ledger.has_voted(12).unwrap());
    }

    #[test]
    fn test_commit_requires_election() {
        let (ledger, _) = ledger_with_election();
        let (ballot, record) = vote(99, 11, "aa");
        assert!(matches!(
            ledger.commit_vote(ballot, record),
            Err(StoreError::MissingElection(99))
        ));
        assert_eq!(ledger.stats().unwrap().ballots, 0);
    }

    #[test]
    fn test_delete_and_purge() {
        let (ledger, election_id) = ledger_with_election();
        ledger
            .insert_candidate(election_id, "Yes".into(), String::new())
            .unwrap();
        let (ballot, record) = vote(election_id, 11, "aa");
        ledger.commit_vote(ballot, record).unwrap();

        assert!(matches!(
            ledger.delete_election(election_id),
            Err(StoreError::Restricted { ballots: 1 })
        ));
        ledger.purge_election(election_id).unwrap();
        assert_eq!(ledger.stats().unwrap(), LedgerStats::default());
        assert!(!ledger.has_cast(11, election_id).unwrap());
    }

    #[test]
    fn test_stats() {
        let (ledger, election_id) = ledger_with_election();
        ledger
            .insert_candidate(election_id, "Yes".into(), String::new())
            .unwrap();
        ledger.set_election_active(election_id, false).unwrap();
        let stats = ledger.stats().unwrap();
        assert_eq!(stats.elections, 1);
        assert_eq!(stats.active_elections, 0);
        assert_eq!(stats.candidates, 1);
    }
}
