//! The operations offered to the surrounding application: election lifecycle, vote casting
//! and tallying. Election status is recomputed from the clock on every read; nothing runs in
//! the background.
use crate::{
    cipher::encrypt_ballot,
    clock::Clock,
    config::Config,
    election::{Candidate, Election, ElectionStatus, NewElection, StatusReport},
    encoding::BallotPayload,
    error::{Constraint, CryptoError, Error, Result, StoreError},
    integrity::compute_integrity_hash,
    keys::{generate_election_keys, KeyPair},
    ledger::{Ledger, LedgerStats, NewBallot, NewCastRecord},
    tally::{tally_ballots, TallyResult},
    CandidateId, ElectionId, VoterId,
};
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};

pub struct BallotBox<L: Ledger, C: Clock> {
    ledger: L,
    clock: C,
    config: Config,
}

impl<L: Ledger, C: Clock> BallotBox<L, C> {
    pub fn new(ledger: L, clock: C, config: Config) -> Self {
        return Self {
            ledger,
            clock,
            config,
        };
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create an election and its key pair. Key generation runs here, once per election.
    pub fn create_election(
        &self,
        title: &str,
        description: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Election> {
        if start_date > end_date {
            return Err(Error::InvalidWindow);
        }
        let (public_key, private_key) = generate_election_keys(self.config.modulus_bits)?.split();
        let election = self.ledger.insert_election(NewElection {
            title: title.to_string(),
            description: description.to_string(),
            start_date,
            end_date,
            public_key,
            private_key,
            created_at: self.clock.now(),
        })?;
        info!(
            "created election {} '{}' with a {}-bit key",
            election.id, election.title, self.config.modulus_bits
        );
        return Ok(election);
    }

    pub fn add_candidate(
        &self,
        election_id: ElectionId,
        name: &str,
        description: &str,
    ) -> Result<Candidate> {
        self.load(election_id)?;
        let candidate =
            self.ledger
                .insert_candidate(election_id, name.to_string(), description.to_string())?;
        debug!("added candidate {} to election {election_id}", candidate.id);
        return Ok(candidate);
    }

    fn load(&self, election_id: ElectionId) -> Result<Election> {
        return self
            .ledger
            .election(election_id)?
            .ok_or(Error::ElectionNotFound(election_id));
    }

    /// Derive the status at `now` and persist the automatic close of an expired election
    fn refresh(&self, election: &mut Election, now: DateTime<Utc>) -> Result<ElectionStatus> {
        let status = election.status_at(now);
        if status == ElectionStatus::ClosedAuto && election.is_active {
            self.ledger.set_election_active(election.id, false)?;
            election.is_active = false;
            info!(
                "election {} '{}' closed automatically, it ended at {}",
                election.id, election.title, election.end_date
            );
        }
        return Ok(status);
    }

    /// Load an election with its status recomputed against the clock
    pub fn election(&self, election_id: ElectionId) -> Result<(Election, ElectionStatus)> {
        let mut election = self.load(election_id)?;
        let status = self.refresh(&mut election, self.clock.now())?;
        return Ok((election, status));
    }

    pub fn election_status(&self, election_id: ElectionId) -> Result<ElectionStatus> {
        return Ok(self.election(election_id)?.1);
    }

    pub fn status_report(&self, election_id: ElectionId) -> Result<StatusReport> {
        let now = self.clock.now();
        let mut election = self.load(election_id)?;
        self.refresh(&mut election, now)?;
        return Ok(election.report_at(now));
    }

    /// Recompute every election and close the expired ones. Returns how many were closed.
    pub fn close_expired_elections(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut closed = 0;
        for mut election in self.ledger.elections()? {
            let was_active = election.is_active;
            self.refresh(&mut election, now)?;
            if was_active && !election.is_active {
                closed += 1;
            }
        }
        if closed > 0 {
            info!("closed {closed} expired elections");
        }
        return Ok(closed);
    }

    pub fn close_election(&self, election_id: ElectionId) -> Result<()> {
        self.load(election_id)?;
        self.ledger.set_election_active(election_id, false)?;
        info!("election {election_id} closed manually");
        return Ok(());
    }

    /// Reopen a manually closed election; refused once the end date has passed
    pub fn reopen_election(&self, election_id: ElectionId) -> Result<()> {
        let now = self.clock.now();
        let mut election = self.load(election_id)?;
        self.refresh(&mut election, now)?;
        if !election.can_reopen_at(now) {
            warn!("refused to reopen election {election_id}: end date has passed");
            return Err(Error::ReopenAfterExpiry);
        }
        self.ledger.set_election_active(election_id, true)?;
        info!("election {election_id} reopened");
        return Ok(());
    }

    /// Delete an election that has received no ballots
    pub fn delete_election(&self, election_id: ElectionId) -> Result<()> {
        self.load(election_id)?;
        match self.ledger.delete_election(election_id) {
            Ok(()) => {}
            Err(StoreError::Restricted { ballots }) => {
                return Err(Error::ElectionHasBallots(ballots))
            }
            Err(err) => return Err(err.into()),
        }
        info!("election {election_id} deleted");
        return Ok(());
    }

    /// Delete an election together with every ballot and cast record it holds
    pub fn purge_election(&self, election_id: ElectionId) -> Result<()> {
        self.load(election_id)?;
        self.ledger.purge_election(election_id)?;
        warn!("election {election_id} purged with all of its ballots and cast records");
        return Ok(());
    }

    /// Cast one vote. Eligibility is checked before any cryptographic work; the ballot, the
    /// cast record and the has-voted flag are then written as one unit. No ballot identifier
    /// is returned, so the caller has nothing to associate with the voter.
    pub fn cast_vote(
        &self,
        voter_id: VoterId,
        election_id: ElectionId,
        candidate_id: CandidateId,
    ) -> Result<()> {
        let result = self.try_cast_vote(voter_id, election_id, candidate_id);
        if let Err(err) = &result {
            warn!("rejected vote by voter {voter_id} in election {election_id}: {err}");
        }
        return result;
    }

    fn try_cast_vote(
        &self,
        voter_id: VoterId,
        election_id: ElectionId,
        candidate_id: CandidateId,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut election = self.load(election_id)?;
        let status = self.refresh(&mut election, now)?;
        if status != ElectionStatus::Open {
            return Err(Error::ElectionNotOpen(status));
        }
        if self.ledger.has_cast(voter_id, election_id)? {
            return Err(Error::AlreadyVoted);
        }
        let registered = self
            .ledger
            .candidates(election_id)?
            .iter()
            .any(|candidate| candidate.id == candidate_id);
        if !registered {
            return Err(Error::UnknownCandidate);
        }

        let payload = BallotPayload::new(election_id, candidate_id);
        let ciphertext = encrypt_ballot(&payload, &election.public_key)?;
        // Never earlier than the window, even when the start is not on a bucket boundary
        let cast_at = coarsen(now, self.config.ballot_time_granularity_secs)?
            .max(election.start_date);
        let vote_hash = compute_integrity_hash(&ciphertext, election_id, &cast_at);

        let ballot = NewBallot {
            election_id,
            encrypted_vote: ciphertext.to_envelope()?,
            vote_hash,
            timestamp: cast_at,
        };
        let record = NewCastRecord {
            voter_id,
            election_id,
            voted_at: now,
        };
        match self.ledger.commit_vote(ballot, record) {
            Ok(()) => {}
            // Lost a race against a concurrent submission by the same voter
            Err(StoreError::UniqueViolation(Constraint::CastRecord)) => {
                return Err(Error::AlreadyVoted)
            }
            Err(err) => return Err(err.into()),
        }
        info!("ballot accepted in election {election_id}");
        return Ok(());
    }

    /// Decrypt and count every ballot of the election. Refused when the stored key halves do
    /// not belong together, since every ballot would otherwise be excluded.
    pub fn tally_election(&self, election_id: ElectionId) -> Result<TallyResult> {
        let (election, status) = self.election(election_id)?;
        if !KeyPair::new(election.public_key, election.private_key).check_consistency() {
            return Err(CryptoError::MalformedKey(format!(
                "key halves of election {election_id} do not match"
            ))
            .into());
        }
        let candidates = self
            .ledger
            .candidates(election_id)?
            .iter()
            .map(|candidate| candidate.id)
            .collect::<Vec<CandidateId>>();
        let ballots = self.ledger.ballots(election_id)?;
        debug!(
            "tallying {} ballots of election {election_id} ({status})",
            ballots.len()
        );
        let result = tally_ballots(election_id, &candidates, &ballots, &election.private_key);
        info!(
            "tally of election {election_id}: {} counted, {} excluded",
            result.counted,
            result.exclusions.len()
        );
        return Ok(result);
    }

    pub fn stats(&self) -> Result<LedgerStats> {
        return Ok(self.ledger.stats()?);
    }
}

/// Truncate a timestamp to a multiple of the granularity
fn coarsen(at: DateTime<Utc>, granularity_secs: u32) -> Result<DateTime<Utc>> {
    let secs = at.timestamp();
    let floored = secs - secs.rem_euclid(i64::from(granularity_secs.max(1)));
    return Utc
        .timestamp_opt(floored, 0)
        .single()
        .ok_or_else(|| Error::Config("ballot timestamp out of range".into()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        keys::SecretKey,
        ledger::MemLedger,
        testing::{self, TEST_MODULUS_BITS},
        BigInt,
    };
    use chrono::Duration;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
    }

    fn ballot_box(clock: &ManualClock) -> BallotBox<MemLedger, &ManualClock> {
        let config = Config {
            modulus_bits: TEST_MODULUS_BITS,
            ..Config::default()
        };
        BallotBox::new(MemLedger::new(), clock, config)
    }

    /// An election open from `start()` for eight hours, with two candidates
    fn setup(bb: &BallotBox<MemLedger, &ManualClock>) -> (ElectionId, CandidateId, CandidateId) {
        let election = bb
            .create_election("Board", "Annual board vote", start(), start() + Duration::hours(8))
            .unwrap();
        let alice = bb.add_candidate(election.id, "Alice", "").unwrap();
        let bob = bb.add_candidate(election.id, "Bob", "").unwrap();
        (election.id, alice.id, bob.id)
    }

    #[test]
    fn test_create_election_rejects_inverted_window() {
        let clock = ManualClock::new(start());
        let bb = ballot_box(&clock);
        assert!(matches!(
            bb.create_election("x", "", start(), start() - Duration::seconds(1)),
            Err(Error::InvalidWindow)
        ));
        assert_eq!(bb.stats().unwrap().elections, 0);
    }

    #[test]
    fn test_created_keys_are_consistent() {
        let clock = ManualClock::new(start());
        let bb = ballot_box(&clock);
        let (election_id, _, _) = setup(&bb);
        let (election, status) = bb.election(election_id).unwrap();
        assert_eq!(status, ElectionStatus::Open);
        assert_eq!(election.public_key.get_p(), election.private_key.get_p());
        assert!(election.public_key.validate().is_ok());
        assert!(election.private_key.validate().is_ok());
        assert_eq!(election.created_at, start());
    }

    #[test]
    fn test_cast_and_tally() {
        let clock = ManualClock::new(start() + Duration::minutes(5));
        let bb = ballot_box(&clock);
        let (election_id, alice, bob) = setup(&bb);

        bb.cast_vote(1, election_id, alice).unwrap();
        bb.cast_vote(2, election_id, bob).unwrap();
        bb.cast_vote(3, election_id, alice).unwrap();

        let result = bb.tally_election(election_id).unwrap();
        assert_eq!(result.count(alice), 2);
        assert_eq!(result.count(bob), 1);
        assert_eq!(result.counted, 3);
        assert!(result.exclusions.is_empty());
    }

    #[test]
    fn test_rejections() {
        let clock = ManualClock::new(start() + Duration::minutes(5));
        let bb = ballot_box(&clock);
        let (election_id, alice, _) = setup(&bb);

        assert!(matches!(
            bb.cast_vote(1, 404, alice),
            Err(Error::ElectionNotFound(404))
        ));
        assert!(matches!(
            bb.cast_vote(1, election_id, 999),
            Err(Error::UnknownCandidate)
        ));
        bb.cast_vote(1, election_id, alice).unwrap();
        assert!(matches!(
            bb.cast_vote(1, election_id, alice),
            Err(Error::AlreadyVoted)
        ));
        assert_eq!(bb.stats().unwrap().ballots, 1);
        assert_eq!(bb.stats().unwrap().cast_records, 1);
    }

    /// A candidate of another election is not on this ballot
    #[test]
    fn test_candidate_of_other_election() {
        let clock = ManualClock::new(start() + Duration::minutes(5));
        let bb = ballot_box(&clock);
        let (first, _, _) = setup(&bb);
        let (_, foreign, _) = setup(&bb);
        assert!(matches!(
            bb.cast_vote(1, first, foreign),
            Err(Error::UnknownCandidate)
        ));
    }

    #[test]
    fn test_ballot_timestamp_is_coarsened() {
        let now = start() + Duration::minutes(37) + Duration::seconds(12);
        let clock = ManualClock::new(now);
        let bb = ballot_box(&clock);
        let (election_id, alice, _) = setup(&bb);
        bb.cast_vote(1, election_id, alice).unwrap();

        let ballot = &bb.ledger().ballots(election_id).unwrap()[0];
        let record = &bb.ledger().cast_records(election_id).unwrap()[0];
        assert_eq!(ballot.timestamp, start());
        assert_eq!(record.voted_at, now);

        let ciphertext = crate::cipher::Ciphertext::from_envelope(&ballot.encrypted_vote).unwrap();
        assert!(ballot
            .vote_hash
            .verify(&ciphertext, election_id, &ballot.timestamp));
    }

    /// A window opening at half past still stamps its first ballots inside the window
    #[test]
    fn test_ballot_timestamp_within_window() {
        let opens = start() + Duration::minutes(30);
        let clock = ManualClock::new(opens + Duration::minutes(15));
        let bb = ballot_box(&clock);
        let election = bb
            .create_election("Late start", "", opens, opens + Duration::hours(3))
            .unwrap();
        let candidate = bb.add_candidate(election.id, "Alice", "").unwrap();
        bb.cast_vote(1, election.id, candidate.id).unwrap();
        clock.advance(Duration::hours(1));
        bb.cast_vote(2, election.id, candidate.id).unwrap();

        let ballots = bb.ledger().ballots(election.id).unwrap();
        let mut timestamps = ballots.iter().map(|ballot| ballot.timestamp).collect::<Vec<_>>();
        timestamps.sort();
        assert_eq!(timestamps, vec![opens, start() + Duration::hours(1)]);
        for ballot in ballots.iter() {
            let ciphertext =
                crate::cipher::Ciphertext::from_envelope(&ballot.encrypted_vote).unwrap();
            assert!(ballot
                .vote_hash
                .verify(&ciphertext, election.id, &ballot.timestamp));
        }
    }

    #[test]
    fn test_tally_rejects_mismatched_keys() {
        let clock = ManualClock::new(start() + Duration::minutes(5));
        let bb = ballot_box(&clock);
        let (public_key, private_key) = testing::keypair().split();
        let other_x = private_key.get_x().wrapping_add(&BigInt::ONE);
        let election = bb
            .ledger()
            .insert_election(NewElection {
                title: "Restored".into(),
                description: String::new(),
                start_date: start(),
                end_date: start() + Duration::hours(8),
                public_key,
                private_key: SecretKey::new(*private_key.get_p(), other_x),
                created_at: start(),
            })
            .unwrap();
        assert!(matches!(
            bb.tally_election(election.id),
            Err(Error::Crypto(CryptoError::MalformedKey(_)))
        ));
    }

    #[test]
    fn test_lifecycle() {
        let clock = ManualClock::new(start() - Duration::hours(1));
        let bb = ballot_box(&clock);
        let (election_id, alice, _) = setup(&bb);

        assert_eq!(bb.election_status(election_id).unwrap(), ElectionStatus::Scheduled);
        assert!(matches!(
            bb.cast_vote(1, election_id, alice),
            Err(Error::ElectionNotOpen(ElectionStatus::Scheduled))
        ));

        clock.set(start() + Duration::hours(1));
        bb.close_election(election_id).unwrap();
        assert_eq!(
            bb.election_status(election_id).unwrap(),
            ElectionStatus::ClosedManual
        );
        assert!(matches!(
            bb.cast_vote(1, election_id, alice),
            Err(Error::ElectionNotOpen(ElectionStatus::ClosedManual))
        ));
        bb.reopen_election(election_id).unwrap();
        bb.cast_vote(1, election_id, alice).unwrap();

        clock.set(start() + Duration::hours(9));
        assert_eq!(bb.close_expired_elections().unwrap(), 1);
        assert_eq!(bb.close_expired_elections().unwrap(), 0);
        assert_eq!(bb.election_status(election_id).unwrap(), ElectionStatus::ClosedAuto);
        assert!(!bb.election(election_id).unwrap().0.is_active);
        assert!(matches!(
            bb.reopen_election(election_id),
            Err(Error::ReopenAfterExpiry)
        ));
        assert_eq!(bb.tally_election(election_id).unwrap().count(alice), 1);
    }

    #[test]
    fn test_status_report() {
        let clock = ManualClock::new(start() + Duration::hours(2));
        let bb = ballot_box(&clock);
        let (election_id, _, _) = setup(&bb);
        let report = bb.status_report(election_id).unwrap();
        assert_eq!(report.status, ElectionStatus::Open);
        assert!(matches!(
            bb.status_report(404),
            Err(Error::ElectionNotFound(404))
        ));
    }

    #[test]
    fn test_delete_election() {
        let clock = ManualClock::new(start() + Duration::minutes(5));
        let bb = ballot_box(&clock);
        let (empty, _, _) = setup(&bb);
        let (used, alice, _) = setup(&bb);
        bb.cast_vote(1, used, alice).unwrap();

        bb.delete_election(empty).unwrap();
        assert!(matches!(
            bb.election_status(empty),
            Err(Error::ElectionNotFound(_))
        ));
        assert!(matches!(
            bb.delete_election(used),
            Err(Error::ElectionHasBallots(1))
        ));
        bb.purge_election(used).unwrap();
        assert_eq!(bb.stats().unwrap(), LedgerStats::default());
    }

    #[test]
    fn test_coarsen() {
        let at = Utc.with_ymd_and_hms(2025, 6, 2, 14, 37, 12).unwrap();
        assert_eq!(
            coarsen(at, 3600).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap()
        );
        assert_eq!(
            coarsen(at, 60).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 2, 14, 37, 0).unwrap()
        );
        assert_eq!(coarsen(at, 1).unwrap(), at);
    }
}
