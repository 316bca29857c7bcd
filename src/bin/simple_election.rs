//! A sample election procedure, run against the in-memory ledger and the system clock
use chrono::{Duration, Utc};
use elgamal_ballot::{
    logging::init_logging, BallotBox, Config, Error, ElectionStatus, MemLedger, SystemClock,
};
use log::info;
use rand::{rngs::OsRng, Rng};
use std::collections::BTreeMap;

const VOTERS: u64 = 10;
const CANDIDATES: [&str; 3] = ["Alice", "Bob", "Carol"];

fn main() -> Result<(), Error> {
    let config = Config::load()?;
    init_logging(&config.log_config)?;
    let ballot_box = BallotBox::new(MemLedger::new(), SystemClock, config);

    // The window opens a minute ago so that votes are accepted right away
    let now = Utc::now();
    let election = ballot_box.create_election(
        "Committee chair",
        "Choose the chair for the coming year",
        now - Duration::minutes(1),
        now + Duration::hours(1),
    )?;
    let mut candidates = vec![];
    for name in CANDIDATES {
        candidates.push(ballot_box.add_candidate(election.id, name, "")?.id);
    }

    // Every voter picks a random candidate; keep the true tally for verification later
    let mut true_tally = BTreeMap::new();
    for voter_id in 1..=VOTERS {
        let choice = candidates[OsRng.gen_range(0..candidates.len())];
        ballot_box.cast_vote(voter_id, election.id, choice)?;
        *true_tally.entry(choice).or_insert(0u64) += 1;
    }

    // A second vote by the same voter is refused and leaves the ledger untouched
    match ballot_box.cast_vote(1, election.id, candidates[0]) {
        Err(Error::AlreadyVoted) => info!("voter 1 was refused a second ballot"),
        other => panic!("a second ballot must be refused, got {other:?}"),
    }

    ballot_box.close_election(election.id)?;
    let status = ballot_box.election_status(election.id)?;
    assert_eq!(status, ElectionStatus::ClosedManual);

    let result = ballot_box.tally_election(election.id)?;
    for (name, candidate_id) in CANDIDATES.iter().zip(candidates.iter()) {
        println!("{name}: {}", result.count(*candidate_id));
        if result.count(*candidate_id) != true_tally.get(candidate_id).copied().unwrap_or(0) {
            panic!("the final tally is incorrect!");
        }
    }
    println!("{:?}", ballot_box.stats()?);
    return Ok(());
}
