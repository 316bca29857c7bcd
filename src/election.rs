//! Election records and the lazily derived election status
use crate::{
    keys::{PublicKey, SecretKey},
    CandidateId, ElectionId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    Scheduled,
    Open,
    /// The end date has passed
    ClosedAuto,
    /// An administrator closed the election inside its window
    ClosedManual,
}

impl Display for ElectionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Scheduled => "scheduled",
            Self::Open => "open",
            Self::ClosedAuto => "closed: end date passed",
            Self::ClosedManual => "closed manually",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    pub id: ElectionId,
    pub title: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub public_key: PublicKey,
    pub private_key: SecretKey,
    pub created_at: DateTime<Utc>,
}

impl Election {
    /// Derive the status from the clock reading. Time-based expiry wins over the manual flag,
    /// so an expired election reports ClosedAuto whether or not it was closed by hand first.
    pub fn status_at(&self, now: DateTime<Utc>) -> ElectionStatus {
        if now > self.end_date {
            return ElectionStatus::ClosedAuto;
        }
        if !self.is_active {
            return ElectionStatus::ClosedManual;
        }
        if now < self.start_date {
            return ElectionStatus::Scheduled;
        }
        return ElectionStatus::Open;
    }

    /// Votes are accepted on [start_date, end_date], both ends inclusive
    pub fn accepts_votes_at(&self, now: DateTime<Utc>) -> bool {
        return self.status_at(now) == ElectionStatus::Open;
    }

    /// Manual reopening is only possible before the end date
    pub fn can_reopen_at(&self, now: DateTime<Utc>) -> bool {
        return now <= self.end_date;
    }

    pub fn report_at(&self, now: DateTime<Utc>) -> StatusReport {
        return StatusReport {
            election_id: self.id,
            status: self.status_at(now),
            is_active: self.is_active,
            is_started: now >= self.start_date,
            is_ended: now > self.end_date,
            can_vote: self.accepts_votes_at(now),
            now,
            start_date: self.start_date,
            end_date: self.end_date,
        };
    }
}

/// Everything needed to insert an election; the ledger assigns the id
#[derive(Debug, Clone)]
pub struct NewElection {
    pub title: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub public_key: PublicKey,
    pub private_key: SecretKey,
    pub created_at: DateTime<Utc>,
}

/// Diagnostic snapshot of an election's window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub election_id: ElectionId,
    pub status: ElectionStatus,
    pub is_active: bool,
    pub is_started: bool,
    pub is_ended: bool,
    pub can_vote: bool,
    pub now: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub description: String,
    pub election_id: ElectionId,
}
