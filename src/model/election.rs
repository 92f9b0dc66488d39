use std::fmt::Display;

use chrono::{DateTime, Utc};
use rocket::form::FromFormField;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::id::{CandidateId, ElectionId, Id};

pub const MIN_TITLE_LEN: usize = 3;
pub const MIN_DESCRIPTION_LEN: usize = 10;
pub const MIN_CANDIDATE_NAME_LEN: usize = 2;
pub const MIN_PLATFORM_LEN: usize = 10;
/// Both creation and activation require at least this many candidates.
pub const MIN_CANDIDATES: usize = 2;

/// States in the election lifecycle. Progress is strictly forward.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    /// Under construction, only visible to admins. Candidates may change.
    Draft,
    /// Candidates locked, voting open within the election's time window.
    Active,
    /// Voting closed, results visible to all. Terminal.
    Completed,
}

impl ElectionStatus {
    /// The only state reachable from this one, if any.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Draft => Some(Self::Active),
            Self::Active => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    /// The state this one is reached from, if any.
    pub fn predecessor(self) -> Option<Self> {
        match self {
            Self::Draft => None,
            Self::Active => Some(Self::Draft),
            Self::Completed => Some(Self::Active),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl Display for ElectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An election, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Election {
    pub id: ElectionId,
    pub title: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: ElectionStatus,
    pub allow_multiple_votes: bool,
    pub created_at: DateTime<Utc>,
}

impl Election {
    /// Is `now` inside the inclusive `[start_date, end_date]` window?
    pub fn is_within_voting_window(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }
}

/// A candidate standing in exactly one election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: CandidateId,
    pub election_id: ElectionId,
    pub name: String,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// An election together with its candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDetails {
    #[serde(flatten)]
    pub election: Election,
    pub candidates: Vec<Candidate>,
}

/// One row of the public election calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: ElectionId,
    pub title: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
}

impl From<&Election> for ScheduleEntry {
    fn from(election: &Election) -> Self {
        Self {
            id: election.id,
            title: election.title.clone(),
            description: election.description.clone(),
            start_date: election.start_date,
        }
    }
}

/// An election specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionSpec {
    pub title: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub allow_multiple_votes: bool,
    pub candidates: Vec<CandidateSpec>,
}

/// A candidate specification, part of an [`ElectionSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSpec {
    pub name: String,
    pub platform: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

fn trimmed_len(s: &str) -> usize {
    s.trim().chars().count()
}

impl ElectionSpec {
    /// Check every creation rule against the time `now`, reporting all
    /// problems at once.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        let mut problems = Vec::new();

        if trimmed_len(&self.title) < MIN_TITLE_LEN {
            problems.push(format!(
                "title must be at least {MIN_TITLE_LEN} characters"
            ));
        }
        if trimmed_len(&self.description) < MIN_DESCRIPTION_LEN {
            problems.push(format!(
                "description must be at least {MIN_DESCRIPTION_LEN} characters"
            ));
        }
        if self.end_date <= self.start_date {
            problems.push("end date must be after start date".to_string());
        }
        if self.start_date <= now {
            problems.push("start date must be in the future".to_string());
        }
        if self.end_date <= now {
            problems.push("end date must be in the future".to_string());
        }
        if self.candidates.len() < MIN_CANDIDATES {
            problems.push(format!(
                "at least {MIN_CANDIDATES} candidates are required, got {}",
                self.candidates.len()
            ));
        }
        for (i, candidate) in self.candidates.iter().enumerate() {
            if trimmed_len(&candidate.name) < MIN_CANDIDATE_NAME_LEN {
                problems.push(format!(
                    "candidate {} name must be at least {MIN_CANDIDATE_NAME_LEN} characters",
                    i + 1
                ));
            }
            if trimmed_len(&candidate.platform) < MIN_PLATFORM_LEN {
                problems.push(format!(
                    "candidate {} platform must be at least {MIN_PLATFORM_LEN} characters",
                    i + 1
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(problems.join("; ")))
        }
    }

    /// Convert this spec into a draft election and its candidates, with fresh IDs.
    /// Does not validate; call [`ElectionSpec::validate`] first.
    pub fn into_election(self, created_at: DateTime<Utc>) -> (Election, Vec<Candidate>) {
        let election = Election {
            id: Id::new(),
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            start_date: self.start_date,
            end_date: self.end_date,
            status: ElectionStatus::Draft,
            allow_multiple_votes: self.allow_multiple_votes,
            created_at,
        };
        let candidates = self
            .candidates
            .into_iter()
            .map(|spec| Candidate {
                id: Id::new(),
                election_id: election.id,
                name: spec.name.trim().to_string(),
                platform: spec.platform.trim().to_string(),
                image_url: spec.image_url.filter(|url| !url.trim().is_empty()),
            })
            .collect();
        (election, candidates)
    }
}

/// Example data for tests.
#[cfg(test)]
pub(crate) mod examples {
    use super::*;

    use chrono::Duration;

    impl CandidateSpec {
        pub fn example(name: &str) -> Self {
            Self {
                name: name.to_string(),
                platform: format!("{name} promises better coffee in the library"),
                image_url: None,
            }
        }
    }

    impl ElectionSpec {
        /// A valid spec for an election opening a day after `now` and running a week.
        pub fn example(now: DateTime<Utc>) -> Self {
            Self {
                title: "Student Council President".to_string(),
                description: "Annual election for the student council president".to_string(),
                start_date: now + Duration::days(1),
                end_date: now + Duration::days(8),
                allow_multiple_votes: false,
                candidates: vec![CandidateSpec::example("Alice"), CandidateSpec::example("Bob")],
            }
        }

        pub fn multi_vote_example(now: DateTime<Utc>) -> Self {
            Self {
                title: "Club Committee".to_string(),
                description: "Pick every committee member you support".to_string(),
                allow_multiple_votes: true,
                candidates: vec![
                    CandidateSpec::example("Alice"),
                    CandidateSpec::example("Bob"),
                    CandidateSpec::example("Carol"),
                ],
                ..Self::example(now)
            }
        }
    }
}
