//! A CLI tool for auditing the vote ledger of a deployment.
//! It recomputes every election's tally from the raw votes and checks that the
//! ledger still satisfies the engine's invariants.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};

use clap::{Arg, ArgAction, ArgMatches, Command};

use election_backend::{
    model::{Candidate, CandidateId, Election, ElectionStatus, UniquenessKey, Vote, VoteId},
    store::{ElectionStore, MongoStore, ReadConsistency},
};

const PROGRAM_NAME: &str = "audit-cli";

const ABOUT_TEXT: &str = "Audit the vote ledger of every election.

EXIT CODES:
     0: Audit passed.
   255: Ran successfully, but problems were found.
 Other: Error.";

const DB_URI: &str = "DB_URI";
const DB_NAME: &str = "DB_NAME";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(DB_URI)
                .help("MongoDB connection string, e.g. mongodb://localhost:27017")
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(
            Arg::new(DB_NAME)
                .long("db")
                .help("Name of the database holding the elections")
                .action(ArgAction::Set)
                .default_value("elections"),
        )
}

/// Something wrong with the ledger of one election.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Problem {
    /// A vote names a candidate that does not stand in its election.
    ForeignCandidate { vote: VoteId, candidate: CandidateId },
    /// Two or more votes occupy the same uniqueness key.
    DuplicateKey { key: String, votes: Vec<VoteId> },
    /// A vote exists although the election never opened.
    VoteInDraft { vote: VoteId },
    /// A vote was recorded outside the voting window.
    OutsideWindow { vote: VoteId },
    /// The store's own count disagrees with the raw votes.
    CountMismatch {
        candidate: CandidateId,
        stored: u64,
        recounted: u64,
    },
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForeignCandidate { vote, candidate } => {
                write!(f, "vote {vote} is for candidate {candidate}, who is not standing")
            }
            Self::DuplicateKey { key, votes } => {
                let votes: Vec<_> = votes.iter().map(ToString::to_string).collect();
                write!(f, "key {key} is held by votes {}", votes.join(", "))
            }
            Self::VoteInDraft { vote } => write!(f, "vote {vote} was cast in a draft election"),
            Self::OutsideWindow { vote } => {
                write!(f, "vote {vote} was cast outside the voting window")
            }
            Self::CountMismatch {
                candidate,
                stored,
                recounted,
            } => write!(
                f,
                "candidate {candidate}: store counts {stored}, votes add up to {recounted}"
            ),
        }
    }
}

/// The audit result for one election.
#[derive(Debug)]
struct ElectionAudit {
    election: Election,
    /// Recounted votes per candidate name, zero-filled.
    counts: BTreeMap<String, u64>,
    problems: Vec<Problem>,
}

impl Display for ElectionAudit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} ({}, {})",
            self.election.title, self.election.id, self.election.status
        )?;
        for (name, count) in &self.counts {
            writeln!(f, "  {name}: {count}")?;
        }
        for problem in &self.problems {
            writeln!(f, "  PROBLEM: {problem}")?;
        }
        Ok(())
    }
}

/// Check one election's votes against its candidates and its rules.
fn check_votes(
    election: &Election,
    candidates: &[Candidate],
    votes: &[Vote],
    stored_counts: &HashMap<CandidateId, u64>,
) -> ElectionAudit {
    let mut problems = Vec::new();
    let mut recount: HashMap<CandidateId, u64> = HashMap::new();
    let mut keys: BTreeMap<String, Vec<VoteId>> = BTreeMap::new();

    for vote in votes {
        if !candidates.iter().any(|c| c.id == vote.candidate_id) {
            problems.push(Problem::ForeignCandidate {
                vote: vote.id,
                candidate: vote.candidate_id,
            });
        }
        if election.status == ElectionStatus::Draft {
            problems.push(Problem::VoteInDraft { vote: vote.id });
        } else if !election.is_within_voting_window(vote.cast_at) {
            problems.push(Problem::OutsideWindow { vote: vote.id });
        }
        *recount.entry(vote.candidate_id).or_default() += 1;
        let key = UniquenessKey::for_vote(election, &vote.voter_id, vote.candidate_id);
        keys.entry(key.storage_key()).or_default().push(vote.id);
    }

    for (key, holders) in keys {
        if holders.len() > 1 {
            problems.push(Problem::DuplicateKey {
                key,
                votes: holders,
            });
        }
    }

    for candidate in candidates {
        let stored = stored_counts.get(&candidate.id).copied().unwrap_or(0);
        let recounted = recount.get(&candidate.id).copied().unwrap_or(0);
        if stored != recounted {
            problems.push(Problem::CountMismatch {
                candidate: candidate.id,
                stored,
                recounted,
            });
        }
    }

    let counts = candidates
        .iter()
        .map(|c| (c.name.clone(), recount.get(&c.id).copied().unwrap_or(0)))
        .collect();
    ElectionAudit {
        election: election.clone(),
        counts,
        problems,
    }
}

/// Audit every election in the store, oldest first.
async fn audit(store: &dyn ElectionStore) -> election_backend::error::Result<Vec<ElectionAudit>> {
    let mut elections = store.list().await?;
    elections.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let mut audits = Vec::with_capacity(elections.len());
    for election in elections {
        let candidates = store.candidates(election.id).await?;
        let votes = store.votes(election.id).await?;
        let stored = store
            .count_votes_by_candidate(election.id, ReadConsistency::Strong)
            .await?;
        audits.push(check_votes(&election, &candidates, &votes, &stored));
    }
    Ok(audits)
}

/// Run the audit and print a report. Returns the exit code.
async fn run(args: &ArgMatches) -> u8 {
    // Both arguments are required or defaulted, so clap guarantees them.
    let (Some(uri), Some(db_name)) = (
        args.get_one::<String>(DB_URI),
        args.get_one::<String>(DB_NAME),
    ) else {
        println!("Missing arguments");
        return 2;
    };

    let store = match MongoStore::connect(uri, db_name).await {
        Ok(store) => store,
        Err(e) => {
            println!("Failed to connect to database: {e}");
            return 1;
        }
    };
    let audits = match audit(&store).await {
        Ok(audits) => audits,
        Err(e) => {
            println!("Audit failed: {e}");
            return 1;
        }
    };

    for audit in &audits {
        println!("{audit}");
    }
    let problems: usize = audits.iter().map(|a| a.problems.len()).sum();
    if problems == 0 {
        println!("Audited {} elections, no problems found", audits.len());
        0
    } else {
        println!("Audited {} elections, found {problems} problems", audits.len());
        255
    }
}

#[rocket::main]
async fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args).await;
    std::process::exit(exit_code.into())
}
