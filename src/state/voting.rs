//! Vote round state machine: tallies, voter dedup, and winner resolution.

use std::collections::HashSet;
use std::fmt;

use tracing::warn;

use crate::dto::overlay::{OverlayOption, VotingUpdate};

/// State of the (at most one) audience vote round.
///
/// Tallies are 0-indexed internally; the 1-indexed numbering chat users and
/// the overlay see exists only at the edges. Every mutation is a single
/// synchronous step, so interleaved suspension points elsewhere cannot
/// observe a vote half-applied.
#[derive(Debug, Default)]
pub struct VotePoll {
    active: bool,
    option_names: Vec<String>,
    tally: Vec<u32>,
    voters: HashSet<String>,
}

/// Outcome of a closed round with at least one vote cast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Exactly one option held the maximum tally.
    Winner {
        /// 0-indexed option position.
        index: usize,
        /// Option display name.
        name: String,
        /// Vote count of the winning option.
        votes: u32,
    },
    /// Several options shared the maximum tally.
    Tie {
        /// The tied options as (0-indexed position, name) pairs.
        options: Vec<(usize, String)>,
        /// The shared maximum vote count.
        votes: u32,
    },
}

impl fmt::Display for VoteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteOutcome::Winner { index, name, votes } => {
                write!(f, "{}. {name} ({votes} votes)", index + 1)
            }
            VoteOutcome::Tie { options, votes } => {
                let names = options
                    .iter()
                    .map(|(index, name)| format!("{}. {name}", index + 1))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "Tie between: {names} ({votes} votes each)")
            }
        }
    }
}

/// Pad or truncate `names` to exactly `count` entries, warning on mismatch.
/// Missing entries become `"Option N"` with 1-indexed numbering.
pub fn normalize_option_names(count: usize, mut names: Vec<String>) -> Vec<String> {
    if names.len() != count {
        warn!(
            provided = names.len(),
            expected = count,
            "option name count does not match option count; padding/truncating"
        );
    }
    while names.len() < count {
        names.push(format!("Option {}", names.len() + 1));
    }
    names.truncate(count);
    names
}

impl VotePoll {
    /// Fresh, inactive poll.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a round is currently accepting votes.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Open a round with `option_count` options, resetting tallies and voters.
    pub fn activate(&mut self, option_count: usize, names: Vec<String>) {
        self.option_names = normalize_option_names(option_count, names);
        self.tally = vec![0; option_count];
        self.voters.clear();
        self.active = true;
    }

    /// Record a vote for the 0-indexed `choice`.
    ///
    /// Accepted iff a round is active, the choice is in range, and `voter`
    /// has not voted this round. Returns whether the vote was counted.
    pub fn process_vote(&mut self, voter: &str, choice: usize) -> bool {
        if !self.active || choice >= self.tally.len() || self.voters.contains(voter) {
            return false;
        }
        self.tally[choice] += 1;
        self.voters.insert(voter.to_string());
        true
    }

    /// Current tallies in ballot order.
    pub fn vote_counts(&self) -> Vec<u32> {
        self.tally.clone()
    }

    /// Close the round, computing the outcome before clearing state.
    ///
    /// Returns `None` when no votes were cast (or no round was active); no
    /// result should be broadcast in that case.
    pub fn deactivate(&mut self) -> Option<VoteOutcome> {
        let outcome = self.winning_outcome();
        self.active = false;
        self.voters.clear();
        self.tally.clear();
        self.option_names.clear();
        outcome
    }

    /// Snapshot for the overlay and tally push.
    pub fn snapshot(&self) -> VotingUpdate {
        let options = self
            .option_names
            .iter()
            .zip(self.tally.iter())
            .enumerate()
            .map(|(index, (name, votes))| OverlayOption {
                index: index + 1,
                name: name.clone(),
                votes: *votes,
            })
            .collect();
        VotingUpdate {
            active: self.active,
            options,
            total_votes: self.tally.iter().sum(),
        }
    }

    fn winning_outcome(&self) -> Option<VoteOutcome> {
        let max = *self.tally.iter().max()?;
        if max == 0 {
            return None;
        }

        let leaders: Vec<usize> = self
            .tally
            .iter()
            .enumerate()
            .filter(|(_, votes)| **votes == max)
            .map(|(index, _)| index)
            .collect();

        match leaders.as_slice() {
            [index] => Some(VoteOutcome::Winner {
                index: *index,
                name: self.option_names[*index].clone(),
                votes: max,
            }),
            _ => Some(VoteOutcome::Tie {
                options: leaders
                    .into_iter()
                    .map(|index| (index, self.option_names[index].clone()))
                    .collect(),
                votes: max,
            }),
        }
    }
}
