use tokio::sync::oneshot;

use soulprint_core::types::{CommitEntry, Did, VoteRecord};

/// Lifecycle of one proposal round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    Proposed,
    Voting,
    Committed,
    Aborted,
    TimedOut,
}

/// How a round ended, delivered to the waiting proposer.
#[derive(Debug)]
pub enum RoundOutcome {
    Committed(CommitEntry),
    /// A conflicting commit arrived mid-round; `kept` is the DID that won.
    Aborted { kept: Did },
}

/// Proposer-side state for an in-flight round. Only the proposing node holds
/// rounds; voters answer proposals statelessly.
pub struct Round {
    pub status: RoundStatus,
    pub did: Did,
    pub accepts: Vec<VoteRecord>,
    pub rejects: Vec<VoteRecord>,
    pub opened_ms: i64,
    /// Completes the `propose()` future. Taken exactly once.
    pub done: Option<oneshot::Sender<RoundOutcome>>,
}

impl Round {
    pub fn has_vote_from(&self, voter: &Did) -> bool {
        self.accepts.iter().chain(self.rejects.iter()).any(|v| &v.voter == voter)
    }
}

/// Accepting votes required to commit: `ceil(2 · peers / 3)`.
pub fn quorum_for(min_peers: usize) -> usize {
    (2 * min_peers + 2) / 3
}
