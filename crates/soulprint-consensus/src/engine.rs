//! Round-based agreement that a nullifier maps to exactly one DID.
//!
//! The engine is an owned state machine: transport goes through the injected
//! [`Broadcast`] object, proof checking through the injected
//! [`ProofVerifier`], and observers get typed [`ConsensusEvent`]s. Rounds
//! exist only on the proposing node; voters answer proposals statelessly and
//! commits converge through the deterministic tie-break.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use soulprint_core::constants::{PROTOCOL_HASH_HEX, ROUND_TIMEOUT_MS};
use soulprint_core::error::SoulprintError;
use soulprint_core::time::{now_ms, now_seconds};
use soulprint_core::types::{CommitEntry, Did, Nullifier, VoteChoice, VoteRecord};
use soulprint_crypto::{sha256, NodeKeypair, ProofVerifier};
use soulprint_gossip::{
    verify_vote_record, Broadcast, CommitMsg, GossipMessage, PeerBook, ProposeMsg, VoteMsg,
};

use crate::round::{quorum_for, Round, RoundOutcome, RoundStatus};

#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Voting peers expected in the fleet; 0 = single-node mode.
    pub min_peers: usize,
    pub round_timeout_ms: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_peers: 0,
            round_timeout_ms: ROUND_TIMEOUT_MS,
        }
    }
}

/// Typed observer notifications.
#[derive(Debug, Clone)]
pub enum ConsensusEvent {
    Committed(CommitEntry),
    Conflict {
        nullifier: Nullifier,
        kept: Did,
        rejected: Did,
    },
    RoundTimedOut {
        nullifier: Nullifier,
    },
    Imported {
        count: usize,
    },
}

type Observer = Box<dyn Fn(&ConsensusEvent) + Send + Sync>;

/// Bounded replay guard over message hashes.
struct SeenSet {
    set: HashSet<String>,
    order: VecDeque<String>,
    cap: usize,
}

impl SeenSet {
    fn new(cap: usize) -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    /// Insert; false if already present.
    fn insert(&mut self, hash: String) -> bool {
        if !self.set.insert(hash.clone()) {
            return false;
        }
        self.order.push_back(hash);
        while self.order.len() > self.cap {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
        true
    }
}

pub struct NullifierConsensus {
    keypair: Arc<NodeKeypair>,
    config: ConsensusConfig,
    peers: Arc<PeerBook>,
    verifier: Arc<dyn ProofVerifier>,
    broadcaster: Arc<dyn Broadcast>,
    committed: RwLock<HashMap<Nullifier, CommitEntry>>,
    in_flight: Mutex<HashMap<Nullifier, Round>>,
    seen: Mutex<SeenSet>,
    observer: Observer,
}

impl NullifierConsensus {
    pub fn new(
        keypair: Arc<NodeKeypair>,
        config: ConsensusConfig,
        peers: Arc<PeerBook>,
        verifier: Arc<dyn ProofVerifier>,
        broadcaster: Arc<dyn Broadcast>,
    ) -> Self {
        Self {
            keypair,
            config,
            peers,
            verifier,
            broadcaster,
            committed: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            seen: Mutex::new(SeenSet::new(10_000)),
            observer: Box::new(|_| {}),
        }
    }

    /// Install the event observer. Call before sharing the engine.
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    fn emit(&self, event: ConsensusEvent) {
        (self.observer)(&event);
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn is_registered(&self, nullifier: &Nullifier) -> bool {
        self.committed.read().expect("committed lock").contains_key(nullifier)
    }

    pub fn get(&self, nullifier: &Nullifier) -> Option<CommitEntry> {
        self.committed.read().expect("committed lock").get(nullifier).cloned()
    }

    pub fn len(&self) -> usize {
        self.committed.read().expect("committed lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All committed entries (for sync pages and persistence).
    pub fn snapshot(&self) -> Vec<CommitEntry> {
        self.committed.read().expect("committed lock").values().cloned().collect()
    }

    /// `sha256` over the sorted committed nullifier keys: the anti-entropy
    /// comparison value. Every node computes it identically.
    pub fn state_hash(&self) -> String {
        let mut keys: Vec<String> = self
            .committed
            .read()
            .expect("committed lock")
            .keys()
            .map(|n| n.to_hex())
            .collect();
        keys.sort();
        hex::encode(sha256(keys.join(",").as_bytes()))
    }

    // ── Propose ──────────────────────────────────────────────────────────────

    /// Drive a nullifier registration to commit.
    ///
    /// Idempotent for already-committed nullifiers; fails with `InvalidProof`
    /// before any round is opened, `QuorumNotReached` on timeout (retryable),
    /// or `Conflict` if a competing commit lands mid-round.
    pub async fn propose(
        &self,
        nullifier: Nullifier,
        did: Did,
        zk_proof: &str,
    ) -> Result<CommitEntry, SoulprintError> {
        if let Some(existing) = self.get(&nullifier) {
            return Ok(existing);
        }

        // CPU-bound proof check off the event loop.
        let verifier = Arc::clone(&self.verifier);
        let proof = zk_proof.to_string();
        let signals = vec![nullifier.to_hex(), did.to_string()];
        let valid = tokio::task::spawn_blocking(move || verifier.verify_proof(&proof, &signals))
            .await
            .map_err(|e| SoulprintError::Storage(e.to_string()))?;
        if !valid {
            return Err(SoulprintError::InvalidProof);
        }

        let self_vote = self.make_vote(&nullifier, VoteChoice::Accept)?;

        if self.config.min_peers == 0 {
            let entry = self.build_entry(nullifier, did, vec![self_vote]);
            self.insert_committed(entry.clone());
            self.broadcast_commit(&entry);
            info!(nullifier = %entry.nullifier, did = %entry.did, "nullifier committed (single-node)");
            return Ok(entry);
        }

        let quorum = quorum_for(self.config.min_peers);
        let (done_tx, done_rx) = oneshot::channel();
        {
            let mut rounds = self.in_flight.lock().expect("in_flight lock");
            if let Some(open) = rounds.get(&nullifier) {
                return Err(SoulprintError::Conflict {
                    kept: open.did.to_string(),
                });
            }
            rounds.insert(
                nullifier,
                Round {
                    status: RoundStatus::Proposed,
                    did: did.clone(),
                    accepts: vec![self_vote],
                    rejects: Vec::new(),
                    opened_ms: now_ms(),
                    done: Some(done_tx),
                },
            );
        }

        let mut propose = ProposeMsg {
            protocol_hash: PROTOCOL_HASH_HEX.clone(),
            nullifier,
            did: did.clone(),
            zk_proof: zk_proof.to_string(),
            proposer_did: self.keypair.did.clone(),
            ts: now_seconds(),
            signature: String::new(),
        };
        propose.sign(&self.keypair)?;
        self.broadcaster.broadcast(GossipMessage::Propose(propose));

        // A 1-peer fleet reaches quorum on the local vote alone.
        let finished = {
            let mut rounds = self.in_flight.lock().expect("in_flight lock");
            let reached = rounds
                .get_mut(&nullifier)
                .map(|round| {
                    round.status = RoundStatus::Voting;
                    round.accepts.len() >= quorum
                })
                .unwrap_or(false);
            if reached {
                rounds.remove(&nullifier)
            } else {
                None
            }
        };
        if let Some(round) = finished {
            self.finalize_round(nullifier, round);
        }

        match tokio::time::timeout(Duration::from_millis(self.config.round_timeout_ms), done_rx)
            .await
        {
            Ok(Ok(RoundOutcome::Committed(entry))) => Ok(entry),
            Ok(Ok(RoundOutcome::Aborted { kept })) => Err(SoulprintError::Conflict {
                kept: kept.to_string(),
            }),
            Ok(Err(_)) => Err(SoulprintError::QuorumNotReached {
                accepts: 0,
                needed: quorum,
            }),
            Err(_) => {
                let accepts = {
                    let mut rounds = self.in_flight.lock().expect("in_flight lock");
                    match rounds.remove(&nullifier) {
                        Some(mut round) => {
                            round.status = RoundStatus::TimedOut;
                            round.accepts.len()
                        }
                        // The round finalized between timer expiry and now.
                        None => {
                            if let Some(entry) = self.get(&nullifier) {
                                return Ok(entry);
                            }
                            0
                        }
                    }
                };
                self.emit(ConsensusEvent::RoundTimedOut { nullifier });
                warn!(nullifier = %nullifier, accepts, needed = quorum, "round timed out");
                Err(SoulprintError::QuorumNotReached {
                    accepts,
                    needed: quorum,
                })
            }
        }
    }

    // ── Inbound handlers ─────────────────────────────────────────────────────

    /// Vote on a peer's proposal. Returns the vote that was broadcast, or
    /// `None` when the message was dropped at a gate.
    pub async fn handle_propose(&self, msg: &ProposeMsg) -> Option<VoteMsg> {
        if !self.gates_pass(&GossipMessage::Propose(msg.clone()), msg.verify_sig()) {
            return None;
        }

        let choice = match self.get(&msg.nullifier) {
            Some(existing) if existing.did != msg.did => VoteChoice::Reject,
            _ => {
                let verifier = Arc::clone(&self.verifier);
                let proof = msg.zk_proof.clone();
                let signals = vec![msg.nullifier.to_hex(), msg.did.to_string()];
                let valid =
                    tokio::task::spawn_blocking(move || verifier.verify_proof(&proof, &signals))
                        .await
                        .unwrap_or(false);
                if valid {
                    VoteChoice::Accept
                } else {
                    VoteChoice::Reject
                }
            }
        };

        let mut vote = VoteMsg {
            protocol_hash: PROTOCOL_HASH_HEX.clone(),
            nullifier: msg.nullifier,
            vote: choice,
            voter_did: self.keypair.did.clone(),
            ts: now_seconds(),
            signature: String::new(),
        };
        if let Err(e) = vote.sign(&self.keypair) {
            warn!(error = %e, "failed to sign vote");
            return None;
        }
        self.broadcaster.broadcast(GossipMessage::Vote(vote.clone()));
        Some(vote)
    }

    /// Tally a vote for a round this node is proposing.
    pub fn handle_vote(&self, msg: &VoteMsg) {
        if !self.gates_pass(&GossipMessage::Vote(msg.clone()), msg.verify_sig()) {
            return;
        }

        let quorum = quorum_for(self.config.min_peers);
        let finished = {
            let mut rounds = self.in_flight.lock().expect("in_flight lock");
            let reached = match rounds.get_mut(&msg.nullifier) {
                None => {
                    debug!(nullifier = %msg.nullifier, "vote for unknown round");
                    return;
                }
                Some(round) => {
                    if round.has_vote_from(&msg.voter_did) {
                        return;
                    }
                    let record = VoteRecord {
                        voter: msg.voter_did.clone(),
                        vote: msg.vote,
                        ts: msg.ts,
                        signature: msg.signature.clone(),
                    };
                    match msg.vote {
                        VoteChoice::Accept => round.accepts.push(record),
                        VoteChoice::Reject => round.rejects.push(record),
                    }
                    round.accepts.len() >= quorum
                }
            };
            if reached {
                rounds.remove(&msg.nullifier)
            } else {
                None
            }
        };

        if let Some(round) = finished {
            self.finalize_round(msg.nullifier, round);
        }
    }

    /// Merge a peer's commit, resolving conflicts deterministically.
    pub fn handle_commit(&self, msg: &CommitMsg) {
        if !self.gates_pass(&GossipMessage::Commit(msg.clone()), msg.verify_sig()) {
            return;
        }

        // Accept only commits carrying a quorum's worth of valid votes.
        if self.config.min_peers > 0 {
            let valid_votes = msg
                .votes
                .iter()
                .filter(|v| {
                    matches!(v.vote, VoteChoice::Accept) && verify_vote_record(&msg.nullifier, v)
                })
                .count();
            let quorum = quorum_for(self.config.min_peers);
            if valid_votes < quorum {
                warn!(
                    nullifier = %msg.nullifier,
                    valid_votes,
                    quorum,
                    "commit rejected: insufficient verifiable votes"
                );
                return;
            }
        }

        // A competing commit aborts our own in-flight round for the key.
        let aborted = {
            let mut rounds = self.in_flight.lock().expect("in_flight lock");
            match rounds.get(&msg.nullifier) {
                Some(round) if round.did != msg.did => rounds.remove(&msg.nullifier),
                _ => None,
            }
        };
        if let Some(mut round) = aborted {
            round.status = RoundStatus::Aborted;
            self.emit(ConsensusEvent::Conflict {
                nullifier: msg.nullifier,
                kept: msg.did.clone(),
                rejected: round.did.clone(),
            });
            if let Some(done) = round.done.take() {
                let _ = done.send(RoundOutcome::Aborted {
                    kept: msg.did.clone(),
                });
            }
        }

        let entry = CommitEntry {
            nullifier: msg.nullifier,
            did: msg.did.clone(),
            committed_ms: msg.committed_ms,
            commit_did: msg.commit_did.clone(),
            vote_count: msg.votes.len() as u32,
            votes: msg.votes.clone(),
        };
        self.merge_entry(entry);
    }

    /// Merge a remote snapshot. Returns how many entries changed local state;
    /// re-importing the same snapshot imports zero.
    pub fn import_state(&self, entries: &[CommitEntry]) -> usize {
        let mut imported = 0;
        for entry in entries {
            if self.merge_entry(entry.clone()) {
                imported += 1;
            }
        }
        if imported > 0 {
            self.emit(ConsensusEvent::Imported { count: imported });
        }
        imported
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Shared inbound gates: protocol hash, replay, peer membership, sender
    /// signature. True when the message should be processed.
    fn gates_pass(&self, msg: &GossipMessage, sig_ok: bool) -> bool {
        if msg.protocol_hash() != *PROTOCOL_HASH_HEX {
            warn!(theirs = msg.protocol_hash(), "protocol hash mismatch; message dropped");
            return false;
        }
        let sender = msg.sender().clone();
        if sender != self.keypair.did && !self.peers.contains(&sender) {
            warn!(sender = %sender, "message from unknown peer dropped");
            return false;
        }
        if !sig_ok {
            warn!(sender = %sender, "bad message signature; dropped");
            return false;
        }
        if !self.seen.lock().expect("seen lock").insert(msg.msg_hash()) {
            debug!("duplicate message dropped");
            return false;
        }
        self.peers.touch(&sender);
        true
    }

    fn make_vote(&self, nullifier: &Nullifier, choice: VoteChoice) -> Result<VoteRecord, SoulprintError> {
        let ts = now_seconds();
        let signature = self.keypair.sign_canonical(&soulprint_gossip::vote_body(
            nullifier,
            choice,
            &self.keypair.did,
            ts,
        ))?;
        Ok(VoteRecord {
            voter: self.keypair.did.clone(),
            vote: choice,
            ts,
            signature,
        })
    }

    fn build_entry(&self, nullifier: Nullifier, did: Did, votes: Vec<VoteRecord>) -> CommitEntry {
        CommitEntry {
            nullifier,
            did,
            committed_ms: now_ms(),
            commit_did: self.keypair.did.clone(),
            vote_count: votes.len() as u32,
            votes,
        }
    }

    fn finalize_round(&self, nullifier: Nullifier, mut round: Round) {
        round.status = RoundStatus::Committed;
        let entry = self.build_entry(nullifier, round.did.clone(), round.accepts.clone());
        self.insert_committed(entry.clone());
        self.broadcast_commit(&entry);
        info!(
            nullifier = %entry.nullifier,
            did = %entry.did,
            votes = entry.vote_count,
            "nullifier committed"
        );
        if let Some(done) = round.done.take() {
            let _ = done.send(RoundOutcome::Committed(entry));
        }
    }

    fn insert_committed(&self, entry: CommitEntry) {
        self.committed
            .write()
            .expect("committed lock")
            .insert(entry.nullifier, entry.clone());
        self.emit(ConsensusEvent::Committed(entry));
    }

    fn broadcast_commit(&self, entry: &CommitEntry) {
        let mut msg = CommitMsg {
            protocol_hash: PROTOCOL_HASH_HEX.clone(),
            nullifier: entry.nullifier,
            did: entry.did.clone(),
            votes: entry.votes.clone(),
            commit_did: entry.commit_did.clone(),
            committed_ms: entry.committed_ms,
            signature: String::new(),
        };
        if let Err(e) = msg.sign(&self.keypair) {
            warn!(error = %e, "failed to sign commit");
            return;
        }
        self.broadcaster.broadcast(GossipMessage::Commit(msg));
    }

    /// Apply the tie-break: earlier `committed_ms` wins, then the
    /// lexicographically smaller `commit_did`. Returns true when local state
    /// changed.
    fn merge_entry(&self, entry: CommitEntry) -> bool {
        let mut committed = self.committed.write().expect("committed lock");
        match committed.get(&entry.nullifier) {
            None => {
                committed.insert(entry.nullifier, entry.clone());
                drop(committed);
                self.emit(ConsensusEvent::Committed(entry));
                true
            }
            Some(existing) if existing.did == entry.did => false,
            Some(existing) => {
                let incoming_wins = (entry.committed_ms, entry.commit_did.as_str())
                    < (existing.committed_ms, existing.commit_did.as_str());
                let (kept, rejected) = if incoming_wins {
                    (entry.did.clone(), existing.did.clone())
                } else {
                    (existing.did.clone(), entry.did.clone())
                };
                warn!(
                    nullifier = %entry.nullifier,
                    kept = %kept,
                    rejected = %rejected,
                    "conflicting commits resolved"
                );
                let nullifier = entry.nullifier;
                if incoming_wins {
                    committed.insert(nullifier, entry);
                }
                drop(committed);
                self.emit(ConsensusEvent::Conflict {
                    nullifier,
                    kept,
                    rejected,
                });
                incoming_wins
            }
        }
    }
}
