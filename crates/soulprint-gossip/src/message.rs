//! Messages exchanged between Soulprint nodes.
//!
//! Every message carries the sender's protocol hash and an Ed25519 signature
//! by the sender's node DID. Signatures cover the canonical JSON of the
//! message body (all fields except `signature`), built through the `*_body`
//! helpers so signer and verifier hash identical bytes.

use serde::{Deserialize, Serialize};

use soulprint_core::canonical::canonical_json;
use soulprint_core::error::SoulprintError;
use soulprint_core::types::{Attestation, Did, Nullifier, VoteChoice, VoteRecord};
use soulprint_crypto::{pubkey_from_did, sha256, verify_canonical, NodeKeypair};

/// A peer proposes binding `nullifier` to `did`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeMsg {
    pub protocol_hash: String,
    pub nullifier: Nullifier,
    pub did: Did,
    pub zk_proof: String,
    pub proposer_did: Did,
    /// Unix seconds.
    pub ts: i64,
    pub signature: String,
}

/// A peer's vote in an open round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteMsg {
    pub protocol_hash: String,
    pub nullifier: Nullifier,
    pub vote: VoteChoice,
    pub voter_did: Did,
    /// Unix seconds.
    pub ts: i64,
    pub signature: String,
}

/// A quorum was assembled; the commit carries the accumulated votes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitMsg {
    pub protocol_hash: String,
    pub nullifier: Nullifier,
    pub did: Did,
    pub votes: Vec<VoteRecord>,
    pub commit_did: Did,
    /// Unix milliseconds; the tie-break key.
    pub committed_ms: i64,
    pub signature: String,
}

/// An accepted attestation propagating through the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestMsg {
    pub protocol_hash: String,
    pub attestation: Attestation,
    pub sender_did: Did,
    /// Unix seconds.
    pub ts: i64,
    pub signature: String,
}

/// The wire sum type sealed inside gossip envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GossipMessage {
    Propose(ProposeMsg),
    Vote(VoteMsg),
    Commit(CommitMsg),
    Attest(AttestMsg),
}

// ── Signing bodies ───────────────────────────────────────────────────────────
// `serde_json::json!` preserves literal key order (preserve_order feature),
// so these are the canonical byte sources.

fn propose_body(m: &ProposeMsg) -> serde_json::Value {
    serde_json::json!({
        "protocol_hash": m.protocol_hash,
        "nullifier": m.nullifier,
        "did": m.did,
        "zk_proof": m.zk_proof,
        "proposer_did": m.proposer_did,
        "ts": m.ts,
    })
}

/// Canonical body a vote signature commits to. Shared with `VoteRecord`
/// verification: a record's signature is the `VoteMsg` signature it arrived
/// with.
pub fn vote_body(
    nullifier: &Nullifier,
    vote: VoteChoice,
    voter_did: &Did,
    ts: i64,
) -> serde_json::Value {
    serde_json::json!({
        "protocol_hash": &*soulprint_core::constants::PROTOCOL_HASH_HEX,
        "nullifier": nullifier,
        "vote": vote,
        "voter_did": voter_did,
        "ts": ts,
    })
}

fn commit_body(m: &CommitMsg) -> serde_json::Value {
    serde_json::json!({
        "protocol_hash": m.protocol_hash,
        "nullifier": m.nullifier,
        "did": m.did,
        "votes": m.votes,
        "commit_did": m.commit_did,
        "committed_ms": m.committed_ms,
    })
}

fn attest_body(m: &AttestMsg) -> serde_json::Value {
    serde_json::json!({
        "protocol_hash": m.protocol_hash,
        "attestation": m.attestation,
        "sender_did": m.sender_did,
        "ts": m.ts,
    })
}

impl ProposeMsg {
    pub fn sign(&mut self, kp: &NodeKeypair) -> Result<(), SoulprintError> {
        self.signature = kp.sign_canonical(&propose_body(self))?;
        Ok(())
    }

    pub fn verify_sig(&self) -> bool {
        verify_body(&propose_body(self), &self.signature, &self.proposer_did)
    }
}

impl VoteMsg {
    pub fn sign(&mut self, kp: &NodeKeypair) -> Result<(), SoulprintError> {
        self.signature =
            kp.sign_canonical(&vote_body(&self.nullifier, self.vote, &self.voter_did, self.ts))?;
        Ok(())
    }

    pub fn verify_sig(&self) -> bool {
        verify_body(
            &vote_body(&self.nullifier, self.vote, &self.voter_did, self.ts),
            &self.signature,
            &self.voter_did,
        )
    }
}

impl CommitMsg {
    pub fn sign(&mut self, kp: &NodeKeypair) -> Result<(), SoulprintError> {
        self.signature = kp.sign_canonical(&commit_body(self))?;
        Ok(())
    }

    pub fn verify_sig(&self) -> bool {
        verify_body(&commit_body(self), &self.signature, &self.commit_did)
    }
}

impl AttestMsg {
    pub fn sign(&mut self, kp: &NodeKeypair) -> Result<(), SoulprintError> {
        self.signature = kp.sign_canonical(&attest_body(self))?;
        Ok(())
    }

    pub fn verify_sig(&self) -> bool {
        verify_body(&attest_body(self), &self.signature, &self.sender_did)
    }
}

/// Verify a carried vote record against its voter's DID.
pub fn verify_vote_record(nullifier: &Nullifier, record: &VoteRecord) -> bool {
    verify_body(
        &vote_body(nullifier, record.vote, &record.voter, record.ts),
        &record.signature,
        &record.voter,
    )
}

fn verify_body(body: &serde_json::Value, signature: &str, signer: &Did) -> bool {
    let Ok(pubkey) = pubkey_from_did(signer.as_str()) else {
        return false;
    };
    verify_canonical(body, signature, &pubkey).unwrap_or(false)
}

impl GossipMessage {
    /// Deduplication key: SHA-256 of the canonical message, hex.
    pub fn msg_hash(&self) -> String {
        let bytes = canonical_json(self).unwrap_or_default();
        hex::encode(sha256(&bytes))
    }

    pub fn protocol_hash(&self) -> &str {
        match self {
            GossipMessage::Propose(m) => &m.protocol_hash,
            GossipMessage::Vote(m) => &m.protocol_hash,
            GossipMessage::Commit(m) => &m.protocol_hash,
            GossipMessage::Attest(m) => &m.protocol_hash,
        }
    }

    pub fn sender(&self) -> &Did {
        match self {
            GossipMessage::Propose(m) => &m.proposer_did,
            GossipMessage::Vote(m) => &m.voter_did,
            GossipMessage::Commit(m) => &m.commit_did,
            GossipMessage::Attest(m) => &m.sender_did,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soulprint_core::constants::PROTOCOL_HASH_HEX;
    use soulprint_core::time::now_seconds;

    #[test]
    fn propose_signature_round_trip() {
        let kp = NodeKeypair::generate();
        let mut msg = ProposeMsg {
            protocol_hash: PROTOCOL_HASH_HEX.clone(),
            nullifier: Nullifier::from_bytes([1; 32]),
            did: kp.did.clone(),
            zk_proof: "proof".into(),
            proposer_did: kp.did.clone(),
            ts: now_seconds(),
            signature: String::new(),
        };
        msg.sign(&kp).unwrap();
        assert!(msg.verify_sig());

        msg.zk_proof = "forged".into();
        assert!(!msg.verify_sig());
    }

    #[test]
    fn vote_record_verifies_with_vote_msg_signature() {
        let kp = NodeKeypair::generate();
        let n = Nullifier::from_bytes([2; 32]);
        let mut vote = VoteMsg {
            protocol_hash: PROTOCOL_HASH_HEX.clone(),
            nullifier: n,
            vote: VoteChoice::Accept,
            voter_did: kp.did.clone(),
            ts: now_seconds(),
            signature: String::new(),
        };
        vote.sign(&kp).unwrap();

        let record = VoteRecord {
            voter: vote.voter_did.clone(),
            vote: vote.vote,
            ts: vote.ts,
            signature: vote.signature.clone(),
        };
        assert!(verify_vote_record(&n, &record));
        assert!(!verify_vote_record(&Nullifier::from_bytes([3; 32]), &record));
    }

    #[test]
    fn msg_hash_distinguishes_messages() {
        let kp = NodeKeypair::generate();
        let mk = |ts| {
            let mut m = VoteMsg {
                protocol_hash: PROTOCOL_HASH_HEX.clone(),
                nullifier: Nullifier::from_bytes([4; 32]),
                vote: VoteChoice::Accept,
                voter_did: kp.did.clone(),
                ts,
                signature: String::new(),
            };
            m.sign(&kp).unwrap();
            GossipMessage::Vote(m)
        };
        assert_ne!(mk(1).msg_hash(), mk(2).msg_hash());
        assert_eq!(mk(5).msg_hash(), mk(5).msg_hash());
    }
}
