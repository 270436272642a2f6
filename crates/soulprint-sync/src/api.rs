//! Wire shapes for the `/state/*` anti-entropy surface. Served by the RPC
//! boundary and consumed by the sync client; unknown input fields are
//! ignored, none are invented on output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use soulprint_core::types::{Attestation, CommitEntry, Reputation};

/// `GET /state/hash`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateHashResponse {
    /// `sha256(sorted committed nullifier keys)`, hex.
    pub hash: String,
}

/// `GET /state/info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateInfoResponse {
    pub nullifier_count: usize,
    pub attestation_count: usize,
    /// Unix seconds of the newest attestation.
    pub latest_ts: i64,
    pub protocol_hash: String,
    pub node_version: String,
}

/// One page of `GET /state?page&limit&since`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatePage {
    pub nullifiers: Vec<CommitEntry>,
    /// Target DID → attestations received.
    pub attestations: BTreeMap<String, Vec<Attestation>>,
    /// Target DID → aggregated reputation (informational; reputations are
    /// recomputed from imported attestations).
    pub reps: BTreeMap<String, Reputation>,
    pub page: usize,
    pub total_pages: usize,
    pub protocol_hash: String,
}
