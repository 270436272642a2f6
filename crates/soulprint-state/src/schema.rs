//! On-disk schemas shared across crates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use soulprint_core::types::{Attestation, CommitEntry, Reputation};

/// `{state_dir}/state.json`: the node's converged view, written by the
/// node-level state writer from engine snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateFile {
    pub nullifiers: Vec<CommitEntry>,
    /// DID string → reputation.
    pub reputation: BTreeMap<String, Reputation>,
    pub attestations: Vec<Attestation>,
    /// Peer base URLs.
    pub peers: Vec<String>,
    #[serde(rename = "lastSync")]
    pub last_sync: i64,
    #[serde(rename = "stateHash")]
    pub state_hash: String,
}
