//! Request/response schemas for the node's HTTP surface. Unknown input
//! fields are ignored; outputs carry exactly what is declared here.

use serde::{Deserialize, Serialize};

use soulprint_core::types::Reputation;
use soulprint_token::RenewMethod;

// ── /info ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub node_did: String,
    pub version: String,
    /// Protocol hash, hex. Peers with a different value cannot interoperate.
    pub protocol: String,
    pub total_verified: usize,
    pub capabilities: Vec<String>,
    /// Advisory SHA-256 of the running binary. Metadata only; never a
    /// security boundary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_hash: Option<String>,
}

// ── /verify ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub spt: String,
    #[serde(default)]
    pub zkp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    /// `"new"` on first registration, `"existing"` when already committed.
    pub anti_sybil: String,
    pub nullifier: String,
    pub node_did: String,
    /// Node signature over `{nullifier, did, verified_at}`.
    pub co_signature: String,
    /// Unix seconds.
    pub verified_at: i64,
}

// ── /nullifier/{n} ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NullifierStatusResponse {
    pub registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<i64>,
}

// ── /token/renew ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RenewRequest {
    pub spt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewResponse {
    pub spt: String,
    /// Seconds until the renewed token expires.
    pub expires_in: i64,
    pub renewed: bool,
    pub method: RenewMethod,
}

// ── /challenge ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeRequest {
    #[serde(default)]
    pub challenge_id: Option<String>,
    /// Tokens to check.
    pub spts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub challenge_id: String,
    pub result_valid: usize,
    pub result_invalid: usize,
    pub verified_at: i64,
    pub node_did: String,
    pub signature: String,
}

// ── /attest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AttestHttpRequest {
    pub target: String,
    pub value: i8,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestHttpResponse {
    pub accepted: bool,
    /// The value actually applied (−1 when anti-farming demoted it).
    pub value: i8,
    pub msg_hash: String,
    pub target_reputation: Reputation,
}

// ── /reputation/{did} ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationResponse {
    pub did: String,
    #[serde(flatten)]
    pub reputation: Reputation,
}

// ── /state ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct StateQuery {
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub since: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_nullifiers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_attestations: Option<usize>,
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
