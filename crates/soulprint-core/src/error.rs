use thiserror::Error;

/// The protocol error taxonomy. Every failure a caller can observe maps to
/// exactly one kind; human-facing messages are formatted at the boundary.
#[derive(Debug, Error)]
pub enum SoulprintError {
    // ── Validation ───────────────────────────────────────────────────────────
    #[error("invalid DID: {0}")]
    InvalidDid(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("attestation value must be +1 or -1, got {0}")]
    InvalidValue(i8),

    #[error("malformed token")]
    MalformedToken,

    #[error("invalid nullifier: {0}")]
    InvalidNullifier(String),

    // ── Policy ───────────────────────────────────────────────────────────────
    #[error("issuer score {score} below attester minimum {min}")]
    IssuerNotAuthorized { score: u8, min: u8 },

    #[error("cooldown active: {remaining_ms} ms until this pair may attest again")]
    CooldownActive { remaining_ms: i64 },

    #[error("issuer and target must differ")]
    SameIssuerTarget,

    #[error("score {0} below required floor")]
    ScoreBelowFloor(u8),

    #[error("token renewal permitted only within 1h of expiry or the 7-day grace window")]
    RenewNotPermitted,

    // ── Consensus ────────────────────────────────────────────────────────────
    #[error("zero-knowledge proof rejected")]
    InvalidProof,

    #[error("nullifier already bound to {0}")]
    NullifierAlreadyUsed(String),

    #[error("quorum not reached: {accepts} of {needed} accepting votes")]
    QuorumNotReached { accepts: usize, needed: usize },

    #[error("conflicting commit for nullifier (kept {kept})")]
    Conflict { kept: String },

    #[error("consensus round timed out after {0} ms")]
    Timeout(u64),

    // ── Proof-of-possession ──────────────────────────────────────────────────
    #[error("DPoP proof malformed")]
    DpopMalformed,

    #[error("DPoP proof expired")]
    DpopExpired,

    #[error("DPoP nonce replayed")]
    DpopReplay,

    #[error("DPoP method mismatch: proof {proof}, request {request}")]
    DpopMethodMismatch { proof: String, request: String },

    #[error("DPoP URL mismatch")]
    DpopUrlMismatch,

    #[error("DPoP token-hash mismatch")]
    DpopSptHashMismatch,

    #[error("DPoP DID does not match token DID")]
    DpopDidMismatch,

    #[error("DPoP signature invalid")]
    DpopBadSignature,

    // ── Transport ────────────────────────────────────────────────────────────
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("protocol hash mismatch (theirs {theirs})")]
    ProtocolHashMismatch { theirs: String },

    // ── Durability ───────────────────────────────────────────────────────────
    /// Soft: the item was journaled for later anchoring, not lost.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl SoulprintError {
    /// True for errors the anchor/sync paths swallow and log rather than
    /// surface to a client.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            SoulprintError::PeerUnreachable(_) | SoulprintError::LedgerUnavailable(_)
        )
    }
}
