//! ─── Soulprint Protocol Constants ───────────────────────────────────────────
//!
//! "One human, one soulprint."
//!
//! Every value here is part of the wire protocol: changing any of them changes
//! `PROTOCOL_HASH`, which partitions the node off from the existing fleet
//! (mismatched hashes cannot read each other's gossip).

use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

// ── Scores ───────────────────────────────────────────────────────────────────

/// Minimum total score any service may gate on. Thresholds configured below
/// this are promoted up to it.
pub const SCORE_FLOOR: u8 = 65;

/// Floor applied to the total score of any identity carrying
/// `DocumentVerified`.
pub const VERIFIED_SCORE_FLOOR: u8 = 52;

/// Minimum total score required to issue attestations.
pub const MIN_ATTESTER_SCORE: u8 = 65;

/// Reputation score assigned to a DID that has never been attested.
pub const DEFAULT_REPUTATION: u8 = 10;

/// Cap on the credential-weight (identity) component of the score.
pub const IDENTITY_MAX: u8 = 80;

/// Cap on the reputation component of the score.
pub const REPUTATION_MAX: u8 = 20;

// ── Credential weights (sum ≤ IDENTITY_MAX) ──────────────────────────────────

pub const WEIGHT_EMAIL_VERIFIED: u8 = 8;
pub const WEIGHT_PHONE_VERIFIED: u8 = 12;
pub const WEIGHT_GITHUB_LINKED: u8 = 16;
pub const WEIGHT_DOCUMENT_VERIFIED: u8 = 20;
pub const WEIGHT_FACE_MATCH: u8 = 16;
pub const WEIGHT_BIOMETRIC_BOUND: u8 = 8;

// ── Attestations ─────────────────────────────────────────────────────────────

/// Maximum age of an inbound attestation before it is ignored (seconds).
pub const ATT_MAX_AGE_SECONDS: i64 = 3_600;

/// Minimum interval between attestations from the same issuer to the same
/// target (milliseconds).
pub const ATTESTATION_COOLDOWN_MS: i64 = 24 * 3_600 * 1_000;

/// Anti-farming: attestations from one issuer to one target counted over this
/// trailing window (milliseconds)…
pub const FARMING_WINDOW_MS: i64 = 7 * 86_400 * 1_000;

/// …and the count at which the current event is demoted to −1.
pub const FARMING_THRESHOLD: usize = 7;

// ── Tokens ───────────────────────────────────────────────────────────────────

/// Default SPT lifetime: 180 days (seconds).
pub const TOKEN_DEFAULT_LIFETIME_SECONDS: i64 = 180 * 86_400;

/// Renewal is permitted this long before expiry (seconds).
pub const TOKEN_RENEW_EARLY_SECONDS: i64 = 3_600;

/// Renewal is permitted this long after expiry (seconds).
pub const TOKEN_GRACE_SECONDS: i64 = 7 * 86_400;

/// `Authorization: Bearer` values longer than this are taken to be SPTs.
pub const SPT_MIN_BEARER_LEN: usize = 200;

// ── Proof-of-possession ──────────────────────────────────────────────────────

/// Maximum accepted age of a DPoP proof, and the nonce retention window
/// (seconds).
pub const DPOP_MAX_AGE_SECS: i64 = 300;

/// Maximum tolerated clock skew between nodes (seconds).
pub const CLOCK_SKEW_MAX_SECONDS: i64 = 300;

// ── Consensus ────────────────────────────────────────────────────────────────

/// Default time a proposer waits for quorum before the round times out
/// (milliseconds).
pub const ROUND_TIMEOUT_MS: u64 = 3_000;

// ── Gossip ───────────────────────────────────────────────────────────────────

/// Gossip key-rotation epoch length (milliseconds).
pub const GOSSIP_EPOCH_MS: i64 = 300_000;

/// Gossip envelope format version.
pub const GOSSIP_VERSION: u8 = 1;

// ── Sync / retry schedule ────────────────────────────────────────────────────

pub const VERIFY_RETRY_MAX: u32 = 3;
pub const VERIFY_RETRY_BASE_MS: u64 = 500;
pub const VERIFY_RETRY_MAX_MS: u64 = 8_000;
pub const VERIFY_RETRY_JITTER_MS: u64 = 200;

/// Anti-entropy pull interval (seconds).
pub const SYNC_INTERVAL_SECS: u64 = 60;

/// Page size for `GET /state`.
pub const SYNC_PAGE_LIMIT: usize = 500;

/// Request deadline for `GET /state/hash` (seconds).
pub const SYNC_HASH_DEADLINE_SECS: u64 = 5;

/// Request deadline for `GET /state` pages (seconds).
pub const SYNC_PAGE_DEADLINE_SECS: u64 = 10;

/// Request deadline for broadcast POSTs (seconds).
pub const BROADCAST_DEADLINE_SECS: u64 = 3;

// ── Anchor ───────────────────────────────────────────────────────────────────

/// Backoff before each anchor attempt (seconds).
pub const ANCHOR_BACKOFF_SECS: [u64; 3] = [0, 2, 8];

/// Interval between drains of the on-disk anchor queues (seconds).
pub const ANCHOR_FLUSH_INTERVAL_SECS: u64 = 60;

/// In-flight anchor items beyond this are journaled straight to disk.
pub const ANCHOR_QUEUE_CAP: usize = 1_024;

// ── Persistence ──────────────────────────────────────────────────────────────

/// Debounce window for state-file flushes (milliseconds).
pub const FLUSH_DEBOUNCE_MS: u64 = 2_000;

// ── Protocol hash ────────────────────────────────────────────────────────────

/// Wire-protocol revision. Bump when any constant above changes meaning.
pub const PROTOCOL_REVISION: &str = "soulprint/1";

/// SHA-256 over the canonical rendering of the protocol constants. Two nodes
/// interoperate iff their hashes match; the gossip cipher is keyed off this
/// value so a mismatch partitions the network automatically.
pub static PROTOCOL_HASH: Lazy<[u8; 32]> = Lazy::new(|| {
    let canon = format!(
        "{PROTOCOL_REVISION};floor={SCORE_FLOOR};vfloor={VERIFIED_SCORE_FLOOR};\
         attester={MIN_ATTESTER_SCORE};rep0={DEFAULT_REPUTATION};idmax={IDENTITY_MAX};\
         repmax={REPUTATION_MAX};attage={ATT_MAX_AGE_SECONDS};skew={CLOCK_SKEW_MAX_SECONDS};\
         ttl={TOKEN_DEFAULT_LIFETIME_SECONDS};dpop={DPOP_MAX_AGE_SECS};\
         epoch={GOSSIP_EPOCH_MS};retry={VERIFY_RETRY_MAX}/{VERIFY_RETRY_BASE_MS}/\
         {VERIFY_RETRY_MAX_MS}/{VERIFY_RETRY_JITTER_MS}"
    );
    let mut h = Sha256::new();
    h.update(canon.as_bytes());
    h.finalize().into()
});

/// Hex rendering of [`PROTOCOL_HASH`], the form carried on the wire.
pub static PROTOCOL_HASH_HEX: Lazy<String> = Lazy::new(|| hex::encode(*PROTOCOL_HASH));
