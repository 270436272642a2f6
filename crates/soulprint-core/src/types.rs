use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::*;
use crate::error::SoulprintError;

// ── Did ──────────────────────────────────────────────────────────────────────

/// Multicodec prefix for an Ed25519 public key (`0xED 0x01`).
const ED25519_MULTICODEC: [u8; 2] = [0xED, 0x01];

/// A `did:key` decentralized identifier:
/// `did:key:z<base58(0xED 0x01 || pubkey32)>`. Immutable, derivable to and
/// from the 32-byte Ed25519 public key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Derive the DID for a raw Ed25519 public key.
    pub fn from_pubkey(pubkey: &[u8; 32]) -> Self {
        let mut multicodec = Vec::with_capacity(34);
        multicodec.extend_from_slice(&ED25519_MULTICODEC);
        multicodec.extend_from_slice(pubkey);
        Did(format!("did:key:z{}", bs58::encode(multicodec).into_string()))
    }

    /// Parse and validate a DID string.
    pub fn parse(s: &str) -> Result<Self, SoulprintError> {
        let did = Did(s.to_string());
        did.pubkey()?;
        Ok(did)
    }

    /// Recover the 32-byte Ed25519 public key.
    ///
    /// Fails with `InvalidDid` on malformed input or an unsupported
    /// multicodec prefix.
    pub fn pubkey(&self) -> Result<[u8; 32], SoulprintError> {
        let rest = self
            .0
            .strip_prefix("did:key:z")
            .ok_or_else(|| SoulprintError::InvalidDid(self.0.clone()))?;
        let bytes = bs58::decode(rest)
            .into_vec()
            .map_err(|_| SoulprintError::InvalidDid(self.0.clone()))?;
        if bytes.len() != 34 || bytes[..2] != ED25519_MULTICODEC {
            return Err(SoulprintError::InvalidDid(self.0.clone()));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[2..]);
        Ok(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // did:key:z6Mk…; the first 16 chars past the prefix identify it.
        let tail = self.0.strip_prefix("did:key:").unwrap_or(&self.0);
        write!(f, "Did({})", &tail[..tail.len().min(16)])
    }
}

impl FromStr for Did {
    type Err = SoulprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Did::parse(s)
    }
}

// ── Nullifier ────────────────────────────────────────────────────────────────

/// A 32-byte anti-Sybil fingerprint. Opaque to the core; the only invariant
/// is "one nullifier ↔ at most one DID". Rendered as `0x<64 hex>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nullifier(pub [u8; 32]);

impl Nullifier {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, SoulprintError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(raw).map_err(|_| SoulprintError::InvalidNullifier(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(SoulprintError::InvalidNullifier(s.to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nullifier(0x{}…)", &hex::encode(self.0)[..8])
    }
}

impl Serialize for Nullifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Nullifier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Nullifier::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ── Credentials ──────────────────────────────────────────────────────────────

/// Verifiable credential kinds with fixed score weights. The set attached to
/// an identity is unordered and duplicate-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Credential {
    EmailVerified,
    PhoneVerified,
    GitHubLinked,
    DocumentVerified,
    FaceMatch,
    BiometricBound,
}

impl Credential {
    pub fn weight(&self) -> u8 {
        match self {
            Credential::EmailVerified => WEIGHT_EMAIL_VERIFIED,
            Credential::PhoneVerified => WEIGHT_PHONE_VERIFIED,
            Credential::GitHubLinked => WEIGHT_GITHUB_LINKED,
            Credential::DocumentVerified => WEIGHT_DOCUMENT_VERIFIED,
            Credential::FaceMatch => WEIGHT_FACE_MATCH,
            Credential::BiometricBound => WEIGHT_BIOMETRIC_BOUND,
        }
    }
}

/// Verification level carried in the SPT, derived from the credential set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Unverified,
    EmailVerified,
    PhoneVerified,
    KYCLite,
    KYCFull,
}

// ── Reputation ───────────────────────────────────────────────────────────────

/// Aggregated reputation for one DID. `score` is clamped to
/// `[0, REPUTATION_MAX]` after every update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reputation {
    pub score: u8,
    pub positive_count: u32,
    pub negative_count: u32,
    /// Unix milliseconds of the last applied attestation; 0 if never.
    pub last_updated: i64,
}

impl Default for Reputation {
    fn default() -> Self {
        Self {
            score: DEFAULT_REPUTATION,
            positive_count: 0,
            negative_count: 0,
            last_updated: 0,
        }
    }
}

impl Reputation {
    /// Apply a ±1 delta with clamping, bumping the matching counter.
    pub fn apply(&mut self, value: i8, now_ms: i64) {
        if value > 0 {
            self.score = (self.score + 1).min(REPUTATION_MAX);
            self.positive_count += 1;
        } else {
            self.score = self.score.saturating_sub(1);
            self.negative_count += 1;
        }
        self.last_updated = now_ms;
    }
}

// ── Attestations ─────────────────────────────────────────────────────────────

/// A signed ±1 reputation event between two DIDs. Identified by `msg_hash`;
/// identical hashes are the same attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub issuer: Did,
    pub target: Did,
    /// +1 or −1.
    pub value: i8,
    pub context: String,
    /// Unix seconds at issuance.
    pub ts: i64,
    /// Hex Ed25519 signature over the canonical tuple.
    pub signature: String,
    /// `sha256("issuer:target:value:context:ts")`, hex.
    pub msg_hash: String,
}

impl Attestation {
    /// The canonical tuple the hash and signature commit to.
    pub fn canonical_tuple(issuer: &Did, target: &Did, value: i8, context: &str, ts: i64) -> String {
        format!("{issuer}:{target}:{value}:{context}:{ts}")
    }

    pub fn compute_msg_hash(
        issuer: &Did,
        target: &Did,
        value: i8,
        context: &str,
        ts: i64,
    ) -> String {
        let tuple = Self::canonical_tuple(issuer, target, value, context, ts);
        let mut h = Sha256::new();
        h.update(tuple.as_bytes());
        hex::encode(h.finalize())
    }
}

// ── Consensus records ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Accept,
    Reject,
}

/// One peer's recorded vote in a nullifier round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter: Did,
    pub vote: VoteChoice,
    /// Unix seconds.
    pub ts: i64,
    /// Hex Ed25519 signature by the voter.
    pub signature: String,
}

/// A committed nullifier registration, the unit of converged state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEntry {
    pub nullifier: Nullifier,
    pub did: Did,
    /// Unix milliseconds at commit; the tie-break key across partitions.
    pub committed_ms: i64,
    /// DID of the node that assembled the quorum.
    pub commit_did: Did,
    pub vote_count: u32,
    pub votes: Vec<VoteRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_round_trips_through_pubkey() {
        let key = [7u8; 32];
        let did = Did::from_pubkey(&key);
        assert!(did.as_str().starts_with("did:key:z"));
        assert_eq!(did.pubkey().unwrap(), key);
    }

    #[test]
    fn malformed_did_rejected() {
        assert!(Did::parse("did:web:example.com").is_err());
        assert!(Did::parse("did:key:zzzz").is_err());
        // Wrong multicodec prefix.
        let mut bytes = vec![0xEC, 0x01];
        bytes.extend_from_slice(&[1u8; 32]);
        let bad = format!("did:key:z{}", bs58::encode(bytes).into_string());
        assert!(Did::parse(&bad).is_err());
    }

    #[test]
    fn nullifier_hex_accepts_optional_prefix() {
        let n = Nullifier::from_bytes([0xAB; 32]);
        let hexed = n.to_hex();
        assert!(hexed.starts_with("0x"));
        assert_eq!(Nullifier::from_hex(&hexed).unwrap(), n);
        assert_eq!(Nullifier::from_hex(&hexed[2..]).unwrap(), n);
        assert!(Nullifier::from_hex("0x1234").is_err());
    }

    #[test]
    fn reputation_clamps_both_ends() {
        let mut rep = Reputation::default();
        for _ in 0..30 {
            rep.apply(1, 1);
        }
        assert_eq!(rep.score, REPUTATION_MAX);
        for _ in 0..40 {
            rep.apply(-1, 2);
        }
        assert_eq!(rep.score, 0);
        assert_eq!(rep.positive_count, 30);
        assert_eq!(rep.negative_count, 40);
    }

    #[test]
    fn msg_hash_depends_on_every_field() {
        let a = Did::from_pubkey(&[1; 32]);
        let b = Did::from_pubkey(&[2; 32]);
        let h1 = Attestation::compute_msg_hash(&a, &b, 1, "review", 100);
        let h2 = Attestation::compute_msg_hash(&a, &b, -1, "review", 100);
        let h3 = Attestation::compute_msg_hash(&a, &b, 1, "review", 101);
        assert_ne!(h1, h2);
        assert_ne!(h1, h3);
    }
}
