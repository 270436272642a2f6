//! SPT wire form: base64url of JSON `{payload, sig}`.
//!
//! Field declaration order below IS the canonical key order; the signature
//! commits to these exact bytes, so reordering a field is a breaking change.

use serde::{Deserialize, Serialize};

use soulprint_core::error::SoulprintError;
use soulprint_core::types::{Credential, Did, Level, Nullifier};

/// Reputation summary embedded in a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotRep {
    pub score: u8,
    /// Total attestations applied (positive + negative).
    pub attestations: u32,
    /// Unix milliseconds; 0 if never attested.
    pub last_updated: i64,
}

/// The SPT body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Format version, always "1".
    pub sip: String,
    pub did: Did,
    /// Total score in `[0, 100]`.
    pub score: u8,
    /// Credential-weight component in `[0, 80]`.
    pub identity_score: u8,
    pub bot_rep: BotRep,
    pub level: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub credentials: Vec<Credential>,
    pub nullifier: Nullifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zkp: Option<String>,
    /// Unix seconds.
    pub issued: i64,
    /// Unix seconds.
    pub expires: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_sig: Option<String>,
}

/// Outer envelope carried in the base64url string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SignedToken {
    pub payload: serde_json::Value,
    pub sig: String,
}

pub(crate) fn encode_b64url(token: &SignedToken) -> Result<String, SoulprintError> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    let json = serde_json::to_vec(token).map_err(|e| SoulprintError::Serialization(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

pub(crate) fn decode_b64url(spt: &str) -> Result<SignedToken, SoulprintError> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    let bytes = URL_SAFE_NO_PAD
        .decode(spt.trim())
        .map_err(|_| SoulprintError::MalformedToken)?;
    serde_json::from_slice(&bytes).map_err(|_| SoulprintError::MalformedToken)
}
