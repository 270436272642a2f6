//! Issue, decode, and renew Soulprint Tokens.

use serde::{Deserialize, Serialize};
use tracing::debug;

use soulprint_core::constants::{
    TOKEN_DEFAULT_LIFETIME_SECONDS, TOKEN_GRACE_SECONDS, TOKEN_RENEW_EARLY_SECONDS,
};
use soulprint_core::error::SoulprintError;
use soulprint_core::time::now_seconds;
use soulprint_core::types::{Credential, Nullifier, Reputation};
use soulprint_crypto::{pubkey_from_did, verify_canonical, NodeKeypair};

use crate::score::{identity_score, level_for, total_score};
use crate::spt::{decode_b64url, encode_b64url, BotRep, SignedToken, TokenPayload};

/// Caller-tunable issuance knobs.
#[derive(Debug, Clone, Default)]
pub struct IssueOptions {
    /// Override the 180-day default lifetime (seconds).
    pub lifetime_seconds: Option<i64>,
    pub country: Option<String>,
    pub zkp: Option<String>,
}

/// How a renewal qualified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewMethod {
    Preemptive,
    GraceWindow,
}

/// Issue a new SPT signed by `keypair` (the subject's key; `payload.did` is
/// derived from it).
pub fn issue(
    keypair: &NodeKeypair,
    nullifier: Nullifier,
    credentials: &[Credential],
    reputation: &Reputation,
    options: &IssueOptions,
) -> Result<String, SoulprintError> {
    let now = now_seconds();
    let lifetime = options
        .lifetime_seconds
        .unwrap_or(TOKEN_DEFAULT_LIFETIME_SECONDS);

    let payload = TokenPayload {
        sip: "1".to_string(),
        did: keypair.did.clone(),
        score: total_score(credentials, reputation),
        identity_score: identity_score(credentials),
        bot_rep: BotRep {
            score: reputation.score,
            attestations: reputation.positive_count + reputation.negative_count,
            last_updated: reputation.last_updated,
        },
        level: level_for(credentials),
        country: options.country.clone(),
        credentials: credentials.to_vec(),
        nullifier,
        zkp: options.zkp.clone(),
        issued: now,
        expires: now + lifetime,
        network_sig: None,
    };

    let sig = keypair.sign_canonical(&payload)?;
    let payload_value = serde_json::to_value(&payload)
        .map_err(|e| SoulprintError::Serialization(e.to_string()))?;
    encode_b64url(&SignedToken {
        payload: payload_value,
        sig,
    })
}

/// Decode and verify an SPT. Returns `None` on any failure (bad base64,
/// bad JSON, bad signature, or expiry), never an error.
pub fn decode(spt: &str) -> Option<TokenPayload> {
    match try_decode(spt, false) {
        Ok(token) => Some(token),
        Err(e) => {
            debug!(error = %e, "SPT rejected");
            None
        }
    }
}

/// Like [`decode`], but tolerates an expired token; the renewal path needs
/// to read tokens inside the grace window. The signature is still checked.
pub fn peek(spt: &str) -> Option<TokenPayload> {
    try_decode(spt, true).ok()
}

/// Renew an SPT. Permitted from 1 h before expiry (`Preemptive`) through
/// 7 days after (`GraceWindow`); forbidden otherwise. Preserves DID,
/// nullifier, and credentials; refreshes the timestamps and recomputes the
/// score from `current_rep`.
///
/// `keypair` must hold the key for the token's DID: tokens are signed by
/// their subject, so only the key's custodian can renew.
pub fn renew(
    spt: &str,
    keypair: &NodeKeypair,
    current_rep: &Reputation,
) -> Result<(String, RenewMethod), SoulprintError> {
    let old = try_decode(spt, true)?;
    if old.did != keypair.did {
        return Err(SoulprintError::InvalidDid(old.did.to_string()));
    }

    let now = now_seconds();
    let method = if now >= old.expires - TOKEN_RENEW_EARLY_SECONDS && now < old.expires {
        RenewMethod::Preemptive
    } else if now >= old.expires && now <= old.expires + TOKEN_GRACE_SECONDS {
        RenewMethod::GraceWindow
    } else {
        return Err(SoulprintError::RenewNotPermitted);
    };

    let span = old.expires - old.issued;
    let lifetime = if span > 0 {
        span
    } else {
        TOKEN_DEFAULT_LIFETIME_SECONDS
    };
    let new_spt = issue(
        keypair,
        old.nullifier,
        &old.credentials,
        current_rep,
        &IssueOptions {
            lifetime_seconds: Some(lifetime),
            country: old.country.clone(),
            zkp: old.zkp.clone(),
        },
    )?;
    Ok((new_spt, method))
}

/// Shared decode path. The signature is always checked against the payload's
/// original bytes (the raw JSON value, not a re-serialized struct, so
/// producer-side field order is what gets hashed).
fn try_decode(spt: &str, allow_expired: bool) -> Result<TokenPayload, SoulprintError> {
    let signed = decode_b64url(spt)?;

    let did = signed
        .payload
        .get("did")
        .and_then(|v| v.as_str())
        .ok_or(SoulprintError::MalformedToken)?;
    let pubkey = pubkey_from_did(did)?;
    if !verify_canonical(&signed.payload, &signed.sig, &pubkey)? {
        return Err(SoulprintError::InvalidSignature);
    }

    let token: TokenPayload = serde_json::from_value(signed.payload)
        .map_err(|_| SoulprintError::MalformedToken)?;
    if !allow_expired && token.expires <= now_seconds() {
        return Err(SoulprintError::MalformedToken);
    }
    Ok(token)
}
