//! Ordered DPoP verification.
//!
//! Checks run in a fixed order and the first failure is returned without
//! consuming the nonce; only a fully valid proof burns it.

use soulprint_core::constants::DPOP_MAX_AGE_SECS;
use soulprint_core::error::SoulprintError;
use soulprint_core::time::now_seconds;
use soulprint_crypto::{pubkey_from_did, sha256, verify_canonical};

use crate::nonce::NonceStore;
use crate::proof::{DpopProof, DPOP_TYP};

/// Verify `proof_header` against the request it claims to cover. On success
/// the nonce is recorded as used.
pub fn verify(
    proof_header: &str,
    spt: &str,
    request_method: &str,
    request_url: &str,
    nonce_store: &NonceStore,
    spt_did: &str,
) -> Result<(), SoulprintError> {
    // 1. Deserializes cleanly with the expected typ.
    let proof = DpopProof::decode(proof_header)?;
    if proof.payload.typ != DPOP_TYP {
        return Err(SoulprintError::DpopMalformed);
    }

    // 2. Issued within the acceptance window.
    let now = now_seconds();
    if proof.payload.iat < now - DPOP_MAX_AGE_SECS || proof.payload.iat > now {
        return Err(SoulprintError::DpopExpired);
    }

    // 3. Nonce unseen.
    if nonce_store.has(&proof.payload.nonce) {
        return Err(SoulprintError::DpopReplay);
    }

    // 4. Method matches.
    if proof.payload.method.to_uppercase() != request_method.to_uppercase() {
        return Err(SoulprintError::DpopMethodMismatch {
            proof: proof.payload.method.clone(),
            request: request_method.to_string(),
        });
    }

    // 5. URL path matches (scheme and host may differ).
    if url_path(&proof.payload.url) != url_path(request_url) {
        return Err(SoulprintError::DpopUrlMismatch);
    }

    // 6. Proof covers this exact token.
    if proof.payload.spt_hash != hex::encode(sha256(spt.as_bytes())) {
        return Err(SoulprintError::DpopSptHashMismatch);
    }

    // 7. Proof key is the token's key.
    if proof.did != spt_did {
        return Err(SoulprintError::DpopDidMismatch);
    }

    // 8. Signature verifies against the proof DID.
    let pubkey = pubkey_from_did(&proof.did).map_err(|_| SoulprintError::DpopBadSignature)?;
    let ok = verify_canonical(&proof.payload, &proof.sig, &pubkey)
        .map_err(|_| SoulprintError::DpopBadSignature)?;
    if !ok {
        return Err(SoulprintError::DpopBadSignature);
    }

    nonce_store.insert(&proof.payload.nonce);
    Ok(())
}

/// Path component of an absolute URL, or the input itself when it is already
/// a bare path.
fn url_path(raw: &str) -> String {
    if raw.starts_with('/') {
        return raw.split('?').next().unwrap_or(raw).to_string();
    }
    match url::Url::parse(raw) {
        Ok(u) => u.path().to_string(),
        Err(_) => raw.to_string(),
    }
}
