//! DPoP proof construction. Build and verify ship together so the node's own
//! outbound calls and the test suite mint proofs the same way clients do.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use soulprint_core::error::SoulprintError;
use soulprint_core::time::now_seconds;
use soulprint_crypto::{sha256, NodeKeypair};

pub const DPOP_TYP: &str = "soulprint-dpop";

/// Signed claims. Declaration order is the canonical key order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpopPayload {
    pub typ: String,
    pub method: String,
    pub url: String,
    /// 16 random bytes, hex.
    pub nonce: String,
    /// Unix seconds.
    pub iat: i64,
    /// `sha256(spt)` hex.
    pub spt_hash: String,
}

/// Wire envelope: base64url of this JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpopProof {
    pub payload: DpopPayload,
    pub sig: String,
    pub did: String,
}

impl DpopProof {
    pub fn encode(&self) -> Result<String, SoulprintError> {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
        let json =
            serde_json::to_vec(self).map_err(|e| SoulprintError::Serialization(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(header: &str) -> Result<Self, SoulprintError> {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
        let bytes = URL_SAFE_NO_PAD
            .decode(header.trim())
            .map_err(|_| SoulprintError::DpopMalformed)?;
        serde_json::from_slice(&bytes).map_err(|_| SoulprintError::DpopMalformed)
    }
}

/// Build a proof binding `spt` to `keypair` for one `method` + `url` request.
pub fn build_proof(
    keypair: &NodeKeypair,
    method: &str,
    url: &str,
    spt: &str,
) -> Result<String, SoulprintError> {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);

    let payload = DpopPayload {
        typ: DPOP_TYP.to_string(),
        method: method.to_uppercase(),
        url: url.to_string(),
        nonce: hex::encode(nonce),
        iat: now_seconds(),
        spt_hash: hex::encode(sha256(spt.as_bytes())),
    };
    let sig = keypair.sign_canonical(&payload)?;
    DpopProof {
        payload,
        sig,
        did: keypair.did.to_string(),
    }
    .encode()
}
