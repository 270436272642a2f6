use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::Serialize;

use soulprint_core::canonical::canonical_json;
use soulprint_core::error::SoulprintError;

use crate::hash::sha256;

/// Sign raw bytes with an Ed25519 secret key → 64-byte signature.
pub fn sign(message: &[u8], key: &SigningKey) -> [u8; 64] {
    key.sign(message).to_bytes()
}

/// Verify a 64-byte Ed25519 signature against a raw 32-byte public key.
pub fn verify(message: &[u8], signature: &[u8; 64], pubkey: &[u8; 32]) -> bool {
    let Ok(vk) = VerifyingKey::from_bytes(pubkey) else {
        return false;
    };
    vk.verify(message, &Signature::from_bytes(signature)).is_ok()
}

/// Sign `sha256(canonical_json(payload))`, the protocol uniform signing
/// input, returning the signature as hex.
pub fn sign_canonical<T: Serialize>(payload: &T, key: &SigningKey) -> Result<String, SoulprintError> {
    let digest = sha256(&canonical_json(payload)?);
    Ok(hex::encode(sign(&digest, key)))
}

/// Verify a hex signature over `sha256(canonical_json(payload))`.
///
/// The payload must re-serialize byte-for-byte identically to the signer's
/// output, which the canonical-JSON rules guarantee for shared types.
pub fn verify_canonical<T: Serialize>(
    payload: &T,
    signature_hex: &str,
    pubkey: &[u8; 32],
) -> Result<bool, SoulprintError> {
    let bytes = hex::decode(signature_hex).map_err(|_| SoulprintError::InvalidSignature)?;
    let sig: [u8; 64] = bytes
        .try_into()
        .map_err(|_| SoulprintError::InvalidSignature)?;
    let digest = sha256(&canonical_json(payload)?);
    Ok(verify(&digest, &sig, pubkey))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn sign_verify_round_trip() {
        let key = SigningKey::generate(&mut OsRng);
        let msg = b"one human, one soulprint";
        let sig = sign(msg, &key);
        assert!(verify(msg, &sig, key.verifying_key().as_bytes()));
        assert!(!verify(b"tampered", &sig, key.verifying_key().as_bytes()));
    }

    #[test]
    fn canonical_signature_survives_reserialization() {
        #[derive(serde::Serialize)]
        struct P {
            a: u32,
            b: String,
        }
        let key = SigningKey::generate(&mut OsRng);
        let p = P { a: 7, b: "x".into() };
        let sig = sign_canonical(&p, &key).unwrap();
        assert!(verify_canonical(&p, &sig, key.verifying_key().as_bytes()).unwrap());
    }
}
