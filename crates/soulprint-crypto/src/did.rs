use soulprint_core::error::SoulprintError;
use soulprint_core::types::Did;

/// Derive a `did:key` DID from a raw Ed25519 public key.
pub fn did_from_pubkey(pubkey: &[u8; 32]) -> Did {
    Did::from_pubkey(pubkey)
}

/// Recover the 32-byte Ed25519 public key from a DID string.
pub fn pubkey_from_did(did: &str) -> Result<[u8; 32], SoulprintError> {
    Did::parse(did).and_then(|d| d.pubkey())
}
