//! Epoch-keyed authenticated encryption for inter-node traffic.
//!
//! The key is derived from `PROTOCOL_HASH`, so a node running a different
//! protocol revision can neither read nor inject gossip; mismatched fleets
//! partition automatically.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use soulprint_core::constants::{GOSSIP_EPOCH_MS, GOSSIP_VERSION, PROTOCOL_HASH, PROTOCOL_HASH_HEX};
use soulprint_core::time::now_ms;
use soulprint_crypto::{aead_open, aead_seal, hmac_sha256};

use crate::message::GossipMessage;

#[derive(Debug, Error)]
pub enum GossipError {
    #[error("unsupported gossip envelope version {0}")]
    UnsupportedVersion(u8),

    #[error("epoch {epoch} outside the accepted window around {current}")]
    EpochOutOfWindow { epoch: i64, current: i64 },

    /// Wrong key, tampering, or truncation; deliberately indistinguishable.
    #[error("gossip envelope failed authentication")]
    AuthFailed,

    #[error("gossip serialization: {0}")]
    Serialization(String),
}

/// Sealed gossip envelope as carried in `POST /state/merge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub v: u8,
    /// Epoch number the key was derived for.
    pub ep: i64,
    /// 12-byte nonce, base64.
    pub iv: String,
    /// Ciphertext with 16-byte tag appended, base64.
    pub ct: String,
}

/// Epoch number for a millisecond timestamp.
pub fn epoch_at(ms: i64) -> i64 {
    ms / GOSSIP_EPOCH_MS
}

/// The current gossip epoch.
pub fn current_epoch() -> i64 {
    epoch_at(now_ms())
}

fn epoch_key(epoch: i64) -> [u8; 32] {
    let info = format!("soulprint-gossip-v1:{}:epoch:{}", *PROTOCOL_HASH_HEX, epoch);
    hmac_sha256(&*PROTOCOL_HASH, info.as_bytes())
}

fn epoch_aad(epoch: i64) -> Vec<u8> {
    format!("epoch:{epoch}").into_bytes()
}

/// Seal a message under the current epoch's key.
pub fn seal_message(msg: &GossipMessage) -> Result<Envelope, GossipError> {
    let plaintext =
        serde_json::to_vec(msg).map_err(|e| GossipError::Serialization(e.to_string()))?;
    let epoch = current_epoch();

    let mut iv = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut iv);

    let ct = aead_seal(&epoch_key(epoch), &iv, &epoch_aad(epoch), &plaintext)
        .map_err(|_| GossipError::AuthFailed)?;

    Ok(Envelope {
        v: GOSSIP_VERSION,
        ep: epoch,
        iv: B64.encode(iv),
        ct: B64.encode(ct),
    })
}

/// Open an envelope. Accepts epochs within ±1 of the current one.
pub fn open_envelope(env: &Envelope) -> Result<GossipMessage, GossipError> {
    if env.v != GOSSIP_VERSION {
        return Err(GossipError::UnsupportedVersion(env.v));
    }

    let current = current_epoch();
    if (env.ep - current).abs() > 1 {
        return Err(GossipError::EpochOutOfWindow {
            epoch: env.ep,
            current,
        });
    }

    let iv_bytes = B64.decode(&env.iv).map_err(|_| GossipError::AuthFailed)?;
    let iv: [u8; 12] = iv_bytes.try_into().map_err(|_| GossipError::AuthFailed)?;
    let ct = B64.decode(&env.ct).map_err(|_| GossipError::AuthFailed)?;

    let plaintext = aead_open(&epoch_key(env.ep), &iv, &epoch_aad(env.ep), &ct)
        .map_err(|_| GossipError::AuthFailed)?;

    serde_json::from_slice(&plaintext).map_err(|e| GossipError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use soulprint_core::types::{Did, Nullifier, VoteChoice};
    use soulprint_crypto::NodeKeypair;

    fn sample_message() -> GossipMessage {
        let kp = NodeKeypair::generate();
        let mut m = crate::message::VoteMsg {
            protocol_hash: PROTOCOL_HASH_HEX.clone(),
            nullifier: Nullifier::from_bytes([7; 32]),
            vote: VoteChoice::Accept,
            voter_did: kp.did.clone(),
            ts: 1_700_000_000,
            signature: String::new(),
        };
        m.sign(&kp).unwrap();
        GossipMessage::Vote(m)
    }

    #[test]
    fn seal_open_round_trip_same_epoch() {
        let msg = sample_message();
        let env = seal_message(&msg).unwrap();
        assert_eq!(env.v, GOSSIP_VERSION);

        let opened = open_envelope(&env).unwrap();
        assert_eq!(opened.msg_hash(), msg.msg_hash());
    }

    #[test]
    fn adjacent_epoch_accepted_distant_rejected() {
        let msg = sample_message();
        let mut env = seal_message(&msg).unwrap();

        // One epoch old: key differs from the envelope's claimed epoch only
        // if we also shift `ep`, so shift it and re-seal under that key.
        let old_epoch = current_epoch() - 1;
        let plaintext = serde_json::to_vec(&msg).unwrap();
        let mut iv = [3u8; 12];
        iv[0] = 9;
        let ct = aead_seal(&epoch_key(old_epoch), &iv, &epoch_aad(old_epoch), &plaintext).unwrap();
        env.ep = old_epoch;
        env.iv = B64.encode(iv);
        env.ct = B64.encode(ct);
        assert!(open_envelope(&env).is_ok());

        env.ep = current_epoch() - 2;
        assert!(matches!(
            open_envelope(&env),
            Err(GossipError::EpochOutOfWindow { .. })
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let env = seal_message(&sample_message()).unwrap();
        let mut ct = B64.decode(&env.ct).unwrap();
        ct[0] ^= 0xFF;
        let tampered = Envelope {
            ct: B64.encode(ct),
            ..env
        };
        assert!(matches!(open_envelope(&tampered), Err(GossipError::AuthFailed)));
    }

    #[test]
    fn foreign_version_rejected() {
        let mut env = seal_message(&sample_message()).unwrap();
        env.v = 2;
        assert!(matches!(
            open_envelope(&env),
            Err(GossipError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn did_type_is_wire_compatible() {
        // Envelope payloads embed DIDs transparently as strings.
        let msg = sample_message();
        let json = serde_json::to_value(&msg).unwrap();
        let did = json["voter_did"].as_str().unwrap();
        assert!(Did::parse(did).is_ok());
    }
}
