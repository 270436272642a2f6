use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use soulprint_core::error::SoulprintError;

/// AES-256-GCM seal. Returns ciphertext with the 16-byte tag appended.
pub fn aead_seal(
    key: &[u8; 32],
    nonce: &[u8; 12],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, SoulprintError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| SoulprintError::Serialization("AEAD seal failed".into()))
}

/// AES-256-GCM open. `ciphertext` carries the tag as its last 16 bytes.
///
/// A wrong key, tampered ciphertext, or mismatched AAD all fail identically;
/// nothing distinguishes the causes.
pub fn aead_open(
    key: &[u8; 32],
    nonce: &[u8; 12],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, SoulprintError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| SoulprintError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let key = [9u8; 32];
        let nonce = [1u8; 12];
        let ct = aead_seal(&key, &nonce, b"aad", b"secret").unwrap();
        assert_eq!(ct.len(), 6 + 16);
        let pt = aead_open(&key, &nonce, b"aad", &ct).unwrap();
        assert_eq!(pt, b"secret");
    }

    #[test]
    fn tamper_and_wrong_aad_fail_identically() {
        let key = [9u8; 32];
        let nonce = [1u8; 12];
        let mut ct = aead_seal(&key, &nonce, b"aad", b"secret").unwrap();
        assert!(aead_open(&key, &nonce, b"other", &ct).is_err());
        ct[0] ^= 1;
        assert!(aead_open(&key, &nonce, b"aad", &ct).is_err());
    }
}
