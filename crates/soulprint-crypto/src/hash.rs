use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

/// SHA-256 of arbitrary bytes → 32-byte array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

/// HMAC-SHA256 keyed digest → 32-byte array.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Poseidon-style sponge over field elements.
///
/// The real Poseidon permutation lives inside the external ZK circuit; the
/// core only needs a deterministic digest that stays inside the BN254 scalar
/// field. Absorb each element into a SHA-256 chain, then mask the top three
/// bits so the output is below the field modulus (2^253 < r < 2^254).
pub fn poseidon_like(fields: &[[u8; 32]]) -> [u8; 32] {
    let mut state = sha256(b"soulprint-poseidon-v1");
    for field in fields {
        let mut h = Sha256::new();
        h.update(state);
        h.update(field);
        state = h.finalize().into();
    }
    state[0] &= 0x1F;
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hmac_differs_by_key() {
        let a = hmac_sha256(b"key-a", b"payload");
        let b = hmac_sha256(b"key-b", b"payload");
        assert_ne!(a, b);
    }

    #[test]
    fn poseidon_like_is_deterministic_and_field_sized() {
        let f1 = [1u8; 32];
        let f2 = [2u8; 32];
        let h1 = poseidon_like(&[f1, f2]);
        let h2 = poseidon_like(&[f1, f2]);
        assert_eq!(h1, h2);
        assert_ne!(h1, poseidon_like(&[f2, f1]));
        assert!(h1[0] < 0x20);
    }
}
