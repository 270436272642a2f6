//! Canonical JSON: the single bytes-to-sign serialization.
//!
//! Rules: object keys in producer insertion order (struct declaration order
//! for derived types; `serde_json`'s preserve-order map for dynamic values),
//! no whitespace. Signer and verifier both call these functions, so a token
//! body round-trips byte-for-byte.

use serde::Serialize;

use crate::error::SoulprintError;

/// Serialize `value` to its canonical byte form.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, SoulprintError> {
    serde_json::to_vec(value).map_err(|e| SoulprintError::Serialization(e.to_string()))
}

/// Canonical form as a `String` (for hashing into text-shaped tuples).
pub fn canonical_json_string<T: Serialize>(value: &T) -> Result<String, SoulprintError> {
    serde_json::to_string(value).map_err(|e| SoulprintError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Payload {
        b: u32,
        a: u32,
    }

    #[test]
    fn keys_follow_declaration_order() {
        let bytes = canonical_json(&Payload { b: 2, a: 1 }).unwrap();
        assert_eq!(bytes, br#"{"b":2,"a":1}"#);
    }

    #[test]
    fn no_whitespace() {
        let s = canonical_json_string(&serde_json::json!({"x": [1, 2], "y": "z"})).unwrap();
        assert!(!s.contains(' '));
    }
}
