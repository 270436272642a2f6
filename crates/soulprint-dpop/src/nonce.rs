use std::collections::HashMap;
use std::sync::RwLock;

use soulprint_core::constants::DPOP_MAX_AGE_SECS;
use soulprint_core::time::now_ms;

/// Single-use nonce store with lazy expiry.
///
/// Entries are swept on every lookup: anything older than the DPoP max age
/// is dropped, so the map never outgrows the proofs accepted in one window.
#[derive(Default)]
pub struct NonceStore {
    seen: RwLock<HashMap<String, i64>>,
}

impl NonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `nonce` was accepted within the retention window. Sweeps
    /// expired entries as a side effect.
    pub fn has(&self, nonce: &str) -> bool {
        let cutoff = now_ms() - DPOP_MAX_AGE_SECS * 1_000;
        let mut seen = self.seen.write().expect("nonce store lock");
        seen.retain(|_, first_seen| *first_seen > cutoff);
        seen.contains_key(nonce)
    }

    /// Record an accepted nonce.
    pub fn insert(&self, nonce: &str) {
        self.seen
            .write()
            .expect("nonce store lock")
            .insert(nonce.to_string(), now_ms());
    }

    pub fn len(&self) -> usize {
        self.seen.read().expect("nonce store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_has() {
        let store = NonceStore::new();
        assert!(!store.has("n1"));
        store.insert("n1");
        assert!(store.has("n1"));
        assert!(!store.has("n2"));
    }

    #[test]
    fn stale_entries_are_swept_on_lookup() {
        let store = NonceStore::new();
        store
            .seen
            .write()
            .unwrap()
            .insert("old".into(), now_ms() - (DPOP_MAX_AGE_SECS + 1) * 1_000);
        store.insert("fresh");
        assert!(!store.has("old"));
        assert!(store.has("fresh"));
        assert_eq!(store.len(), 1);
    }
}
