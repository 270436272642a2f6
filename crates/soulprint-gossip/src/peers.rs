use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use soulprint_core::time::now_ms;
use soulprint_core::types::Did;

/// One known peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub did: Did,
    /// Base URL, e.g. `http://10.0.0.2:7000`.
    pub url: String,
    pub last_seen_ms: i64,
}

/// The current peer set. Messages from DIDs not present here are dropped.
#[derive(Default)]
pub struct PeerBook {
    peers: RwLock<HashMap<Did, PeerInfo>>,
}

impl PeerBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, did: Did, url: String) {
        let mut peers = self.peers.write().expect("peer book lock");
        peers.insert(
            did.clone(),
            PeerInfo {
                did,
                url,
                last_seen_ms: now_ms(),
            },
        );
    }

    pub fn contains(&self, did: &Did) -> bool {
        self.peers.read().expect("peer book lock").contains_key(did)
    }

    pub fn touch(&self, did: &Did) {
        if let Some(p) = self.peers.write().expect("peer book lock").get_mut(did) {
            p.last_seen_ms = now_ms();
        }
    }

    pub fn all(&self) -> Vec<PeerInfo> {
        self.peers.read().expect("peer book lock").values().cloned().collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.all().into_iter().map(|p| p.url).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().expect("peer book lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
