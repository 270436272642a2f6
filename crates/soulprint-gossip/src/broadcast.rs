//! Outbound message fan-out.
//!
//! Broadcast is fire-and-forget: the commit path must never wait on peers.
//! Failures are logged and left to anti-entropy sync to repair.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use soulprint_core::constants::BROADCAST_DEADLINE_SECS;

use crate::cipher::seal_message;
use crate::message::GossipMessage;
use crate::peers::PeerBook;

pub trait Broadcast: Send + Sync {
    fn broadcast(&self, msg: GossipMessage);
}

/// Seals each message under the current epoch key and POSTs it to every
/// peer's `/state/merge`.
pub struct HttpBroadcaster {
    client: reqwest::Client,
    peers: Arc<PeerBook>,
}

impl HttpBroadcaster {
    pub fn new(peers: Arc<PeerBook>) -> Self {
        Self {
            client: reqwest::Client::new(),
            peers,
        }
    }
}

impl Broadcast for HttpBroadcaster {
    fn broadcast(&self, msg: GossipMessage) {
        let envelope = match seal_message(&msg) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "failed to seal gossip message");
                return;
            }
        };
        let urls = self.peers.urls();
        if urls.is_empty() {
            return;
        }

        let client = self.client.clone();
        tokio::spawn(async move {
            for url in urls {
                let target = format!("{}/state/merge", url.trim_end_matches('/'));
                let res = client
                    .post(&target)
                    .timeout(Duration::from_secs(BROADCAST_DEADLINE_SECS))
                    .json(&envelope)
                    .send()
                    .await;
                match res {
                    Ok(resp) if resp.status().is_success() => {
                        debug!(%target, "gossip delivered");
                    }
                    Ok(resp) => warn!(%target, status = %resp.status(), "gossip rejected"),
                    Err(e) => warn!(%target, error = %e, "gossip delivery failed"),
                }
            }
        });
    }
}

/// Discards everything. Single-node mode and tests.
pub struct NullBroadcaster;

impl Broadcast for NullBroadcaster {
    fn broadcast(&self, _msg: GossipMessage) {}
}
