//! Pull-based anti-entropy reconciliation.
//!
//! Every tick, compare state hashes with each peer and page in whatever is
//! missing. One successful peer per tick is enough; conflicts resolve inside
//! the engines' import paths.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info, warn};

use soulprint_attest::AttestationEngine;
use soulprint_consensus::NullifierConsensus;
use soulprint_core::constants::{
    PROTOCOL_HASH_HEX, SYNC_HASH_DEADLINE_SECS, SYNC_INTERVAL_SECS, SYNC_PAGE_DEADLINE_SECS,
    SYNC_PAGE_LIMIT, VERIFY_RETRY_BASE_MS, VERIFY_RETRY_JITTER_MS, VERIFY_RETRY_MAX,
    VERIFY_RETRY_MAX_MS,
};
use soulprint_core::error::SoulprintError;
use soulprint_core::time::now_seconds;
use soulprint_gossip::PeerBook;

use crate::api::{StateHashResponse, StateInfoResponse, StatePage};

/// Peer state access, abstracted so the loop can be driven against fakes.
#[async_trait]
pub trait StateFetch: Send + Sync {
    async fn state_hash(&self, peer_url: &str) -> Result<StateHashResponse, SoulprintError>;
    async fn state_info(&self, peer_url: &str) -> Result<StateInfoResponse, SoulprintError>;
    async fn state_page(
        &self,
        peer_url: &str,
        page: usize,
        limit: usize,
        since: i64,
    ) -> Result<StatePage, SoulprintError>;
}

/// reqwest-backed fetch with the per-request deadlines from the protocol
/// constants.
pub struct HttpStateFetch {
    client: reqwest::Client,
}

impl HttpStateFetch {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpStateFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateFetch for HttpStateFetch {
    async fn state_hash(&self, peer_url: &str) -> Result<StateHashResponse, SoulprintError> {
        let url = format!("{}/state/hash", peer_url.trim_end_matches('/'));
        get_json(&self.client, &url, SYNC_HASH_DEADLINE_SECS).await
    }

    async fn state_info(&self, peer_url: &str) -> Result<StateInfoResponse, SoulprintError> {
        let url = format!("{}/state/info", peer_url.trim_end_matches('/'));
        get_json(&self.client, &url, SYNC_HASH_DEADLINE_SECS).await
    }

    async fn state_page(
        &self,
        peer_url: &str,
        page: usize,
        limit: usize,
        since: i64,
    ) -> Result<StatePage, SoulprintError> {
        let url = format!(
            "{}/state?page={page}&limit={limit}&since={since}",
            peer_url.trim_end_matches('/')
        );
        get_json(&self.client, &url, SYNC_PAGE_DEADLINE_SECS).await
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    deadline_secs: u64,
) -> Result<T, SoulprintError> {
    let resp = client
        .get(url)
        .timeout(Duration::from_secs(deadline_secs))
        .send()
        .await
        .map_err(|e| SoulprintError::PeerUnreachable(format!("{url}: {e}")))?;
    if !resp.status().is_success() {
        return Err(SoulprintError::PeerUnreachable(format!(
            "{url}: HTTP {}",
            resp.status()
        )));
    }
    resp.json()
        .await
        .map_err(|e| SoulprintError::Serialization(e.to_string()))
}

/// What one `sync_once` call imported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub nullifiers: usize,
    pub attestations: usize,
}

pub struct SyncService {
    consensus: Arc<NullifierConsensus>,
    attest: Arc<AttestationEngine>,
    peers: Arc<PeerBook>,
    fetch: Arc<dyn StateFetch>,
    in_flight: AtomicBool,
    last_sync: AtomicI64,
}

impl SyncService {
    pub fn new(
        consensus: Arc<NullifierConsensus>,
        attest: Arc<AttestationEngine>,
        peers: Arc<PeerBook>,
        fetch: Arc<dyn StateFetch>,
    ) -> Self {
        Self {
            consensus,
            attest,
            peers,
            fetch,
            in_flight: AtomicBool::new(false),
            last_sync: AtomicI64::new(0),
        }
    }

    /// Unix seconds of the last successful sync, 0 if never.
    pub fn last_sync(&self) -> i64 {
        self.last_sync.load(Ordering::Relaxed)
    }

    /// One reconciliation pass. Single-flighted: a call while another is in
    /// progress short-circuits to the zero outcome.
    pub async fn sync_once(&self) -> SyncOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync already in flight; skipping");
            return SyncOutcome::default();
        }
        let outcome = self.sync_inner().await;
        self.in_flight.store(false, Ordering::Release);
        outcome
    }

    async fn sync_inner(&self) -> SyncOutcome {
        let local_hash = self.consensus.state_hash();
        let since = self.last_sync.load(Ordering::Relaxed);

        for peer in self.peers.all() {
            match self.sync_peer(&peer.url, &local_hash, since).await {
                Ok(Some(outcome)) => {
                    self.last_sync.store(now_seconds(), Ordering::Relaxed);
                    info!(
                        peer = %peer.url,
                        nullifiers = outcome.nullifiers,
                        attestations = outcome.attestations,
                        "sync complete"
                    );
                    // One successful peer is sufficient.
                    return outcome;
                }
                Ok(None) => {
                    // Hashes matched; nothing to pull from anyone identical.
                    self.last_sync.store(now_seconds(), Ordering::Relaxed);
                    return SyncOutcome::default();
                }
                Err(e) => {
                    warn!(peer = %peer.url, error = %e, "peer sync failed");
                }
            }
        }
        SyncOutcome::default()
    }

    /// Reconcile against one peer. `Ok(None)` when already converged.
    async fn sync_peer(
        &self,
        url: &str,
        local_hash: &str,
        since: i64,
    ) -> Result<Option<SyncOutcome>, SoulprintError> {
        let hash = self
            .with_retries(|| self.fetch.state_hash(url))
            .await?;
        if hash.hash == local_hash {
            return Ok(None);
        }

        let info = self.fetch.state_info(url).await?;
        if info.protocol_hash != *PROTOCOL_HASH_HEX {
            return Err(SoulprintError::ProtocolHashMismatch {
                theirs: info.protocol_hash,
            });
        }

        let mut outcome = SyncOutcome::default();
        let mut page = 0usize;
        loop {
            let body = self
                .fetch
                .state_page(url, page, SYNC_PAGE_LIMIT, since)
                .await?;
            if body.protocol_hash != *PROTOCOL_HASH_HEX {
                return Err(SoulprintError::ProtocolHashMismatch {
                    theirs: body.protocol_hash,
                });
            }

            outcome.nullifiers += self.consensus.import_state(&body.nullifiers);
            for entries in body.attestations.values() {
                outcome.attestations += self.attest.import_state(entries);
            }

            page += 1;
            if page >= body.total_pages {
                break;
            }
        }
        Ok(Some(outcome))
    }

    /// Retry a transport call with exponential backoff and jitter.
    async fn with_retries<T, F, Fut>(&self, mut call: F) -> Result<T, SoulprintError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, SoulprintError>>,
    {
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < VERIFY_RETRY_MAX => {
                    let delay = backoff_delay(attempt);
                    debug!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run the pull loop until the task is aborted.
    pub fn spawn_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(SYNC_INTERVAL_SECS));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                self.sync_once().await;
            }
        })
    }
}

/// `base × 2^attempt`, capped, plus up to 200 ms of jitter.
fn backoff_delay(attempt: u32) -> Duration {
    let base = VERIFY_RETRY_BASE_MS.saturating_mul(1 << attempt.min(8));
    let jitter = rand::thread_rng().gen_range(0..=VERIFY_RETRY_JITTER_MS);
    Duration::from_millis(base.min(VERIFY_RETRY_MAX_MS) + jitter)
}
