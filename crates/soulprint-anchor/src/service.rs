//! Non-blocking durable backup of committed facts to an external ledger.
//!
//! The caller's commit path only drops an item into a bounded channel and
//! moves on. A worker retries each item against the ledger; exhausted items
//! land in per-kind disk queues that a periodic flusher drains whenever the
//! ledger is reachable. With no ledger configured the service journals only.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use soulprint_core::constants::{ANCHOR_BACKOFF_SECS, ANCHOR_FLUSH_INTERVAL_SECS, ANCHOR_QUEUE_CAP};
use soulprint_core::error::SoulprintError;
use soulprint_core::types::{Did, Nullifier};

use crate::queue::DiskQueue;

/// Committed identity fact, as the ledger contract wants it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NullifierAnchor {
    pub nullifier: Nullifier,
    pub did: Did,
    pub document_verified: bool,
    pub face_verified: bool,
    pub zk_proof: String,
}

/// Accepted attestation fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationAnchor {
    pub issuer: Did,
    pub target: Did,
    pub value: i8,
    pub context: String,
    pub signature: String,
}

/// The abstract ledger. RPC details, contract bytecode, and gas live on the
/// other side of this trait.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn register_identity(&self, item: &NullifierAnchor) -> Result<String, SoulprintError>;
    async fn attest(&self, item: &AttestationAnchor) -> Result<String, SoulprintError>;
    /// Pull previously anchored identities: the restore path used when no
    /// peer is reachable at startup.
    async fn load_identities(&self) -> Result<Vec<NullifierAnchor>, SoulprintError>;
}

#[derive(Debug, Clone)]
pub struct AnchorConfig {
    pub backoff_secs: [u64; 3],
    pub flush_interval_secs: u64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            backoff_secs: ANCHOR_BACKOFF_SECS,
            flush_interval_secs: ANCHOR_FLUSH_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone)]
enum AnchorItem {
    Nullifier(NullifierAnchor),
    Attestation(AttestationAnchor),
}

struct Inner {
    ledger: Option<Arc<dyn LedgerClient>>,
    nullifier_queue: DiskQueue<NullifierAnchor>,
    attestation_queue: DiskQueue<AttestationAnchor>,
    config: AnchorConfig,
}

pub struct AnchorService {
    tx: mpsc::Sender<AnchorItem>,
    inner: Arc<Inner>,
    worker: tokio::task::JoinHandle<()>,
    flusher: tokio::task::JoinHandle<()>,
}

impl AnchorService {
    /// Start the worker and flusher. Queue files live under `state_dir`.
    pub fn spawn(
        state_dir: &Path,
        ledger: Option<Arc<dyn LedgerClient>>,
        config: AnchorConfig,
    ) -> Self {
        let inner = Arc::new(Inner {
            ledger,
            nullifier_queue: DiskQueue::open(state_dir.join("anchor-nullifiers.json")),
            attestation_queue: DiskQueue::open(state_dir.join("anchor-attestations.json")),
            config,
        });

        let (tx, mut rx) = mpsc::channel::<AnchorItem>(ANCHOR_QUEUE_CAP);

        let worker_inner = Arc::clone(&inner);
        let worker = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                worker_inner.process(item).await;
            }
        });

        let flusher_inner = Arc::clone(&inner);
        let flush_secs = flusher_inner.config.flush_interval_secs;
        let flusher = tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(flush_secs));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Skip the immediate first tick; queues were just loaded.
            tick.tick().await;
            loop {
                tick.tick().await;
                flusher_inner.flush_queues().await;
            }
        });

        Self {
            tx,
            inner,
            worker,
            flusher,
        }
    }

    /// Fire-and-forget backup of a committed identity.
    pub fn anchor_nullifier(&self, item: NullifierAnchor) {
        self.enqueue(AnchorItem::Nullifier(item));
    }

    /// Fire-and-forget backup of an accepted attestation.
    pub fn anchor_attestation(&self, item: AttestationAnchor) {
        self.enqueue(AnchorItem::Attestation(item));
    }

    fn enqueue(&self, item: AnchorItem) {
        if self.inner.ledger.is_none() {
            // No-backup mode: journal for a later drain.
            self.inner.journal(item);
            return;
        }
        if let Err(mpsc::error::TrySendError::Full(item) | mpsc::error::TrySendError::Closed(item)) =
            self.tx.try_send(item)
        {
            warn!("anchor channel saturated; journaling item to disk");
            self.inner.journal(item);
        }
    }

    /// Previously anchored identities, for restore when peers are down.
    pub async fn load_backup(&self) -> Vec<NullifierAnchor> {
        match &self.inner.ledger {
            Some(ledger) => match ledger.load_identities().await {
                Ok(items) => items,
                Err(e) => {
                    warn!(error = %e, "ledger restore failed");
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    pub fn queued(&self) -> (usize, usize) {
        (
            self.inner.nullifier_queue.len(),
            self.inner.attestation_queue.len(),
        )
    }

    /// Stop the background tasks. Disk queues keep anything unfinished.
    pub fn shutdown(&self) {
        self.worker.abort();
        self.flusher.abort();
    }
}

impl Inner {
    fn journal(&self, item: AnchorItem) {
        match item {
            AnchorItem::Nullifier(n) => self.nullifier_queue.push(n),
            AnchorItem::Attestation(a) => self.attestation_queue.push(a),
        }
    }

    /// Try an item against the ledger with the `[0, 2, 8] s` schedule; on
    /// exhaustion, journal it.
    async fn process(&self, item: AnchorItem) {
        let Some(ledger) = &self.ledger else {
            self.journal(item);
            return;
        };

        for (attempt, delay) in self.config.backoff_secs.iter().enumerate() {
            if *delay > 0 {
                tokio::time::sleep(Duration::from_secs(*delay)).await;
            }
            let result = match &item {
                AnchorItem::Nullifier(n) => ledger.register_identity(n).await,
                AnchorItem::Attestation(a) => ledger.attest(a).await,
            };
            match result {
                Ok(receipt) => {
                    debug!(receipt, "anchored");
                    return;
                }
                // The ledger already holds the fact; that is success.
                Err(e)
                    if e.to_string().contains("NullifierAlreadyUsed")
                        || e.to_string().contains("CooldownActive") =>
                {
                    debug!(error = %e, "ledger already reflects this fact");
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "anchor attempt failed");
                }
            }
        }
        self.journal(item);
    }

    /// Drain the disk queues while the ledger answers; anything that fails
    /// goes straight back.
    async fn flush_queues(&self) {
        if self.ledger.is_none() {
            return;
        }
        let nullifiers = self.nullifier_queue.drain();
        let attestations = self.attestation_queue.drain();
        if nullifiers.is_empty() && attestations.is_empty() {
            return;
        }
        info!(
            nullifiers = nullifiers.len(),
            attestations = attestations.len(),
            "draining anchor queues"
        );
        for n in nullifiers {
            self.process(AnchorItem::Nullifier(n)).await;
        }
        for a in attestations {
            self.process(AnchorItem::Attestation(a)).await;
        }
    }
}
