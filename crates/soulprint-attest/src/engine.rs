//! Accept, validate, and aggregate signed ±1 reputation events.
//!
//! Policy checks run in a fixed order; each failure maps to one named error
//! kind. Application is commutative (the score is a clamped sum), so import
//! order across peers cannot change the converged reputation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use soulprint_core::constants::{
    ATTESTATION_COOLDOWN_MS, ATT_MAX_AGE_SECONDS, CLOCK_SKEW_MAX_SECONDS, FARMING_THRESHOLD,
    FARMING_WINDOW_MS, MIN_ATTESTER_SCORE, PROTOCOL_HASH_HEX,
};
use soulprint_core::error::SoulprintError;
use soulprint_core::types::{Attestation, Did, Reputation};
use soulprint_crypto::{sha256, NodeKeypair};
use soulprint_gossip::{AttestMsg, Broadcast, GossipMessage};
use soulprint_state::DebouncedWriter;

/// A policy-checked attestation request. `issuer_score` is the issuer's
/// current total score, established at the HTTP boundary from the verified
/// SPT before the engine is invoked.
#[derive(Debug, Clone)]
pub struct AttestRequest {
    pub issuer: Did,
    pub target: Did,
    pub value: i8,
    pub context: String,
    pub issuer_score: u8,
}

#[derive(Debug, Clone)]
pub enum AttestEvent {
    Accepted(Attestation),
    FarmingDetected { issuer: Did, target: Did },
    Imported { count: usize },
}

type Observer = Box<dyn Fn(&AttestEvent) + Send + Sync>;

pub struct AttestationEngine {
    keypair: Arc<NodeKeypair>,
    broadcaster: Arc<dyn Broadcast>,
    history: RwLock<Vec<Attestation>>,
    seen_hashes: RwLock<HashSet<String>>,
    /// `(issuer, target)` → last attestation, Unix ms.
    cooldowns: RwLock<HashMap<(String, String), i64>>,
    reputation: RwLock<HashMap<String, Reputation>>,
    observer: Observer,
    history_writer: Option<DebouncedWriter>,
    rep_writer: Option<DebouncedWriter>,
}

impl AttestationEngine {
    pub fn new(keypair: Arc<NodeKeypair>, broadcaster: Arc<dyn Broadcast>) -> Self {
        Self {
            keypair,
            broadcaster,
            history: RwLock::new(Vec::new()),
            seen_hashes: RwLock::new(HashSet::new()),
            cooldowns: RwLock::new(HashMap::new()),
            reputation: RwLock::new(HashMap::new()),
            observer: Box::new(|_| {}),
            history_writer: None,
            rep_writer: None,
        }
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    /// Attach debounced writers for `attestations.json` and `rep.json`.
    pub fn with_persistence(mut self, history: DebouncedWriter, rep: DebouncedWriter) -> Self {
        self.history_writer = Some(history);
        self.rep_writer = Some(rep);
        self
    }

    fn emit(&self, event: AttestEvent) {
        (self.observer)(&event);
    }

    // ── Local attest ─────────────────────────────────────────────────────────

    /// Accept a locally submitted attestation at `now_ms`.
    pub fn attest(&self, req: &AttestRequest, now_ms: i64) -> Result<Attestation, SoulprintError> {
        if req.issuer == req.target {
            return Err(SoulprintError::SameIssuerTarget);
        }
        if req.issuer_score < MIN_ATTESTER_SCORE {
            return Err(SoulprintError::IssuerNotAuthorized {
                score: req.issuer_score,
                min: MIN_ATTESTER_SCORE,
            });
        }
        if req.value != 1 && req.value != -1 {
            return Err(SoulprintError::InvalidValue(req.value));
        }

        let pair = (req.issuer.to_string(), req.target.to_string());
        if let Some(&last) = self.cooldowns.read().expect("cooldown lock").get(&pair) {
            let elapsed = now_ms - last;
            if elapsed < ATTESTATION_COOLDOWN_MS {
                return Err(SoulprintError::CooldownActive {
                    remaining_ms: ATTESTATION_COOLDOWN_MS - elapsed,
                });
            }
        }

        // Anti-farming: ≥ 7 attestations to the same target inside the
        // trailing 7-day window demotes this one to −1 (it does not fail).
        let mut value = req.value;
        let recent = self.count_recent(&req.issuer, &req.target, now_ms);
        if recent >= FARMING_THRESHOLD {
            warn!(
                issuer = %req.issuer,
                target = %req.target,
                recent,
                "farming detected; demoting attestation to -1"
            );
            self.emit(AttestEvent::FarmingDetected {
                issuer: req.issuer.clone(),
                target: req.target.clone(),
            });
            value = -1;
        }

        let ts = now_ms / 1_000;
        let tuple = Attestation::canonical_tuple(&req.issuer, &req.target, value, &req.context, ts);
        let signature = hex::encode(self.keypair.sign(&sha256(tuple.as_bytes())));
        let entry = Attestation {
            issuer: req.issuer.clone(),
            target: req.target.clone(),
            value,
            context: req.context.clone(),
            ts,
            signature,
            msg_hash: Attestation::compute_msg_hash(&req.issuer, &req.target, value, &req.context, ts),
        };

        self.apply(entry.clone(), now_ms);
        info!(
            issuer = %entry.issuer,
            target = %entry.target,
            value = entry.value,
            "attestation accepted"
        );

        let mut msg = AttestMsg {
            protocol_hash: PROTOCOL_HASH_HEX.clone(),
            attestation: entry.clone(),
            sender_did: self.keypair.did.clone(),
            ts,
            signature: String::new(),
        };
        if msg.sign(&self.keypair).is_ok() {
            self.broadcaster.broadcast(GossipMessage::Attest(msg));
        }

        self.emit(AttestEvent::Accepted(entry.clone()));
        Ok(entry)
    }

    // ── Wire receive ─────────────────────────────────────────────────────────

    /// Apply an attestation that arrived over gossip. Signature verification
    /// happened at the boundary; this path only gates and applies, and must
    /// not block.
    pub fn handle(&self, msg: &AttestMsg, now_ms: i64) {
        if msg.protocol_hash != *PROTOCOL_HASH_HEX {
            debug!(theirs = %msg.protocol_hash, "attestation with foreign protocol hash dropped");
            return;
        }
        let att = &msg.attestation;

        let expected = Attestation::compute_msg_hash(
            &att.issuer,
            &att.target,
            att.value,
            &att.context,
            att.ts,
        );
        if expected != att.msg_hash {
            debug!("attestation with inconsistent msg_hash dropped");
            return;
        }
        if self.seen_hashes.read().expect("seen lock").contains(&att.msg_hash) {
            return;
        }

        // Live gossip must be fresh; stale or future-dated events are left to
        // anti-entropy sync, which imports history without this gate.
        let now_secs = now_ms / 1_000;
        if att.ts < now_secs - ATT_MAX_AGE_SECONDS || att.ts > now_secs + CLOCK_SKEW_MAX_SECONDS {
            debug!(ts = att.ts, "attestation outside freshness window dropped");
            return;
        }

        let pair = (att.issuer.to_string(), att.target.to_string());
        let last = self
            .cooldowns
            .read()
            .expect("cooldown lock")
            .get(&pair)
            .copied()
            .unwrap_or(0);
        if last > 0 && att.ts * 1_000 < last + ATTESTATION_COOLDOWN_MS {
            warn!(
                issuer = %att.issuer,
                target = %att.target,
                "inbound attestation inside cooldown dropped"
            );
            return;
        }

        self.apply(att.clone(), now_ms);
        self.emit(AttestEvent::Accepted(att.clone()));
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Reputation for `did`; unknown DIDs read as the neutral default.
    pub fn get_reputation(&self, did: &Did) -> Reputation {
        self.reputation
            .read()
            .expect("reputation lock")
            .get(did.as_str())
            .copied()
            .unwrap_or_default()
    }

    pub fn attestation_count(&self) -> usize {
        self.history.read().expect("history lock").len()
    }

    /// Unix seconds of the newest attestation, 0 when empty.
    pub fn latest_ts(&self) -> i64 {
        self.history
            .read()
            .expect("history lock")
            .iter()
            .map(|a| a.ts)
            .max()
            .unwrap_or(0)
    }

    pub fn snapshot_history(&self) -> Vec<Attestation> {
        self.history.read().expect("history lock").clone()
    }

    pub fn snapshot_reputation(&self) -> BTreeMap<String, Reputation> {
        self.reputation
            .read()
            .expect("reputation lock")
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Attestations issued to `target` since `since_ts` (seconds), for sync
    /// pages.
    pub fn history_since(&self, since_ts: i64) -> Vec<Attestation> {
        self.history
            .read()
            .expect("history lock")
            .iter()
            .filter(|a| a.ts > since_ts)
            .cloned()
            .collect()
    }

    // ── Import ───────────────────────────────────────────────────────────────

    /// Merge a remote history by union over `msg_hash`. Returns the number of
    /// newly imported entries; a repeat import returns zero.
    pub fn import_state(&self, remote: &[Attestation]) -> usize {
        let mut imported = 0;
        for att in remote {
            let expected = Attestation::compute_msg_hash(
                &att.issuer,
                &att.target,
                att.value,
                &att.context,
                att.ts,
            );
            if expected != att.msg_hash {
                debug!("imported attestation with inconsistent msg_hash skipped");
                continue;
            }
            if self.seen_hashes.read().expect("seen lock").contains(&att.msg_hash) {
                continue;
            }
            self.apply(att.clone(), att.ts * 1_000);
            imported += 1;
        }
        if imported > 0 {
            self.emit(AttestEvent::Imported { count: imported });
        }
        imported
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn count_recent(&self, issuer: &Did, target: &Did, now_ms: i64) -> usize {
        let window_start = now_ms - FARMING_WINDOW_MS;
        self.history
            .read()
            .expect("history lock")
            .iter()
            .filter(|a| {
                a.issuer == *issuer
                    && a.target == *target
                    && a.ts * 1_000 > window_start
                    && a.ts * 1_000 <= now_ms
            })
            .count()
    }

    /// Append + index + cooldown + clamped reputation delta, then persist.
    fn apply(&self, att: Attestation, applied_at_ms: i64) {
        self.seen_hashes
            .write()
            .expect("seen lock")
            .insert(att.msg_hash.clone());

        let pair = (att.issuer.to_string(), att.target.to_string());
        {
            let mut cooldowns = self.cooldowns.write().expect("cooldown lock");
            let slot = cooldowns.entry(pair).or_insert(0);
            *slot = (*slot).max(att.ts * 1_000);
        }
        {
            let mut reps = self.reputation.write().expect("reputation lock");
            reps.entry(att.target.to_string())
                .or_default()
                .apply(att.value, applied_at_ms);
        }
        self.history.write().expect("history lock").push(att);

        if let Some(w) = &self.history_writer {
            w.write(&self.snapshot_history());
        }
        if let Some(w) = &self.rep_writer {
            w.write(&self.snapshot_reputation());
        }
    }
}
