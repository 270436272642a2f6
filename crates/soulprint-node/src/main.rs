//! soulprint-node — a Soulprint validator node.
//!
//! Startup sequence:
//!   1. Load (or create) the node identity keypair
//!   2. Restore persisted state (nullifier registry, attestation history)
//!   3. Discover peers and learn their DIDs via `GET /info`
//!   4. Start the anchor worker, anti-entropy sync loop, and state writer
//!   5. Serve the HTTP API until interrupted

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use soulprint_anchor::{AnchorConfig, AnchorService, NullifierAnchor};
use soulprint_attest::AttestationEngine;
use soulprint_consensus::{ConsensusConfig, NullifierConsensus};
use soulprint_core::constants::ROUND_TIMEOUT_MS;
use soulprint_core::types::{CommitEntry, Did};
use soulprint_crypto::{NodeKeypair, PermissiveVerifier};
use soulprint_dpop::NonceStore;
use soulprint_gossip::{HttpBroadcaster, PeerBook};
use soulprint_rpc::NodeContext;
use soulprint_state::{read_json, DebouncedWriter, StateFile};
use soulprint_sync::{HttpStateFetch, SyncService};

#[derive(Parser, Debug)]
#[command(
    name = "soulprint-node",
    version,
    about = "Soulprint validator node — one human, one soulprint"
)]
struct Args {
    /// Directory for persisted state (identity, registry, queues).
    #[arg(long, default_value = "~/.soulprint")]
    state_dir: PathBuf,

    /// HTTP listen address.
    #[arg(long, default_value = "127.0.0.1:7000")]
    listen: SocketAddr,

    /// Peer base URLs (comma-separated), e.g. http://10.0.0.2:7000.
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Voting peers required for quorum; defaults to the peer count.
    /// 0 = single-node mode (immediate local commits).
    #[arg(long)]
    min_peers: Option<usize>,

    /// Consensus round timeout in milliseconds.
    #[arg(long, default_value_t = ROUND_TIMEOUT_MS)]
    round_timeout_ms: u64,

    /// Reject authenticated requests without a proof-of-possession header.
    #[arg(long, default_value_t = false)]
    require_dpop: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,soulprint=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("Soulprint node starting");

    // ── Identity ──────────────────────────────────────────────────────────────
    let state_dir = expand_tilde(&args.state_dir);
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("creating state dir {}", state_dir.display()))?;

    let keypair = Arc::new(
        NodeKeypair::load_or_create(&state_dir.join("node-identity.json"))
            .context("loading node identity")?,
    );
    info!(did = %keypair.did, "node identity");

    // ── Peers ─────────────────────────────────────────────────────────────────
    let peers = Arc::new(PeerBook::new());
    let min_peers = args.min_peers.unwrap_or(args.peers.len());
    discover_peers(&args.peers, &peers).await;
    spawn_peer_refresh(args.peers.clone(), Arc::clone(&peers));

    // ── Engines ───────────────────────────────────────────────────────────────
    let broadcaster = Arc::new(HttpBroadcaster::new(Arc::clone(&peers)));
    let (state_tx, mut state_rx) = tokio::sync::mpsc::unbounded_channel::<()>();

    let consensus = Arc::new(
        NullifierConsensus::new(
            Arc::clone(&keypair),
            ConsensusConfig {
                min_peers,
                round_timeout_ms: args.round_timeout_ms,
            },
            Arc::clone(&peers),
            Arc::new(PermissiveVerifier),
            broadcaster.clone(),
        )
        .with_observer(Box::new({
            let tx = state_tx.clone();
            move |_| {
                let _ = tx.send(());
            }
        })),
    );

    let attest = Arc::new(
        AttestationEngine::new(Arc::clone(&keypair), broadcaster)
            .with_persistence(
                DebouncedWriter::spawn(state_dir.join("attestations.json")),
                DebouncedWriter::spawn(state_dir.join("rep.json")),
            )
            .with_observer(Box::new({
                let tx = state_tx.clone();
                move |_| {
                    let _ = tx.send(());
                }
            })),
    );

    // ── Restore persisted state ───────────────────────────────────────────────
    restore_state(&state_dir, &consensus, &attest);

    // ── Anchor (no ledger configured → journal-only no-backup mode) ──────────
    let anchor = Arc::new(AnchorService::spawn(&state_dir, None, AnchorConfig::default()));
    if peers.is_empty() && consensus.is_empty() {
        let restored = anchor.load_backup().await;
        if !restored.is_empty() {
            let entries: Vec<CommitEntry> = restored.iter().map(entry_from_anchor).collect();
            let n = consensus.import_state(&entries);
            info!(restored = n, "state restored from ledger backup");
        }
    }

    // ── Sync loop ─────────────────────────────────────────────────────────────
    let sync = Arc::new(SyncService::new(
        Arc::clone(&consensus),
        Arc::clone(&attest),
        Arc::clone(&peers),
        Arc::new(HttpStateFetch::new()),
    ));
    let sync_handle = Arc::clone(&sync).spawn_loop();

    // ── State writer (single writer, debounced) ──────────────────────────────
    let state_writer = DebouncedWriter::spawn(state_dir.join("state.json"));
    let writer_handle = tokio::spawn({
        let consensus = Arc::clone(&consensus);
        let attest = Arc::clone(&attest);
        let peers = Arc::clone(&peers);
        let sync = Arc::clone(&sync);
        async move {
            while state_rx.recv().await.is_some() {
                let snapshot = StateFile {
                    nullifiers: consensus.snapshot(),
                    reputation: attest.snapshot_reputation(),
                    attestations: attest.snapshot_history(),
                    peers: peers.urls(),
                    last_sync: sync.last_sync(),
                    state_hash: consensus.state_hash(),
                };
                state_writer.write(&snapshot);
            }
        }
    });

    // ── HTTP API ──────────────────────────────────────────────────────────────
    let ctx = Arc::new(NodeContext {
        keypair,
        consensus,
        attest,
        nonces: Arc::new(NonceStore::new()),
        peers,
        anchor: Some(Arc::clone(&anchor)),
        require_dpop: args.require_dpop,
        node_version: env!("CARGO_PKG_VERSION").to_string(),
        self_hash: self_hash(),
    });

    let server = tokio::spawn(soulprint_rpc::serve(args.listen, ctx));

    info!("node ready");
    tokio::select! {
        res = server => {
            if let Ok(Err(e)) = res {
                warn!(error = %e, "HTTP server stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    sync_handle.abort();
    writer_handle.abort();
    anchor.shutdown();
    Ok(())
}

/// Seed engines from the state files of a previous run. Reputation is
/// recomputed from the imported attestation history (application is
/// commutative), so only the registry and history need reading.
fn restore_state(
    state_dir: &Path,
    consensus: &NullifierConsensus,
    attest: &AttestationEngine,
) {
    match read_json::<StateFile>(&state_dir.join("state.json")) {
        Ok(Some(file)) => {
            let n = consensus.import_state(&file.nullifiers);
            info!(nullifiers = n, "registry restored");
        }
        Ok(None) => info!("fresh state dir"),
        Err(e) => warn!(error = %e, "state.json unreadable; starting empty"),
    }
    match read_json::<Vec<soulprint_core::types::Attestation>>(&state_dir.join("attestations.json"))
    {
        Ok(Some(history)) => {
            let n = attest.import_state(&history);
            info!(attestations = n, "attestation history restored");
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "attestations.json unreadable; starting empty"),
    }
}

/// Learn peer DIDs from `GET /info` so their messages pass the peer gate.
async fn discover_peers(urls: &[String], peers: &Arc<PeerBook>) {
    let client = reqwest::Client::new();
    for url in urls {
        match fetch_peer_did(&client, url).await {
            Ok(did) => {
                info!(peer = %url, did = %did, "peer discovered");
                peers.upsert(did, url.clone());
            }
            Err(e) => warn!(peer = %url, error = %e, "peer discovery failed"),
        }
    }
}

async fn fetch_peer_did(client: &reqwest::Client, url: &str) -> anyhow::Result<Did> {
    let info: serde_json::Value = client
        .get(format!("{}/info", url.trim_end_matches('/')))
        .timeout(Duration::from_secs(3))
        .send()
        .await?
        .json()
        .await?;
    let did = info
        .get("node_did")
        .and_then(|v| v.as_str())
        .context("missing node_did")?;
    Ok(Did::parse(did)?)
}

/// Keep retrying discovery so peers that boot later still join the set.
fn spawn_peer_refresh(urls: Vec<String>, peers: Arc<PeerBook>) {
    if urls.is_empty() {
        return;
    }
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        tick.tick().await;
        loop {
            tick.tick().await;
            discover_peers(&urls, &peers).await;
        }
    });
}

fn entry_from_anchor(anchor: &NullifierAnchor) -> CommitEntry {
    CommitEntry {
        nullifier: anchor.nullifier,
        did: anchor.did.clone(),
        // Ledger facts predate anything local; the zero timestamp makes them
        // win every tie-break.
        committed_ms: 0,
        commit_did: anchor.did.clone(),
        vote_count: 0,
        votes: Vec::new(),
    }
}

/// Advisory integrity hash of the running binary. Metadata only.
fn self_hash() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    let bytes = std::fs::read(exe).ok()?;
    let mut h = Sha256::new();
    h.update(&bytes);
    Some(hex::encode(h.finalize()))
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
