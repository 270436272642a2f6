//! Router assembly and server startup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use soulprint_anchor::AnchorService;
use soulprint_attest::AttestationEngine;
use soulprint_consensus::NullifierConsensus;
use soulprint_crypto::NodeKeypair;
use soulprint_dpop::NonceStore;
use soulprint_gossip::PeerBook;

use crate::handlers;

/// Shared state behind every handler.
pub struct NodeContext {
    pub keypair: Arc<NodeKeypair>,
    pub consensus: Arc<NullifierConsensus>,
    pub attest: Arc<AttestationEngine>,
    pub nonces: Arc<NonceStore>,
    pub peers: Arc<PeerBook>,
    pub anchor: Option<Arc<AnchorService>>,
    /// Reject authenticated requests that lack a proof-of-possession header.
    pub require_dpop: bool,
    pub node_version: String,
    /// Advisory hash of the running binary (metadata only).
    pub self_hash: Option<String>,
}

pub fn build_router(ctx: Arc<NodeContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/info", get(handlers::info))
        .route("/verify", post(handlers::verify))
        .route("/nullifier/{n}", get(handlers::nullifier_status))
        .route("/token/renew", post(handlers::token_renew))
        .route("/challenge", post(handlers::challenge))
        .route("/attest", post(handlers::attest))
        .route("/reputation/{did}", get(handlers::reputation))
        .route("/state/hash", get(handlers::state_hash))
        .route("/state/info", get(handlers::state_info))
        .route("/state", get(handlers::state_page))
        .route("/state/merge", post(handlers::state_merge))
        .layer(cors)
        .with_state(ctx)
}

/// Bind and serve until the task is aborted.
pub async fn serve(addr: SocketAddr, ctx: Arc<NodeContext>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");
    axum::serve(listener, build_router(ctx)).await?;
    Ok(())
}
