//! HTTP boundary behavior, driven through the router in-process.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::util::ServiceExt;

use soulprint_attest::AttestationEngine;
use soulprint_consensus::{ConsensusConfig, NullifierConsensus};
use soulprint_core::constants::PROTOCOL_HASH_HEX;
use soulprint_core::types::{Credential, Did, Nullifier, Reputation};
use soulprint_crypto::{NodeKeypair, PermissiveVerifier};
use soulprint_dpop::{build_proof, NonceStore};
use soulprint_gossip::{NullBroadcaster, PeerBook};
use soulprint_rpc::{build_router, NodeContext};
use soulprint_token::{issue, IssueOptions};

fn test_node(require_dpop: bool) -> (Router, Arc<NodeContext>) {
    let keypair = Arc::new(NodeKeypair::generate());
    let peers = Arc::new(PeerBook::new());
    let consensus = Arc::new(NullifierConsensus::new(
        Arc::clone(&keypair),
        ConsensusConfig::default(),
        Arc::clone(&peers),
        Arc::new(PermissiveVerifier),
        Arc::new(NullBroadcaster),
    ));
    let attest = Arc::new(AttestationEngine::new(
        Arc::clone(&keypair),
        Arc::new(NullBroadcaster),
    ));
    let ctx = Arc::new(NodeContext {
        keypair,
        consensus,
        attest,
        nonces: Arc::new(NonceStore::new()),
        peers,
        anchor: None,
        require_dpop,
        node_version: "test".into(),
        self_hash: None,
    });
    (build_router(Arc::clone(&ctx)), ctx)
}

fn all_credentials() -> Vec<Credential> {
    vec![
        Credential::EmailVerified,
        Credential::PhoneVerified,
        Credential::GitHubLinked,
        Credential::DocumentVerified,
        Credential::FaceMatch,
        Credential::BiometricBound,
    ]
}

fn agent_token(nullifier: [u8; 32]) -> (NodeKeypair, String) {
    let kp = NodeKeypair::generate();
    let spt = issue(
        &kp,
        Nullifier::from_bytes(nullifier),
        &all_credentials(),
        &Reputation::default(),
        &IssueOptions {
            zkp: Some("zkp".into()),
            ..Default::default()
        },
    )
    .unwrap();
    (kp, spt)
}

async fn post_json(router: &Router, path: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(router, req).await
}

async fn get(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder().uri(path).body(Body::empty()).unwrap();
    send(router, req).await
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn info_reports_identity_and_protocol() {
    let (router, ctx) = test_node(false);
    let (status, body) = get(&router, "/info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["node_did"], ctx.keypair.did.to_string());
    assert_eq!(body["protocol"], *PROTOCOL_HASH_HEX);
    assert_eq!(body["total_verified"], 0);
}

#[tokio::test]
async fn verify_registers_then_reports_existing() {
    let (router, ctx) = test_node(true);
    let (agent, spt) = agent_token([0xA1; 32]);

    let proof = build_proof(&agent, "POST", "/verify", &spt).unwrap();
    let req = Request::builder()
        .method("POST")
        .uri("/verify")
        .header("content-type", "application/json")
        .header("x-soulprint-proof", proof)
        .body(Body::from(
            serde_json::json!({"spt": spt, "zkp": "zkp"}).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["anti_sybil"], "new");
    assert_eq!(body["node_did"], ctx.keypair.did.to_string());
    assert!(ctx
        .consensus
        .is_registered(&Nullifier::from_bytes([0xA1; 32])));

    // Second verification of the same binding (fresh proof, nonce is
    // single-use) reports the registration as existing.
    let proof2 = build_proof(&agent, "POST", "/verify", &spt).unwrap();
    let req = Request::builder()
        .method("POST")
        .uri("/verify")
        .header("content-type", "application/json")
        .header("x-soulprint-proof", proof2)
        .body(Body::from(serde_json::json!({"spt": spt}).to_string()))
        .unwrap();
    let (status, body) = send(&router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["anti_sybil"], "existing");
}

#[tokio::test]
async fn verify_without_proof_is_401_dpop_required() {
    let (router, _) = test_node(true);
    let (_, spt) = agent_token([0xA2; 32]);

    let (status, body) = post_json(&router, "/verify", serde_json::json!({"spt": spt})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "dpop_required");
}

#[tokio::test]
async fn verify_conflicting_did_is_409() {
    let (router, _ctx) = test_node(false);

    // First agent claims the nullifier.
    let (_, spt_a) = agent_token([0xA3; 32]);
    let (status, _) = post_json(&router, "/verify", serde_json::json!({"spt": spt_a})).await;
    assert_eq!(status, StatusCode::OK);

    // A different DID presenting the same nullifier is rejected.
    let (_, spt_b) = agent_token([0xA3; 32]);
    let (status, body) = post_json(&router, "/verify", serde_json::json!({"spt": spt_b})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already bound"));
}

#[tokio::test]
async fn verify_rejects_garbage_token() {
    let (router, _) = test_node(false);
    let (status, _) = post_json(&router, "/verify", serde_json::json!({"spt": "garbage"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn nullifier_status_round_trip() {
    let (router, _) = test_node(false);
    let n_hex = Nullifier::from_bytes([0xA4; 32]).to_hex();

    let (status, body) = get(&router, &format!("/nullifier/{n_hex}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registered"], false);

    let (_, spt) = agent_token([0xA4; 32]);
    post_json(&router, "/verify", serde_json::json!({"spt": spt})).await;

    let (_, body) = get(&router, &format!("/nullifier/{n_hex}")).await;
    assert_eq!(body["registered"], true);
    assert!(body["verified_at"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn renew_custodied_token_in_window() {
    let (router, ctx) = test_node(false);
    // Token custodied by this node (subject key = node key), 30 min left.
    let spt = issue(
        &ctx.keypair,
        Nullifier::from_bytes([0xA5; 32]),
        &all_credentials(),
        &Reputation::default(),
        &IssueOptions {
            lifetime_seconds: Some(1_800),
            ..Default::default()
        },
    )
    .unwrap();

    let (status, body) = post_json(&router, "/token/renew", serde_json::json!({"spt": spt})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["renewed"], true);
    assert_eq!(body["method"], "preemptive");
    assert!(body["expires_in"].as_i64().unwrap() > 1_000);
}

#[tokio::test]
async fn renew_outside_window_is_403() {
    let (router, ctx) = test_node(false);
    let spt = issue(
        &ctx.keypair,
        Nullifier::from_bytes([0xA6; 32]),
        &[],
        &Reputation::default(),
        &IssueOptions::default(), // 180 days out, far from the window
    )
    .unwrap();

    let (status, _) = post_json(&router, "/token/renew", serde_json::json!({"spt": spt})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn challenge_counts_and_signs() {
    let (router, ctx) = test_node(false);
    let (_, good) = agent_token([0xA7; 32]);

    let (status, body) = post_json(
        &router,
        "/challenge",
        serde_json::json!({"challenge_id": "ch-1", "spts": [good, "junk"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["challenge_id"], "ch-1");
    assert_eq!(body["result_valid"], 1);
    assert_eq!(body["result_invalid"], 1);
    assert_eq!(body["node_did"], ctx.keypair.did.to_string());
    assert!(!body["signature"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn attest_applies_and_reports_new_reputation() {
    let (router, _) = test_node(false);
    let (_, spt) = agent_token([0xA8; 32]);
    let target = Did::from_pubkey(&[0xB0; 32]);

    let req = Request::builder()
        .method("POST")
        .uri("/attest")
        .header("content-type", "application/json")
        .header("x-soulprint", spt)
        .body(Body::from(
            serde_json::json!({"target": target.to_string(), "value": 1, "context": "review"})
                .to_string(),
        ))
        .unwrap();
    let (status, body) = send(&router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);
    assert_eq!(body["value"], 1);
    assert_eq!(body["target_reputation"]["score"], 11);
}

#[tokio::test]
async fn attest_without_token_is_401() {
    let (router, _) = test_node(false);
    let (status, _) = post_json(
        &router,
        "/attest",
        serde_json::json!({"target": Did::from_pubkey(&[0xB1; 32]).to_string(), "value": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn state_surface_pages_and_merges() {
    let (router_a, ctx_a) = test_node(false);
    let (router_b, ctx_b) = test_node(false);

    // Register two identities on node A.
    for seed in [[0xC1u8; 32], [0xC2; 32]] {
        let (_, spt) = agent_token(seed);
        let (status, _) = post_json(&router_a, "/verify", serde_json::json!({"spt": spt})).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, hash_a) = get(&router_a, "/state/hash").await;
    let (_, hash_b) = get(&router_b, "/state/hash").await;
    assert_ne!(hash_a["hash"], hash_b["hash"]);

    let (_, info) = get(&router_a, "/state/info").await;
    assert_eq!(info["nullifier_count"], 2);
    assert_eq!(info["protocol_hash"], *PROTOCOL_HASH_HEX);

    // Pull node A's page and merge it into node B.
    let (status, page) = get(&router_a, "/state?page=0&limit=500&since=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_pages"], 1);

    let (status, merged) = post_json(&router_b, "/state/merge", page).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(merged["imported_nullifiers"], 2);

    assert_eq!(ctx_b.consensus.state_hash(), ctx_a.consensus.state_hash());

    // Re-merging is idempotent.
    let (_, page) = get(&router_a, "/state?page=0&limit=500&since=0").await;
    let (_, merged) = post_json(&router_b, "/state/merge", page).await;
    assert_eq!(merged["imported_nullifiers"], 0);
}

#[tokio::test]
async fn merge_rejects_foreign_protocol_page() {
    let (router, ctx) = test_node(false);
    let page = serde_json::json!({
        "nullifiers": [],
        "attestations": {},
        "reps": {},
        "page": 0,
        "total_pages": 1,
        "protocol_hash": "00".repeat(32),
    });
    let (status, _) = post_json(&router, "/state/merge", page).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(ctx.consensus.len(), 0);
}

#[tokio::test]
async fn merge_accepts_sealed_attestation_envelope() {
    let (router, ctx) = test_node(false);

    // A registered peer gossips an attestation.
    let peer_kp = NodeKeypair::generate();
    ctx.peers.upsert(peer_kp.did.clone(), "http://peer".into());

    let issuer = Did::from_pubkey(&[0xD0; 32]);
    let target = Did::from_pubkey(&[0xD1; 32]);
    let ts = soulprint_core::time::now_seconds();
    let att = soulprint_core::types::Attestation {
        issuer: issuer.clone(),
        target: target.clone(),
        value: 1,
        context: "gossip".into(),
        ts,
        signature: "00".into(),
        msg_hash: soulprint_core::types::Attestation::compute_msg_hash(
            &issuer, &target, 1, "gossip", ts,
        ),
    };
    let mut msg = soulprint_gossip::AttestMsg {
        protocol_hash: PROTOCOL_HASH_HEX.clone(),
        attestation: att,
        sender_did: peer_kp.did.clone(),
        ts,
        signature: String::new(),
    };
    msg.sign(&peer_kp).unwrap();
    let envelope =
        soulprint_gossip::seal_message(&soulprint_gossip::GossipMessage::Attest(msg)).unwrap();

    let (status, body) = post_json(
        &router,
        "/state/merge",
        serde_json::to_value(&envelope).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(ctx.attest.get_reputation(&target).score, 11);
}
