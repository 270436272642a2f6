use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::Json;
use tracing::{debug, warn};

use soulprint_anchor::{AttestationAnchor, NullifierAnchor};
use soulprint_attest::AttestRequest;
use soulprint_core::constants::{PROTOCOL_HASH_HEX, SYNC_PAGE_LIMIT};
use soulprint_core::error::SoulprintError;
use soulprint_core::time::{now_ms, now_seconds};
use soulprint_core::types::{Credential, Did, Nullifier};
use soulprint_gossip::{open_envelope, Envelope, GossipError, GossipMessage};
use soulprint_sync::{StateHashResponse, StateInfoResponse, StatePage};
use soulprint_token::total_score;

use crate::auth::authenticate;
use crate::error::ApiError;
use crate::server::NodeContext;
use crate::types::*;

// ── GET /info ────────────────────────────────────────────────────────────────

pub async fn info(State(ctx): State<Arc<NodeContext>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        node_did: ctx.keypair.did.to_string(),
        version: ctx.node_version.clone(),
        protocol: PROTOCOL_HASH_HEX.clone(),
        total_verified: ctx.consensus.len(),
        capabilities: vec![
            "verify".into(),
            "attest".into(),
            "sync".into(),
            "anchor".into(),
        ],
        self_hash: ctx.self_hash.clone(),
    })
}

// ── POST /verify ─────────────────────────────────────────────────────────────

pub async fn verify(
    State(ctx): State<Arc<NodeContext>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let token =
        soulprint_token::decode(&req.spt).ok_or(SoulprintError::MalformedToken)?;

    if ctx.require_dpop {
        let proof = headers
            .get("x-soulprint-proof")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::DpopRequired)?;
        soulprint_dpop::verify(
            proof,
            &req.spt,
            method.as_str(),
            uri.path(),
            &ctx.nonces,
            token.did.as_str(),
        )?;
    }

    let already = ctx.consensus.get(&token.nullifier);
    let zkp = req.zkp.or_else(|| token.zkp.clone()).unwrap_or_default();

    let entry = ctx
        .consensus
        .propose(token.nullifier, token.did.clone(), &zkp)
        .await?;
    if entry.did != token.did {
        return Err(SoulprintError::NullifierAlreadyUsed(entry.did.to_string()).into());
    }

    // Fresh commits get backed up; replays of an existing binding do not.
    if already.is_none() {
        if let Some(anchor) = &ctx.anchor {
            anchor.anchor_nullifier(NullifierAnchor {
                nullifier: token.nullifier,
                did: token.did.clone(),
                document_verified: token.credentials.contains(&Credential::DocumentVerified),
                face_verified: token.credentials.contains(&Credential::FaceMatch),
                zk_proof: zkp,
            });
        }
    }

    let verified_at = now_seconds();
    let co_signature = ctx.keypair.sign_canonical(&serde_json::json!({
        "nullifier": token.nullifier,
        "did": token.did,
        "verified_at": verified_at,
    }))?;

    Ok(Json(VerifyResponse {
        valid: true,
        anti_sybil: if already.is_some() { "existing" } else { "new" }.into(),
        nullifier: token.nullifier.to_hex(),
        node_did: ctx.keypair.did.to_string(),
        co_signature,
        verified_at,
    }))
}

// ── GET /nullifier/{n} ───────────────────────────────────────────────────────

pub async fn nullifier_status(
    State(ctx): State<Arc<NodeContext>>,
    Path(n): Path<String>,
) -> Result<Json<NullifierStatusResponse>, ApiError> {
    let nullifier = Nullifier::from_hex(&n)?;
    let entry = ctx.consensus.get(&nullifier);
    Ok(Json(NullifierStatusResponse {
        registered: entry.is_some(),
        verified_at: entry.map(|e| e.committed_ms / 1_000),
    }))
}

// ── POST /token/renew ────────────────────────────────────────────────────────

pub async fn token_renew(
    State(ctx): State<Arc<NodeContext>>,
    Json(req): Json<RenewRequest>,
) -> Result<Json<RenewResponse>, ApiError> {
    let old = soulprint_token::peek(&req.spt).ok_or(SoulprintError::MalformedToken)?;
    let rep = ctx.attest.get_reputation(&old.did);

    let (spt, method) = soulprint_token::renew(&req.spt, &ctx.keypair, &rep)?;
    let renewed = soulprint_token::peek(&spt).ok_or(SoulprintError::MalformedToken)?;

    Ok(Json(RenewResponse {
        spt,
        expires_in: renewed.expires - now_seconds(),
        renewed: true,
        method,
    }))
}

// ── POST /challenge ──────────────────────────────────────────────────────────

pub async fn challenge(
    State(ctx): State<Arc<NodeContext>>,
    Json(req): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let mut valid = 0usize;
    let mut invalid = 0usize;
    for spt in &req.spts {
        if soulprint_token::decode(spt).is_some() {
            valid += 1;
        } else {
            invalid += 1;
        }
    }

    let challenge_id = req
        .challenge_id
        .unwrap_or_else(|| format!("ch-{}", now_ms()));
    let verified_at = now_seconds();
    let signature = ctx.keypair.sign_canonical(&serde_json::json!({
        "challenge_id": challenge_id,
        "result_valid": valid,
        "result_invalid": invalid,
        "verified_at": verified_at,
    }))?;

    Ok(Json(ChallengeResponse {
        challenge_id,
        result_valid: valid,
        result_invalid: invalid,
        verified_at,
        node_did: ctx.keypair.did.to_string(),
        signature,
    }))
}

// ── POST /attest ─────────────────────────────────────────────────────────────

pub async fn attest(
    State(ctx): State<Arc<NodeContext>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(req): Json<AttestHttpRequest>,
) -> Result<Json<AttestHttpResponse>, ApiError> {
    let (token, _spt) = authenticate(&ctx, &headers, &method, &uri)?;

    let target = Did::parse(&req.target)?;
    let issuer_rep = ctx.attest.get_reputation(&token.did);
    let issuer_score = total_score(&token.credentials, &issuer_rep);

    let entry = ctx.attest.attest(
        &AttestRequest {
            issuer: token.did,
            target: target.clone(),
            value: req.value,
            context: req.context,
            issuer_score,
        },
        now_ms(),
    )?;

    if let Some(anchor) = &ctx.anchor {
        anchor.anchor_attestation(AttestationAnchor {
            issuer: entry.issuer.clone(),
            target: entry.target.clone(),
            value: entry.value,
            context: entry.context.clone(),
            signature: entry.signature.clone(),
        });
    }

    Ok(Json(AttestHttpResponse {
        accepted: true,
        value: entry.value,
        msg_hash: entry.msg_hash,
        target_reputation: ctx.attest.get_reputation(&target),
    }))
}

// ── GET /reputation/{did} ────────────────────────────────────────────────────

pub async fn reputation(
    State(ctx): State<Arc<NodeContext>>,
    Path(did): Path<String>,
) -> Result<Json<ReputationResponse>, ApiError> {
    let did = Did::parse(&did)?;
    Ok(Json(ReputationResponse {
        did: did.to_string(),
        reputation: ctx.attest.get_reputation(&did),
    }))
}

// ── GET /state/hash ──────────────────────────────────────────────────────────

pub async fn state_hash(State(ctx): State<Arc<NodeContext>>) -> Json<StateHashResponse> {
    Json(StateHashResponse {
        hash: ctx.consensus.state_hash(),
    })
}

// ── GET /state/info ──────────────────────────────────────────────────────────

pub async fn state_info(State(ctx): State<Arc<NodeContext>>) -> Json<StateInfoResponse> {
    Json(StateInfoResponse {
        nullifier_count: ctx.consensus.len(),
        attestation_count: ctx.attest.attestation_count(),
        latest_ts: ctx.attest.latest_ts(),
        protocol_hash: PROTOCOL_HASH_HEX.clone(),
        node_version: ctx.node_version.clone(),
    })
}

// ── GET /state?page&limit&since ──────────────────────────────────────────────

pub async fn state_page(
    State(ctx): State<Arc<NodeContext>>,
    Query(q): Query<StateQuery>,
) -> Json<StatePage> {
    let limit = q.limit.unwrap_or(SYNC_PAGE_LIMIT).clamp(1, SYNC_PAGE_LIMIT);
    let since = q.since.unwrap_or(0);

    let mut nullifiers = ctx.consensus.snapshot();
    nullifiers.sort_by_key(|e| e.nullifier.to_hex());
    let total_pages = nullifiers.len().div_ceil(limit).max(1);
    let page_entries: Vec<_> = nullifiers
        .into_iter()
        .skip(q.page * limit)
        .take(limit)
        .collect();

    // Attestation history rides on the first page; pagination applies to the
    // nullifier set, which dominates in size.
    let (attestations, reps) = if q.page == 0 {
        let mut by_target: std::collections::BTreeMap<String, Vec<_>> = Default::default();
        for att in ctx.attest.history_since(since) {
            by_target.entry(att.target.to_string()).or_default().push(att);
        }
        (by_target, ctx.attest.snapshot_reputation())
    } else {
        Default::default()
    };

    Json(StatePage {
        nullifiers: page_entries,
        attestations,
        reps,
        page: q.page,
        total_pages,
        protocol_hash: PROTOCOL_HASH_HEX.clone(),
    })
}

// ── POST /state/merge ────────────────────────────────────────────────────────

pub async fn state_merge(
    State(ctx): State<Arc<NodeContext>>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<MergeResponse>, ApiError> {
    // Sealed gossip envelopes carry a `ct` field; plain state pages do not.
    if body.get("ct").is_some() {
        let envelope: Envelope = serde_json::from_value(body)
            .map_err(|e| ApiError::BadRequest(format!("bad envelope: {e}")))?;
        let msg = open_envelope(&envelope).map_err(|e| match e {
            GossipError::EpochOutOfWindow { .. } | GossipError::UnsupportedVersion(_) => {
                ApiError::BadRequest(e.to_string())
            }
            _ => ApiError::BadRequest("envelope failed authentication".into()),
        })?;
        dispatch_gossip(&ctx, msg).await;
        return Ok(Json(MergeResponse {
            ok: true,
            imported_nullifiers: None,
            imported_attestations: None,
        }));
    }

    let page: StatePage = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("bad state page: {e}")))?;
    if page.protocol_hash != *PROTOCOL_HASH_HEX {
        return Err(SoulprintError::ProtocolHashMismatch {
            theirs: page.protocol_hash,
        }
        .into());
    }
    let imported_nullifiers = ctx.consensus.import_state(&page.nullifiers);
    let imported_attestations: usize = page
        .attestations
        .values()
        .map(|entries| ctx.attest.import_state(entries))
        .sum();

    Ok(Json(MergeResponse {
        ok: true,
        imported_nullifiers: Some(imported_nullifiers),
        imported_attestations: Some(imported_attestations),
    }))
}

async fn dispatch_gossip(ctx: &NodeContext, msg: GossipMessage) {
    match msg {
        GossipMessage::Propose(m) => {
            ctx.consensus.handle_propose(&m).await;
        }
        GossipMessage::Vote(m) => ctx.consensus.handle_vote(&m),
        GossipMessage::Commit(m) => ctx.consensus.handle_commit(&m),
        GossipMessage::Attest(m) => {
            // The attestation engine's handle path is non-blocking and does
            // not reverify; sender checks happen here at the boundary.
            if !ctx.peers.contains(&m.sender_did) && m.sender_did != ctx.keypair.did {
                warn!(sender = %m.sender_did, "attestation from unknown peer dropped");
                return;
            }
            if !m.verify_sig() {
                warn!(sender = %m.sender_did, "attestation message signature invalid");
                return;
            }
            debug!(issuer = %m.attestation.issuer, "attestation received via gossip");
            ctx.attest.handle(&m, now_ms());
        }
    }
}
