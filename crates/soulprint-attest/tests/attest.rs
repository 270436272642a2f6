//! Attestation policy, cooldown boundaries, anti-farming, and import laws.

use std::sync::Arc;

use soulprint_attest::{AttestRequest, AttestationEngine};
use soulprint_core::constants::{
    ATTESTATION_COOLDOWN_MS, DEFAULT_REPUTATION, PROTOCOL_HASH_HEX, REPUTATION_MAX,
};
use soulprint_core::error::SoulprintError;
use soulprint_core::types::{Attestation, Did, Reputation};
use soulprint_crypto::NodeKeypair;
use soulprint_gossip::{AttestMsg, NullBroadcaster};

const T0: i64 = 1_750_000_000_000; // an arbitrary fixed epoch, ms

fn engine() -> (AttestationEngine, Did, Did) {
    let kp = Arc::new(NodeKeypair::generate());
    let engine = AttestationEngine::new(kp, Arc::new(NullBroadcaster));
    let issuer = Did::from_pubkey(&[1; 32]);
    let target = Did::from_pubkey(&[2; 32]);
    (engine, issuer, target)
}

fn request(issuer: &Did, target: &Did, value: i8, score: u8) -> AttestRequest {
    AttestRequest {
        issuer: issuer.clone(),
        target: target.clone(),
        value,
        context: "agent-review".into(),
        issuer_score: score,
    }
}

#[test]
fn policy_checks_run_in_order() {
    let (engine, issuer, target) = engine();

    // issuer == target outranks everything else.
    let err = engine.attest(&request(&issuer, &issuer, 1, 80), T0).unwrap_err();
    assert!(matches!(err, SoulprintError::SameIssuerTarget));

    // Low-score issuer (scenario: identity score 40).
    let err = engine.attest(&request(&issuer, &target, 1, 40), T0).unwrap_err();
    assert!(matches!(
        err,
        SoulprintError::IssuerNotAuthorized { score: 40, min: 65 }
    ));

    // Out-of-range value.
    let err = engine.attest(&request(&issuer, &target, 2, 80), T0).unwrap_err();
    assert!(matches!(err, SoulprintError::InvalidValue(2)));
}

#[test]
fn cooldown_boundary_is_exactly_24h() {
    let (engine, issuer, target) = engine();

    engine.attest(&request(&issuer, &target, 1, 80), T0).unwrap();

    // 24h − 1ms: still cooling down.
    let err = engine
        .attest(&request(&issuer, &target, 1, 80), T0 + ATTESTATION_COOLDOWN_MS - 1)
        .unwrap_err();
    assert!(matches!(err, SoulprintError::CooldownActive { remaining_ms: 1 }));

    // Exactly 24h: accepted.
    engine
        .attest(&request(&issuer, &target, 1, 80), T0 + ATTESTATION_COOLDOWN_MS)
        .unwrap();
}

#[test]
fn scenario_cooldown_then_accept_raises_reputation_to_12() {
    let (engine, issuer, target) = engine();
    let hour = 3_600_000;

    engine.attest(&request(&issuer, &target, 1, 80), T0).unwrap();

    let err = engine
        .attest(&request(&issuer, &target, 1, 80), T0 + 23 * hour)
        .unwrap_err();
    assert!(matches!(err, SoulprintError::CooldownActive { .. }));

    engine
        .attest(&request(&issuer, &target, 1, 80), T0 + 25 * hour)
        .unwrap();

    let rep = engine.get_reputation(&target);
    assert_eq!(rep.score, DEFAULT_REPUTATION + 2);
    assert_eq!(rep.positive_count, 2);
}

#[test]
fn unknown_did_reads_neutral_default() {
    let (engine, _, _) = engine();
    let rep = engine.get_reputation(&Did::from_pubkey(&[9; 32]));
    assert_eq!(
        rep,
        Reputation {
            score: DEFAULT_REPUTATION,
            positive_count: 0,
            negative_count: 0,
            last_updated: 0,
        }
    );
}

#[test]
fn farming_demotes_after_seven_in_window() {
    let (engine, issuer, target) = engine();

    // A dense pair history synced in from a peer: seven attestations one
    // hour apart (imports merge by union; the cooldown gates only fresh
    // submissions).
    let t0_secs = T0 / 1_000;
    let remote: Vec<Attestation> = (0..7)
        .map(|i| {
            let ts = t0_secs + i * 3_600;
            Attestation {
                issuer: issuer.clone(),
                target: target.clone(),
                value: 1,
                context: "burst".into(),
                ts,
                signature: "00".into(),
                msg_hash: Attestation::compute_msg_hash(&issuer, &target, 1, "burst", ts),
            }
        })
        .collect();
    assert_eq!(engine.import_state(&remote), 7);
    assert_eq!(engine.get_reputation(&target).score, 17);

    // The issuer's next submission clears the cooldown but sits with all
    // seven inside the trailing 7 days: demoted to −1 (accepted, not
    // failed).
    let now = (t0_secs + 6 * 3_600) * 1_000 + ATTESTATION_COOLDOWN_MS;
    let entry = engine.attest(&request(&issuer, &target, 1, 80), now).unwrap();
    assert_eq!(entry.value, -1);

    let rep = engine.get_reputation(&target);
    assert_eq!(rep.score, 16);
    assert_eq!(rep.negative_count, 1);
}

#[test]
fn reputation_clamps_to_bounds_under_many_attestations() {
    let (engine, _, target) = engine();

    // Many distinct issuers pile on; score must stay within [0, 20].
    for i in 0..40u8 {
        let issuer = Did::from_pubkey(&[100 + i; 32]);
        engine
            .attest(&request(&issuer, &target, 1, 80), T0 + i64::from(i))
            .unwrap();
    }
    assert_eq!(engine.get_reputation(&target).score, REPUTATION_MAX);

    for i in 0..60u8 {
        let issuer = Did::from_pubkey(&[200u8.wrapping_add(i); 32]);
        engine
            .attest(&request(&issuer, &target, -1, 80), T0 + 1_000 + i64::from(i))
            .unwrap();
    }
    assert_eq!(engine.get_reputation(&target).score, 0);
}

#[test]
fn import_unions_by_hash_and_is_idempotent() {
    let (engine, issuer, target) = engine();

    let remote: Vec<Attestation> = (0..3)
        .map(|i| {
            let ts = 1_750_000_000 + i;
            Attestation {
                issuer: issuer.clone(),
                target: target.clone(),
                value: 1,
                context: "remote".into(),
                ts,
                signature: "00".into(),
                msg_hash: Attestation::compute_msg_hash(&issuer, &target, 1, "remote", ts),
            }
        })
        .collect();

    assert_eq!(engine.import_state(&remote), 3);
    assert_eq!(engine.import_state(&remote), 0);
    assert_eq!(engine.attestation_count(), 3);
    assert_eq!(engine.get_reputation(&target).score, DEFAULT_REPUTATION + 3);
}

#[test]
fn import_order_does_not_change_converged_reputation() {
    let (engine_a, issuer, target) = engine();
    let (engine_b, _, _) = engine();

    let mk = |value: i8, ts: i64| Attestation {
        issuer: issuer.clone(),
        target: target.clone(),
        value,
        context: "c".into(),
        ts,
        signature: "00".into(),
        msg_hash: Attestation::compute_msg_hash(&issuer, &target, value, "c", ts),
    };
    let batch1 = vec![mk(1, 100), mk(1, 200_000)];
    let batch2 = vec![mk(-1, 400_000), mk(1, 600_000)];

    engine_a.import_state(&batch1);
    engine_a.import_state(&batch2);
    engine_b.import_state(&batch2);
    engine_b.import_state(&batch1);

    assert_eq!(
        engine_a.get_reputation(&target).score,
        engine_b.get_reputation(&target).score
    );
    assert_eq!(engine_a.attestation_count(), engine_b.attestation_count());
}

#[test]
fn wire_handle_gates_protocol_hash_and_duplicates() {
    let (engine, issuer, target) = engine();
    let ts = 1_750_000_000;
    let att = Attestation {
        issuer: issuer.clone(),
        target: target.clone(),
        value: 1,
        context: "wire".into(),
        ts,
        signature: "00".into(),
        msg_hash: Attestation::compute_msg_hash(&issuer, &target, 1, "wire", ts),
    };
    let sender = Did::from_pubkey(&[50; 32]);

    // Foreign protocol hash: silently dropped, zero state change.
    let foreign = AttestMsg {
        protocol_hash: "ff".repeat(32),
        attestation: att.clone(),
        sender_did: sender.clone(),
        ts,
        signature: String::new(),
    };
    engine.handle(&foreign, ts * 1_000);
    assert_eq!(engine.attestation_count(), 0);

    let good = AttestMsg {
        protocol_hash: PROTOCOL_HASH_HEX.clone(),
        attestation: att.clone(),
        sender_did: sender.clone(),
        ts,
        signature: String::new(),
    };
    engine.handle(&good, ts * 1_000);
    assert_eq!(engine.attestation_count(), 1);

    // Duplicate delivery is a no-op.
    engine.handle(&good, ts * 1_000 + 5);
    assert_eq!(engine.attestation_count(), 1);

    // A second attestation for the pair timestamped inside the cooldown is
    // dropped with a warning.
    let ts2 = ts + 3_600;
    let inside = AttestMsg {
        protocol_hash: PROTOCOL_HASH_HEX.clone(),
        attestation: Attestation {
            ts: ts2,
            msg_hash: Attestation::compute_msg_hash(&issuer, &target, 1, "wire", ts2),
            ..att
        },
        sender_did: sender,
        ts: ts2,
        signature: String::new(),
    };
    engine.handle(&inside, ts2 * 1_000);
    assert_eq!(engine.attestation_count(), 1);
}

#[test]
fn wire_handle_drops_stale_events() {
    let (engine, issuer, target) = engine();
    let now = 1_750_000_000_000i64;
    let stale_ts = now / 1_000 - 7_200; // two hours old, max age is one
    let msg = AttestMsg {
        protocol_hash: PROTOCOL_HASH_HEX.clone(),
        attestation: Attestation {
            issuer: issuer.clone(),
            target: target.clone(),
            value: 1,
            context: "old".into(),
            ts: stale_ts,
            signature: "00".into(),
            msg_hash: Attestation::compute_msg_hash(&issuer, &target, 1, "old", stale_ts),
        },
        sender_did: Did::from_pubkey(&[60; 32]),
        ts: stale_ts,
        signature: String::new(),
    };
    engine.handle(&msg, now);
    assert_eq!(engine.attestation_count(), 0);

    // The same event still arrives through anti-entropy import.
    assert_eq!(engine.import_state(&[msg.attestation]), 1);
}
