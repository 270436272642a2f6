//! Score and level computation. Applied uniformly wherever a total score is
//! reported.

use std::collections::HashSet;

use soulprint_core::constants::{IDENTITY_MAX, SCORE_FLOOR, VERIFIED_SCORE_FLOOR};
use soulprint_core::types::{Credential, Level, Reputation};

/// Sum of credential weights, duplicates ignored, capped at
/// [`IDENTITY_MAX`].
pub fn identity_score(credentials: &[Credential]) -> u8 {
    let unique: HashSet<_> = credentials.iter().copied().collect();
    let sum: u32 = unique.iter().map(|c| u32::from(c.weight())).sum();
    sum.min(u32::from(IDENTITY_MAX)) as u8
}

/// Total score: `clamp(identity + reputation, 0, 100)`, floored at
/// [`VERIFIED_SCORE_FLOOR`] for document-verified identities.
pub fn total_score(credentials: &[Credential], reputation: &Reputation) -> u8 {
    let identity = identity_score(credentials);
    let base = (u32::from(identity) + u32::from(reputation.score)).min(100) as u8;
    if credentials.contains(&Credential::DocumentVerified) {
        base.max(VERIFIED_SCORE_FLOOR)
    } else {
        base
    }
}

/// Promote gate thresholds below [`SCORE_FLOOR`] up to it. No service may
/// gate on less.
pub fn effective_threshold(threshold: u8) -> u8 {
    threshold.max(SCORE_FLOOR)
}

/// Level derivation from credential tags.
pub fn level_for(credentials: &[Credential]) -> Level {
    let has = |c: Credential| credentials.contains(&c);
    match (has(Credential::DocumentVerified), has(Credential::FaceMatch)) {
        (true, true) => Level::KYCFull,
        (true, false) | (false, true) => Level::KYCLite,
        (false, false) => {
            if has(Credential::PhoneVerified) {
                Level::PhoneVerified
            } else if has(Credential::EmailVerified) {
                Level::EmailVerified
            } else {
                Level::Unverified
            }
        }
    }
}
