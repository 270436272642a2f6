//! Seam for the external zero-knowledge circuit.
//!
//! The Groth16 circuit (and the biometric pipeline feeding it) lives outside
//! this codebase; the consensus engine only ever asks "does this proof check
//! out for these public signals?".

/// Opaque proof verification. Implementations must be cheap to clone behind
/// an `Arc` and safe to call from a blocking worker thread.
pub trait ProofVerifier: Send + Sync {
    fn verify_proof(&self, proof: &str, public_signals: &[String]) -> bool;
}

/// Accepts every well-formed, non-empty proof. Used when the node runs
/// without a circuit attached; registrations are then gated by peer quorum
/// alone.
pub struct PermissiveVerifier;

impl ProofVerifier for PermissiveVerifier {
    fn verify_proof(&self, proof: &str, _public_signals: &[String]) -> bool {
        if proof.is_empty() {
            tracing::warn!("empty ZK proof rejected");
            return false;
        }
        true
    }
}

/// Rejects everything. Test double for the failure path.
pub struct RejectAllVerifier;

impl ProofVerifier for RejectAllVerifier {
    fn verify_proof(&self, _proof: &str, _public_signals: &[String]) -> bool {
        false
    }
}
