pub mod aead;
pub mod did;
pub mod ed25519;
pub mod hash;
pub mod keypair;
pub mod zk;

pub use aead::{aead_open, aead_seal};
pub use did::{did_from_pubkey, pubkey_from_did};
pub use ed25519::{sign, sign_canonical, verify, verify_canonical};
pub use hash::{hmac_sha256, poseidon_like, sha256};
pub use keypair::NodeKeypair;
pub use zk::{PermissiveVerifier, ProofVerifier, RejectAllVerifier};
