pub mod nonce;
pub mod proof;
pub mod verify;

pub use nonce::NonceStore;
pub use proof::{build_proof, DpopPayload, DpopProof};
pub use verify::verify;
