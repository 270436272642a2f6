pub mod canonical;
pub mod constants;
pub mod error;
pub mod time;
pub mod types;

pub use canonical::{canonical_json, canonical_json_string};
pub use constants::*;
pub use error::SoulprintError;
pub use types::{
    Attestation, CommitEntry, Credential, Did, Level, Nullifier, Reputation, VoteChoice,
    VoteRecord,
};
