pub mod queue;
pub mod service;

pub use queue::DiskQueue;
pub use service::{
    AnchorConfig, AnchorService, AttestationAnchor, LedgerClient, NullifierAnchor,
};
