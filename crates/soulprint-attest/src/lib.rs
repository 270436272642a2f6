pub mod engine;

pub use engine::{AttestEvent, AttestRequest, AttestationEngine};
