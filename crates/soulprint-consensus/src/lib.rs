pub mod engine;
pub mod round;

pub use engine::{ConsensusConfig, ConsensusEvent, NullifierConsensus};
pub use round::{quorum_for, RoundStatus};
