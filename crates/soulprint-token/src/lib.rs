pub mod engine;
pub mod score;
pub mod spt;

pub use engine::{decode, issue, peek, renew, IssueOptions, RenewMethod};
pub use score::{effective_threshold, identity_score, level_for, total_score};
pub use spt::{BotRep, TokenPayload};
