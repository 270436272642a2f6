pub mod broadcast;
pub mod cipher;
pub mod message;
pub mod peers;

pub use broadcast::{Broadcast, HttpBroadcaster, NullBroadcaster};
pub use cipher::{current_epoch, open_envelope, seal_message, Envelope, GossipError};
pub use message::{
    verify_vote_record, vote_body, AttestMsg, CommitMsg, GossipMessage, ProposeMsg, VoteMsg,
};
pub use peers::{PeerBook, PeerInfo};
