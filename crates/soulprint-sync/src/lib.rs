pub mod api;
pub mod service;

pub use api::{StateHashResponse, StateInfoResponse, StatePage};
pub use service::{HttpStateFetch, StateFetch, SyncOutcome, SyncService};
