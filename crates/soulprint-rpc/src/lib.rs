pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use server::{build_router, serve, NodeContext};
