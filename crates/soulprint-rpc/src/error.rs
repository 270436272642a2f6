//! Error-kind → HTTP status mapping. Human-readable messages are formatted
//! here, at the boundary, from the typed kinds.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use soulprint_core::error::SoulprintError;

use crate::types::ErrorBody;

#[derive(Debug)]
pub enum ApiError {
    /// A protocol-taxonomy failure.
    Soulprint(SoulprintError),
    /// Request carried no usable SPT.
    MissingToken,
    /// DPoP enforcement is on and no proof header was sent.
    DpopRequired,
    /// Malformed request body or parameters.
    BadRequest(String),
}

impl From<SoulprintError> for ApiError {
    fn from(e: SoulprintError) -> Self {
        ApiError::Soulprint(e)
    }
}

fn status_for(e: &SoulprintError) -> StatusCode {
    use SoulprintError::*;
    match e {
        // Validation
        InvalidDid(_) | InvalidValue(_) | InvalidNullifier(_) | InvalidProof => {
            StatusCode::BAD_REQUEST
        }
        InvalidSignature | MalformedToken => StatusCode::UNAUTHORIZED,
        // Proof-of-possession
        DpopMalformed | DpopExpired | DpopReplay | DpopMethodMismatch { .. }
        | DpopUrlMismatch | DpopSptHashMismatch | DpopDidMismatch | DpopBadSignature => {
            StatusCode::UNAUTHORIZED
        }
        // Policy
        IssuerNotAuthorized { .. } | CooldownActive { .. } | SameIssuerTarget
        | ScoreBelowFloor(_) | RenewNotPermitted => StatusCode::FORBIDDEN,
        // Consensus
        NullifierAlreadyUsed(_) | Conflict { .. } => StatusCode::CONFLICT,
        QuorumNotReached { .. } | Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        // Everything else
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Soulprint(e) => (status_for(&e), e.to_string()),
            ApiError::MissingToken => (StatusCode::UNAUTHORIZED, "missing token".to_string()),
            ApiError::DpopRequired => (StatusCode::UNAUTHORIZED, "dpop_required".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
