//! SPT extraction and DPoP enforcement for authenticated routes.

use axum::http::{HeaderMap, Method, Uri};

use soulprint_core::constants::SPT_MIN_BEARER_LEN;
use soulprint_token::TokenPayload;

use crate::error::ApiError;
use crate::server::NodeContext;

/// Pull the SPT out of a request, in precedence order: `X-Soulprint` header,
/// `Authorization: Bearer` (only values long enough to be SPTs), `?spt=`
/// query parameter.
pub fn extract_spt(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(v) = headers.get("x-soulprint").and_then(|v| v.to_str().ok()) {
        return Some(v.trim().to_string());
    }
    if let Some(v) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(bearer) = v.strip_prefix("Bearer ") {
            let bearer = bearer.trim();
            if bearer.len() > SPT_MIN_BEARER_LEN {
                return Some(bearer.to_string());
            }
        }
    }
    uri.query().and_then(|q| {
        q.split('&')
            .find_map(|kv| kv.strip_prefix("spt="))
            .map(|v| v.to_string())
    })
}

/// Authenticate a request: decode the SPT and, when the node enforces DPoP,
/// verify the proof header against this exact request and token.
pub fn authenticate(
    ctx: &NodeContext,
    headers: &HeaderMap,
    method: &Method,
    uri: &Uri,
) -> Result<(TokenPayload, String), ApiError> {
    let spt = extract_spt(headers, uri).ok_or(ApiError::MissingToken)?;
    let token = soulprint_token::decode(&spt)
        .ok_or(ApiError::Soulprint(soulprint_core::SoulprintError::MalformedToken))?;

    if ctx.require_dpop {
        let proof = headers
            .get("x-soulprint-proof")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::DpopRequired)?;
        soulprint_dpop::verify(
            proof,
            &spt,
            method.as_str(),
            uri.path(),
            &ctx.nonces,
            token.did.as_str(),
        )?;
    }
    Ok((token, spt))
}
