//! Bearer token to principal.
//!
//! Resolution never fails a request: any problem with the token degrades to anonymous and
//! the endpoint's own authorization check decides what that means.

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use tracing::debug;

use crate::directory::SubjectDirectory;
use crate::error::{AppError, AppResult};
use crate::identity::{Principal, RequestContext, RevocationStore, TokenService, TokenType};

#[derive(Clone)]
pub struct PrincipalResolver {
    tokens: Arc<TokenService>,
    revocations: RevocationStore,
    subjects: Arc<dyn SubjectDirectory>,
}

/// Token from an `Authorization: Bearer <token>` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() { None } else { Some(token) }
}

impl PrincipalResolver {
    pub fn new(tokens: Arc<TokenService>, revocations: RevocationStore, subjects: Arc<dyn SubjectDirectory>) -> Self {
        Self { tokens, revocations, subjects }
    }

    /// The full pipeline with the reason for rejection kept.
    pub fn try_resolve(&self, token: &str) -> AppResult<Principal> {
        let claims = self.tokens.verify(token)?;
        if claims.token_type != TokenType::Access {
            return Err(AppError::TokenInvalid);
        }
        if self.revocations.is_revoked(&claims.jti) {
            return Err(AppError::TokenRevoked);
        }
        let subject_id = claims.subject_id()?;
        let subject = self.subjects.subject(subject_id).ok_or_else(|| AppError::SubjectNotFound(claims.sub.clone()))?;
        Ok(Principal {
            subject_id,
            display_name: subject.display_name,
            role: claims.role,
            org_id: subject.org_id,
        })
    }

    /// Anonymous (`None`) on any failure.
    pub fn resolve(&self, token: Option<&str>) -> Option<Principal> {
        let token = token?;
        match self.try_resolve(token) {
            Ok(p) => Some(p),
            Err(e) => {
                debug!(target: "practicum::resolver", code = e.code_str(), "resolved as anonymous");
                None
            }
        }
    }

    pub fn resolve_context(&self, headers: &HeaderMap, request_id: String) -> RequestContext {
        let bearer = bearer_token(headers);
        RequestContext {
            principal: self.resolve(bearer),
            bearer: bearer.map(str::to_string),
            request_id,
        }
    }
}
