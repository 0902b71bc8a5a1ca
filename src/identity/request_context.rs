use super::Principal;
use crate::error::{AppError, AppResult};

/// Per-request scope threaded from the resolution middleware into handlers.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// `None` means anonymous.
    pub principal: Option<Principal>,
    /// Raw bearer token as presented, kept so logout can revoke it.
    pub bearer: Option<String>,
    pub request_id: String,
}

impl RequestContext {
    pub fn anonymous(request_id: impl Into<String>) -> Self {
        Self { principal: None, bearer: None, request_id: request_id.into() }
    }

    pub fn require_principal(&self) -> AppResult<&Principal> {
        self.principal.as_ref().ok_or(AppError::Unauthenticated)
    }
}
