use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::password::{hash_password, verify_password};
use super::principal::{Principal, Role};
use super::revocation::RevocationStore;
use super::token::{TokenService, TokenType};
use crate::directory::{NewSubject, SubjectDirectory, SubjectRecord};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Self-registration. New accounts are teachers; `display_name` defaults to the username.
#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    #[serde(default, alias = "full_name")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub org_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub org_id: Option<i64>,
}

impl From<&SubjectRecord> for UserInfo {
    fn from(s: &SubjectRecord) -> Self {
        Self { id: s.id, username: s.username.clone(), display_name: s.display_name.clone(), role: s.role, org_id: s.org_id }
    }
}

/// Access and refresh token minted together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub token_type: String,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub user: UserInfo,
}

pub trait AuthProvider: Send + Sync {
    fn login(&self, req: &LoginRequest) -> AppResult<TokenPair>;
}

/// Password login against the subject directory plus the token lifecycle flows that
/// touch revocation: refresh rotation, logout and withdrawal.
pub struct LocalAuthProvider {
    tokens: Arc<TokenService>,
    revocations: RevocationStore,
    subjects: Arc<dyn SubjectDirectory>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl LocalAuthProvider {
    pub fn new(
        tokens: Arc<TokenService>,
        revocations: RevocationStore,
        subjects: Arc<dyn SubjectDirectory>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self { tokens, revocations, subjects, access_ttl, refresh_ttl }
    }

    fn issue_pair(&self, subject: &SubjectRecord) -> AppResult<TokenPair> {
        let access = self.tokens.issue(subject.id, subject.role, &subject.display_name, TokenType::Access, self.access_ttl)?;
        let refresh = self.tokens.issue(subject.id, subject.role, &subject.display_name, TokenType::Refresh, self.refresh_ttl)?;
        Ok(TokenPair {
            token_type: "Bearer".into(),
            access_expires_at: access.claims.expires_at(),
            access_token: access.token,
            refresh_expires_at: refresh.claims.expires_at(),
            refresh_token: refresh.token,
            user: UserInfo::from(subject),
        })
    }

    pub fn signup(&self, req: &SignupRequest) -> AppResult<UserInfo> {
        let username = req.username.trim();
        if username.is_empty() {
            return Err(AppError::invalid("username must not be empty"));
        }
        if req.password.is_empty() {
            return Err(AppError::invalid("password must not be empty"));
        }
        let display_name = match req.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => username.to_string(),
        };
        let record = self.subjects.create_subject(NewSubject {
            username: username.to_string(),
            display_name,
            password_hash: hash_password(&req.password)?,
            role: Role::Teacher,
            org_id: req.org_id,
        })?;
        info!(target: "practicum::auth", subject = record.id, org = ?record.org_id, "signup");
        Ok(UserInfo::from(&record))
    }

    /// Exchange a refresh token for a new pair. The presented refresh token is claimed
    /// (revoked) before anything is issued, so it yields at most one pair.
    pub fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let claims = self.tokens.verify(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AppError::TokenInvalid);
        }
        let subject_id = claims.subject_id()?;
        if !self.revocations.claim(&claims.jti, claims.remaining_secs(Utc::now())) {
            return Err(AppError::TokenRevoked);
        }
        let subject = self.subjects.subject(subject_id).ok_or_else(|| AppError::SubjectNotFound(claims.sub.clone()))?;
        let pair = self.issue_pair(&subject)?;
        info!(target: "practicum::auth", subject = subject_id, "refresh token rotated");
        Ok(pair)
    }

    /// Revoke the caller's access token and, if given, refresh token. Tokens that no longer
    /// verify or belong to someone else are skipped.
    pub fn logout(&self, principal: &Principal, access_token: Option<&str>, refresh_token: Option<&str>) {
        for token in [access_token, refresh_token].into_iter().flatten() {
            self.revoke_own(principal, token);
        }
        info!(target: "practicum::auth", subject = principal.subject_id, "logout");
    }

    /// Logout, then soft-delete the account.
    pub fn withdraw(&self, principal: &Principal, access_token: Option<&str>, refresh_token: Option<&str>) -> AppResult<()> {
        for token in [access_token, refresh_token].into_iter().flatten() {
            self.revoke_own(principal, token);
        }
        self.subjects.soft_delete_subject(principal.subject_id, Utc::now())?;
        info!(target: "practicum::auth", subject = principal.subject_id, "account withdrawn");
        Ok(())
    }

    fn revoke_own(&self, principal: &Principal, token: &str) {
        match self.tokens.verify(token) {
            Ok(claims) if claims.sub == principal.subject_id.to_string() => {
                self.revocations.revoke(&claims.jti, claims.remaining_secs(Utc::now()));
            }
            Ok(claims) => {
                warn!(target: "practicum::auth", subject = principal.subject_id, jti = %claims.jti, "not revoking token of another subject");
            }
            Err(e) => debug!(target: "practicum::auth", "nothing to revoke: {}", e),
        }
    }
}

impl AuthProvider for LocalAuthProvider {
    fn login(&self, req: &LoginRequest) -> AppResult<TokenPair> {
        let Some(subject) = self.subjects.subject_by_username(&req.username) else {
            debug!(target: "practicum::auth", username = %req.username, "login for unknown user");
            return Err(AppError::InvalidCredentials);
        };
        if !verify_password(&subject.password_hash, &req.password) {
            warn!(target: "practicum::auth", subject = subject.id, "login with wrong password");
            return Err(AppError::InvalidCredentials);
        }
        let pair = self.issue_pair(&subject)?;
        info!(target: "practicum::auth", subject = subject.id, role = %subject.role, "login");
        Ok(pair)
    }
}
