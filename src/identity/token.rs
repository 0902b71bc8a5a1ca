//! Signed session tokens (HS256).
//!
//! `TokenService` is a pure cryptographic primitive: it mints and verifies tokens with a
//! single symmetric key and never consults revocation state. Revocation is applied by
//! `PrincipalResolver`.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::AppError;
use crate::identity::Role;

/// Distinguishes API-authenticating tokens from tokens that may only mint new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// Token claims as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject id, decimal.
    pub sub: String,
    /// Unique token id; the revocation key.
    pub jti: String,
    pub token_type: TokenType,
    pub role: Role,
    /// Display name, for convenience only. Never used for authorization.
    #[serde(default)]
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn subject_id(&self) -> Result<i64, TokenError> {
        self.sub.parse::<i64>().map_err(|_| TokenError::Invalid(format!("non-numeric sub '{}'", self.sub)))
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whole seconds left until `exp`, floored at zero.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        self.exp.saturating_sub(now.timestamp()).max(0) as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token expired")]
    Expired,
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Invalid(_) => AppError::TokenInvalid,
            TokenError::Expired => AppError::TokenExpired,
            TokenError::Encoding(msg) => AppError::Internal(msg),
        }
    }
}

/// A freshly minted token together with the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Mint a token valid from now for `ttl`. A fresh v4 UUID is used as `jti`.
    pub fn issue(
        &self,
        subject_id: i64,
        role: Role,
        display_name: &str,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject_id, role, display_name, token_type, ttl, Utc::now())
    }

    /// Same as `issue` with an explicit issue time.
    pub fn issue_at(
        &self,
        subject_id: i64,
        role: Role,
        display_name: &str,
        token_type: TokenType,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let iat = now.timestamp();
        let exp = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| iat.checked_add(secs))
            .filter(|exp| DateTime::<Utc>::from_timestamp(*exp, 0).is_some())
            .ok_or_else(|| TokenError::Encoding(format!("ttl of {}s is out of range", ttl.as_secs())))?;
        let claims = Claims {
            sub: subject_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            token_type,
            role,
            name: display_name.to_string(),
            iat,
            exp,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        debug!(target: "practicum::token", sub = subject_id, jti = %claims.jti, token_type = %token_type, "token issued");
        Ok(IssuedToken { token, claims })
    }

    /// Check signature, format and expiry. Revocation is not consulted.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })?;
        let claims = data.claims;
        claims.subject_id()?;
        if claims.jti.is_empty() {
            return Err(TokenError::Invalid("missing jti".into()));
        }
        Ok(claims)
    }

    /// Seconds until the token expires; 0 when it does not verify.
    pub fn remaining_ttl(&self, token: &str) -> u64 {
        match self.verify(token) {
            Ok(claims) => claims.remaining_secs(Utc::now()),
            Err(e) => {
                debug!(target: "practicum::token", "remaining_ttl on unverifiable token: {}", e);
                0
            }
        }
    }
}
