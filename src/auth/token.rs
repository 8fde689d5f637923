//! Signed session tokens (compact JWS, HS256).
//!
//! Access and refresh tokens are signed with distinct secrets. The claimed kind
//! selects the verification key, so a token minted under one secret can never
//! verify as the other kind.

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    dangerous::insecure_decode, decode, encode, Algorithm, DecodingKey,
    EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{error::AuthError, revocation::RevocationRegistry, state::AuthConfig};

const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub kind: TokenKind,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl Claims {
    /// Expiry as a timestamp; saturates to "now" for out-of-range values.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }
    }
}

pub struct TokenIssuer {
    access_keys: SigningKeys,
    refresh_keys: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    issuer: String,
    validation: Validation,
    revocations: Arc<RevocationRegistry>,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    #[must_use]
    pub fn new(
        access_secret: SecretString,
        refresh_secret: SecretString,
        config: &AuthConfig,
        revocations: Arc<RevocationRegistry>,
    ) -> Self {
        // Expiry is checked in validate_at, after signature and issuer.
        let mut validation = Validation::new(TOKEN_ALGORITHM);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&[config.token_issuer()]);

        Self {
            access_keys: SigningKeys::from_secret(&access_secret),
            refresh_keys: SigningKeys::from_secret(&refresh_secret),
            access_ttl: config.access_token_ttl(),
            refresh_ttl: config.refresh_token_ttl(),
            issuer: config.token_issuer().to_string(),
            validation,
            revocations,
        }
    }

    #[must_use]
    pub fn revocations(&self) -> &Arc<RevocationRegistry> {
        &self.revocations
    }

    #[must_use]
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Mint a signed token of `kind` for the subject.
    ///
    /// # Errors
    /// Returns `AuthError::SigningFailure` if the expiry is out of range or
    /// the claims cannot be signed.
    pub fn issue(
        &self,
        subject_id: i64,
        username: &str,
        kind: TokenKind,
    ) -> Result<String, AuthError> {
        self.issue_at(subject_id, username, kind, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        subject_id: i64,
        username: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let expires_at = chrono::Duration::from_std(self.ttl(kind))
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                AuthError::SigningFailure(format!("{} token lifetime out of range", kind.as_str()))
            })?;
        let claims = Claims {
            sub: subject_id,
            username: username.to_string(),
            kind,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };
        sign(&claims, &self.keys(kind).encoding)
    }

    /// Mint an access + refresh pair bound to the same subject.
    ///
    /// # Errors
    /// Returns `AuthError::SigningFailure` if either token cannot be signed.
    pub fn issue_pair(&self, subject_id: i64, username: &str) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue(subject_id, username, TokenKind::Access)?,
            refresh_token: self.issue(subject_id, username, TokenKind::Refresh)?,
        })
    }

    /// Validate a token against the expected kind.
    ///
    /// Checks run in a fixed order: revocation, structure and signature,
    /// expiry, kind.
    ///
    /// # Errors
    /// `TokenRevoked`, `TokenMalformed`, `TokenExpired` or `TokenWrongKind`.
    pub fn validate(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        self.validate_at(token, expected, Utc::now())
    }

    pub(crate) fn validate_at(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Claims, AuthError> {
        // The id and kind are needed before the signature can be checked;
        // nothing else in the payload is trusted until it verifies.
        let unverified = insecure_decode::<Claims>(token)
            .map_err(|_| AuthError::TokenMalformed)?
            .claims;

        if self.revocations.is_revoked_at(&unverified.jti, now) {
            return Err(AuthError::TokenRevoked);
        }

        let claims = decode::<Claims>(
            token,
            &self.keys(unverified.kind).decoding,
            &self.validation,
        )
        .map_err(|err| {
            debug!("token rejected: {err}");
            AuthError::TokenMalformed
        })?
        .claims;

        if claims.exp <= now.timestamp() {
            return Err(AuthError::TokenExpired);
        }

        if claims.kind != expected {
            return Err(AuthError::TokenWrongKind);
        }

        Ok(claims)
    }

    /// Validate an access token and revoke its id until natural expiry.
    ///
    /// # Errors
    /// Any validation error for the access token.
    pub fn invalidate(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.validate(token, TokenKind::Access)?;
        self.revocations.revoke(&claims.jti, claims.expires_at());
        info!(
            subject_id = claims.sub,
            username = %claims.username,
            "access token revoked"
        );
        Ok(claims)
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access_keys,
            TokenKind::Refresh => &self.refresh_keys,
        }
    }
}

fn sign(claims: &Claims, key: &EncodingKey) -> Result<String, AuthError> {
    let token = encode(&Header::new(TOKEN_ALGORITHM), claims, key)
        .map_err(|err| AuthError::SigningFailure(err.to_string()))?;

    debug!(kind = claims.kind.as_str(), jti = %claims.jti, "token issued");

    Ok(token)
}
