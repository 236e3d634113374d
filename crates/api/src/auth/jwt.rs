//! JWT credential validation for support connections

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use livedesk_shared::{DeskError, DeskResult, Role, Subject, UserId};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::IdentityVerifier;

/// JWT claims carried by a connection credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: i64,
    /// Support role (agent, customer or admin)
    pub role: Role,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
}

/// JWT manager for token operations
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    leeway_secs: u64,
}

impl JwtManager {
    /// Create a new JWT manager
    pub fn new(secret: &str, leeway_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            leeway_secs,
        }
    }

    /// Issue a token for a subject. Used by tooling and tests; end-user tokens are
    /// issued by the identity provider.
    pub fn generate_token(
        &self,
        user_id: UserId,
        role: Role,
        ttl: Duration,
    ) -> Result<String, JwtError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id.0,
            role,
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                _ => JwtError::Validation(e.to_string()),
            })
    }
}

#[async_trait]
impl IdentityVerifier for JwtManager {
    async fn verify_credential(&self, token: &str) -> DeskResult<Subject> {
        match self.validate_token(token) {
            Ok(claims) if claims.sub > 0 => Ok(Subject {
                id: UserId(claims.sub),
                role: claims.role,
            }),
            Ok(claims) => {
                tracing::warn!(sub = claims.sub, "Rejecting credential with non-positive subject");
                Err(DeskError::InvalidCredential)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Credential verification failed");
                Err(DeskError::InvalidCredential)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}
