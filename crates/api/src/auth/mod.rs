//! Connection authentication for LiveDesk

pub mod jwt;

use async_trait::async_trait;
use livedesk_shared::{DeskResult, Subject};

pub use jwt::{Claims, JwtError, JwtManager};

/// Validates a connection credential and yields the subject behind it
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Fails with `DeskError::InvalidCredential` for unknown, malformed or expired tokens
    async fn verify_credential(&self, token: &str) -> DeskResult<Subject>;
}
