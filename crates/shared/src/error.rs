//! Error types for LiveDesk

use thiserror::Error;

/// Failures of a single connection attempt
///
/// Each variant terminates only the offending connection; none of them may leave
/// entries behind in the presence registry.
#[derive(Debug, Error)]
pub enum DeskError {
    #[error("Invalid or missing credential")]
    InvalidCredential,

    #[error("Agent routing lookup failed: {0}")]
    RoutingLookupFailed(String),

    #[error("Malformed customer parameters: {0}")]
    MalformedCustomerParams(String),

    #[error("Chat continuation query failed: {0}")]
    ContinuationQueryFailed(String),
}

/// Result type alias for connection-scoped operations
pub type DeskResult<T> = Result<T, DeskError>;
