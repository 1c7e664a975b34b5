//! Error types for the cookiescope service.
//!
//! The taxonomy separates host-platform failures from service-level
//! outcomes so callers can tell a declined prompt from a broken store.

use thiserror::Error;

/// Failures reported by the host platform APIs.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("capability store failure: {0}")]
    CapabilityStore(String),

    #[error("cookie store failure: {0}")]
    CookieStore(String),
}

/// Caller-facing errors returned by the request router.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// An operation that requires the cookie capability was attempted
    /// without it. Never escalated to an automatic permission request.
    #[error("cookie permission has not been granted")]
    NotGranted,

    #[error("host API failure: {0}")]
    Host(#[from] HostError),

    #[error("capability revocation failed: {0}")]
    RevocationFailed(String),

    #[error("unknown request type")]
    UnknownRequest,

    /// The service loop is no longer running.
    #[error("service unavailable")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, ServiceError>;
