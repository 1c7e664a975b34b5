//! Capability gate over the host's permission store.
//!
//! The gate is the sole owner of capability semantics. It holds no
//! cached state of its own: every check goes to the host store, which
//! is the source of truth, so a revoke performed elsewhere is observed
//! on the next check.

use crate::error::{Result, ServiceError};
use crate::host::CapabilityHost;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a user-consent prompt. A decline is a normal outcome,
/// not an error; the user may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityDecision {
    Granted,
    Denied,
}

pub struct CapabilityGate {
    host: Arc<dyn CapabilityHost>,
}

impl CapabilityGate {
    pub fn new(host: Arc<dyn CapabilityHost>) -> Self {
        Self { host }
    }

    /// Whether the cookie capability is currently held. Never errors;
    /// a failed host query reads as "not granted".
    pub async fn has_capability(&self) -> bool {
        match self.host.contains().await {
            Ok(granted) => granted,
            Err(err) => {
                warn!(error = %err, "capability query failed, treating as not granted");
                false
            }
        }
    }

    /// Run the host's user-consent flow once and report the outcome.
    /// Suspends until the user responds; no timeout is enforced.
    pub async fn request_capability(&self) -> Result<CapabilityDecision> {
        if self.host.request().await? {
            info!("cookie capability granted");
            Ok(CapabilityDecision::Granted)
        } else {
            info!("cookie capability denied by user");
            Ok(CapabilityDecision::Denied)
        }
    }

    /// Ask the host to drop the capability.
    pub async fn revoke_capability(&self) -> Result<()> {
        match self.host.remove().await {
            Ok(true) => {
                info!("cookie capability revoked");
                Ok(())
            }
            Ok(false) => Err(ServiceError::RevocationFailed(
                "host did not remove the capability".into(),
            )),
            Err(err) => Err(err.into()),
        }
    }
}
