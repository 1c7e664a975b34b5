//! Host platform interfaces.
//!
//! The service never touches browser state directly; it goes through
//! these two seams. `CapabilityHost` is the source of truth for the
//! optional cookie capability (the service never caches a "granted"
//! belief beyond a single check), and `CookieStore` is the gated
//! sensitive resource itself.

mod memory;

pub use memory::{ConsentPolicy, MemoryCapabilityHost, MemoryCookieStore};

use crate::cookie::{Cookie, CookieChange};
use crate::error::HostError;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// The host's capability store for the single optional cookie capability.
#[async_trait]
pub trait CapabilityHost: Send + Sync {
    /// Whether the capability is currently held.
    async fn contains(&self) -> Result<bool, HostError>;

    /// Trigger the host's user-consent flow; resolves once the user
    /// responds. Returns true if the user granted the capability.
    async fn request(&self) -> Result<bool, HostError>;

    /// Ask the host to drop the capability. Returns true if it was
    /// removed.
    async fn remove(&self) -> Result<bool, HostError>;
}

/// The host's per-site cookie store.
#[async_trait]
pub trait CookieStore: Send + Sync {
    /// Fetch the full current record set for a domain.
    async fn get_all(&self, domain: &str) -> Result<Vec<Cookie>, HostError>;

    /// Delete one cookie, addressed by its canonical resource URL,
    /// name, and store id.
    async fn remove(&self, url: &str, name: &str, store_id: &str) -> Result<(), HostError>;

    /// Subscribe to the store's change stream. Each call returns a
    /// fresh receiver; holding at most one live receiver is the
    /// fan-out engine's responsibility, not the store's.
    fn subscribe(&self) -> broadcast::Receiver<CookieChange>;
}
