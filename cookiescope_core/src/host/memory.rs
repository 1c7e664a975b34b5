//! In-memory host implementations.
//!
//! Used by the test suites and the CLI demo. The capability host
//! resolves consent prompts from a configurable policy instead of a
//! real user, and the cookie store emits a change event on every
//! mutation, mirroring the host change stream the service subscribes to.

use super::{CapabilityHost, CookieStore};
use crate::cookie::{ChangeCause, Cookie, CookieChange};
use crate::domain::strip_leading_dot;
use crate::error::HostError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

/// How the in-memory capability host answers consent prompts.
#[derive(Debug, Clone)]
pub enum ConsentPolicy {
    GrantAll,
    DenyAll,
    /// Scripted answers, consumed front to back; exhausted scripts deny.
    Scripted(Vec<bool>),
}

/// In-memory capability store with a scripted consent prompt.
pub struct MemoryCapabilityHost {
    granted: Mutex<bool>,
    answers: Mutex<VecDeque<bool>>,
    policy: ConsentPolicy,
}

impl MemoryCapabilityHost {
    pub fn new(policy: ConsentPolicy) -> Self {
        let answers = match &policy {
            ConsentPolicy::Scripted(answers) => answers.iter().copied().collect(),
            _ => VecDeque::new(),
        };
        Self {
            granted: Mutex::new(false),
            answers: Mutex::new(answers),
            policy,
        }
    }

    /// Pre-grant the capability, as if a prior session already held it.
    pub fn with_granted(policy: ConsentPolicy) -> Self {
        let host = Self::new(policy);
        *host.granted.lock().unwrap() = true;
        host
    }

    fn next_answer(&self) -> bool {
        match &self.policy {
            ConsentPolicy::GrantAll => true,
            ConsentPolicy::DenyAll => false,
            ConsentPolicy::Scripted(_) => {
                self.answers.lock().unwrap().pop_front().unwrap_or(false)
            }
        }
    }
}

#[async_trait]
impl CapabilityHost for MemoryCapabilityHost {
    async fn contains(&self) -> Result<bool, HostError> {
        Ok(*self.granted.lock().unwrap())
    }

    async fn request(&self) -> Result<bool, HostError> {
        if *self.granted.lock().unwrap() {
            return Ok(true);
        }
        let answer = self.next_answer();
        debug!(granted = answer, "consent prompt resolved");
        if answer {
            *self.granted.lock().unwrap() = true;
        }
        Ok(answer)
    }

    async fn remove(&self) -> Result<bool, HostError> {
        let mut granted = self.granted.lock().unwrap();
        let was_granted = *granted;
        *granted = false;
        Ok(was_granted)
    }
}

/// In-memory cookie jar with a broadcast change stream.
pub struct MemoryCookieStore {
    jar: Mutex<Vec<Cookie>>,
    changes: broadcast::Sender<CookieChange>,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            jar: Mutex::new(Vec::new()),
            changes,
        }
    }

    /// Insert or overwrite a cookie, emitting change events the way the
    /// host store does: an overwrite removal for a displaced cookie,
    /// then an explicit set for the new one.
    pub fn set(&self, cookie: Cookie) {
        let mut jar = self.jar.lock().unwrap();
        if let Some(pos) = jar.iter().position(|c| {
            c.name == cookie.name
                && c.domain == cookie.domain
                && c.path == cookie.path
                && c.store_id == cookie.store_id
        }) {
            let old = jar.remove(pos);
            let _ = self.changes.send(CookieChange {
                cookie: old,
                cause: ChangeCause::Overwrite,
                removed: true,
            });
        }
        jar.push(cookie.clone());
        let _ = self.changes.send(CookieChange {
            cookie,
            cause: ChangeCause::Explicit,
            removed: false,
        });
    }

    pub fn len(&self) -> usize {
        self.jar.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jar.lock().unwrap().is_empty()
    }
}

impl Default for MemoryCookieStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A cookie belongs to a domain query when the dot-stripped domains are
/// equal or one is a dot-suffix of the other.
fn domain_covers(cookie_domain: &str, query: &str) -> bool {
    let c = strip_leading_dot(cookie_domain);
    let q = strip_leading_dot(query);
    c == q || c.ends_with(&format!(".{q}")) || q.ends_with(&format!(".{c}"))
}

#[async_trait]
impl CookieStore for MemoryCookieStore {
    async fn get_all(&self, domain: &str) -> Result<Vec<Cookie>, HostError> {
        let jar = self.jar.lock().unwrap();
        Ok(jar
            .iter()
            .filter(|c| domain_covers(&c.domain, domain))
            .cloned()
            .collect())
    }

    async fn remove(&self, url: &str, name: &str, store_id: &str) -> Result<(), HostError> {
        let removed = {
            let mut jar = self.jar.lock().unwrap();
            match jar.iter().position(|c| {
                c.name == name && c.store_id == store_id && c.resource_url() == url
            }) {
                Some(pos) => Some(jar.remove(pos)),
                None => None,
            }
        };
        if let Some(cookie) = removed {
            let _ = self.changes.send(CookieChange {
                cookie,
                cause: ChangeCause::Explicit,
                removed: true,
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<CookieChange> {
        self.changes.subscribe()
    }
}
