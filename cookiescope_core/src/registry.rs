//! Observer registry: which tab is watching which domain.
//!
//! The registry is the sole owner of the tab-to-domain map and of the
//! push channel for each observer. It is only ever mutated from within
//! the service loop, so it needs no interior locking.

use crate::domain::domains_match;
use crate::service::envelope::PushSender;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Opaque handle to an observer context (a browser tab).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(pub Uuid);

impl ObserverId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

struct Registration {
    domain: String,
    push: PushSender,
}

/// In-memory map from observer to the normalized domain it watches.
/// At most one domain per observer; registration overwrites.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: HashMap<ObserverId, Registration>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer at a domain, replacing any prior entry.
    pub fn register(&mut self, observer: ObserverId, domain: impl Into<String>, push: PushSender) {
        let domain = domain.into();
        debug!(%observer, %domain, "registering observer");
        self.observers.insert(observer, Registration { domain, push });
    }

    /// Remove an observer. Returns true if it was registered.
    pub fn unregister(&mut self, observer: ObserverId) -> bool {
        let removed = self.observers.remove(&observer).is_some();
        if removed {
            debug!(%observer, "unregistered observer");
        }
        removed
    }

    /// Point an existing registration at a new domain, keeping its push
    /// channel. Used on tab navigation. Returns false if the observer
    /// was not registered.
    pub fn rebind(&mut self, observer: ObserverId, new_domain: impl Into<String>) -> bool {
        match self.observers.get_mut(&observer) {
            Some(registration) => {
                registration.domain = new_domain.into();
                true
            }
            None => false,
        }
    }

    /// The domain an observer is registered at, if any.
    pub fn domain_of(&self, observer: ObserverId) -> Option<&str> {
        self.observers.get(&observer).map(|r| r.domain.as_str())
    }

    /// Clone of the push sender for an observer, paired with its
    /// registered domain.
    pub fn entry(&self, observer: ObserverId) -> Option<(String, PushSender)> {
        self.observers
            .get(&observer)
            .map(|r| (r.domain.clone(), r.push.clone()))
    }

    /// All observers whose registered domain matches a change event's
    /// normalized domain under the permissive containment rule.
    pub fn all_matching(&self, event_domain: &str) -> Vec<ObserverId> {
        self.observers
            .iter()
            .filter(|(_, r)| domains_match(&r.domain, event_domain))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drop every registration. A revoked capability invalidates all
    /// outstanding registrations at once.
    pub fn clear(&mut self) {
        self.observers.clear();
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
