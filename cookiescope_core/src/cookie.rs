//! Cookie records and change events as surfaced by the host cookie store.

use crate::domain::strip_leading_dot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SameSite attribute of a cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    Strict,
    Lax,
    None,
    Unspecified,
}

/// Why the host emitted a cookie change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// Inserted or deleted by an explicit call.
    Explicit,
    /// Deleted because a new cookie with the same key replaced it.
    Overwrite,
    /// Deleted because it expired.
    Expired,
    /// Evicted by the store (e.g. garbage collection).
    Evicted,
}

/// Immutable snapshot of a single cookie.
///
/// The service never mutates a record in place; it only requests
/// deletion or re-fetches the full set for a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Domain attribute as stored; may carry a leading dot.
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
    /// Session cookies have no expiration.
    pub expiration: Option<DateTime<Utc>>,
    pub store_id: String,
}

impl Cookie {
    /// Reconstruct the canonical resource URL a deletion must be
    /// addressed to: scheme from the secure flag, host from the
    /// dot-stripped domain, plus the cookie's path.
    pub fn resource_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}{}", scheme, strip_leading_dot(&self.domain), self.path)
    }

    /// The cookie's domain with any leading dot stripped.
    pub fn normalized_domain(&self) -> &str {
        strip_leading_dot(&self.domain)
    }
}

/// A single event from the host's cookie change stream. Consumed once
/// per listener invocation, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieChange {
    pub cookie: Cookie,
    pub cause: ChangeCause,
    /// True when the cookie was removed, false when it was set.
    pub removed: bool,
}
