//! Domain normalization and matching.
//!
//! Observers register the hostname of the page they are viewing; cookie
//! change events carry the cookie's domain attribute, which may have a
//! leading dot. This module owns both normalizations and the matching
//! rule that connects the two.

use url::Url;

/// Extract the hostname from `input`, which may be a full URL or a bare
/// hostname. Unparseable input falls back to the raw string unchanged.
pub fn hostname_of(input: &str) -> String {
    match Url::parse(input) {
        Ok(url) => match url.host_str() {
            Some(host) => host.to_string(),
            None => input.to_string(),
        },
        Err(_) => input.to_string(),
    }
}

/// Strip the leading dot a cookie domain attribute may carry
/// (`.example.com` → `example.com`).
pub fn strip_leading_dot(domain: &str) -> &str {
    domain.strip_prefix('.').unwrap_or(domain)
}

/// Decide whether a change event for cookie domain `event_domain` concerns
/// an observer registered at `registered`. Both sides are expected to be
/// normalized (no leading dot).
///
/// The rule is bidirectional containment: equal, or either side contains
/// the other as a substring. This tolerates parent/child cookie-domain
/// relationships (a cookie on `example.com` reaches a tab on
/// `sub.example.com`), but it is a known over-approximation: unrelated
/// domains sharing a substring also match (`example.com` vs
/// `notexample.com`). Preserved as-is for compatibility with the
/// shipped behavior.
pub fn domains_match(registered: &str, event_domain: &str) -> bool {
    registered == event_domain
        || event_domain.contains(registered)
        || registered.contains(event_domain)
}
