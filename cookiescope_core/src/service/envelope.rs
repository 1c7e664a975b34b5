//! Request, response, and push message types.
//!
//! These are the only surface exposed to observer contexts. The wire
//! form is JSON tagged by `type`; free-text fields (domains, cookie
//! names and values, error messages) are plain strings and must be
//! escaped by the renderer before insertion into a document.

use crate::cookie::{ChangeCause, Cookie};
use crate::registry::ObserverId;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

pub type PushSender = mpsc::Sender<Push>;
pub type PushReceiver = mpsc::Receiver<Push>;

/// Observer-originated requests. `domain` may be a bare hostname or a
/// full URL; the router extracts the hostname either way, falling back
/// to the raw string for unparseable input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    CheckPermission { domain: String, url: String },
    RequestCookiePermission { domain: String, url: String },
    FetchCookies { domain: String, url: String },
    ClearDomainCookies { domain: String, url: String },
    RevokeCookiePermission,
    /// Any request whose type tag is not recognized. Answered with a
    /// typed error rather than dropped.
    #[serde(other)]
    Unknown,
}

/// Direct reply to a request. Every accepted request gets exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    Permission { has_permission: bool },
    PermissionGranted,
    PermissionDenied,
    Cookies { cookies: Vec<Cookie>, domain: String },
    Cleared { domain: String },
    Revoked,
    Error { message: String },
}

/// What triggered a pushed snapshot refresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChangeInfo {
    pub cause: ChangeCause,
    pub removed: bool,
}

/// Unsolicited updates pushed to observers. The push channel carries
/// only genuinely unsolicited traffic; it never duplicates a direct
/// reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Push {
    #[serde(rename = "REAL_TIME_COOKIE_UPDATE")]
    CookieUpdate {
        cookies: Vec<Cookie>,
        domain: String,
        change: ChangeInfo,
    },
}

/// A request envelope as it enters the service loop. The oneshot reply
/// sender makes exactly-once response delivery structural: a handler
/// cannot double-reply, and dropping the sender is the only way to not
/// reply (reserved for rejected senders).
#[derive(Debug)]
pub struct Envelope {
    /// Trust-domain identity of the caller; must equal the service's
    /// own identity or the envelope is dropped without a reply.
    pub sender: Uuid,
    pub observer: ObserverId,
    /// Channel for unsolicited updates to this observer.
    pub push: PushSender,
    pub request: Request,
    pub reply: oneshot::Sender<Response>,
}

/// Commands consumed by the service loop: observer requests plus tab
/// lifecycle notifications from the host.
#[derive(Debug)]
pub enum Command {
    Request(Envelope),
    TabClosed(ObserverId),
    TabNavigated { observer: ObserverId, url: String },
}
