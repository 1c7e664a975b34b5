//! cookiescope_core - capability-gated cookie inspection service.
//!
//! The service runs in a privileged background task and is the only
//! component that touches the host's cookie store. Observer contexts
//! (browser tabs) talk to it through typed request/response envelopes
//! and receive unsolicited snapshot refreshes through a push channel,
//! but only while the user-granted cookie capability is held.

pub mod cookie;
pub mod domain;
pub mod error;
pub mod fanout;
pub mod gate;
pub mod host;
pub mod registry;
pub mod service;

pub use cookie::{ChangeCause, Cookie, CookieChange, SameSite};
pub use error::{HostError, Result, ServiceError};
pub use fanout::ChangeFanout;
pub use gate::{CapabilityDecision, CapabilityGate};
pub use host::{
    CapabilityHost, ConsentPolicy, CookieStore, MemoryCapabilityHost, MemoryCookieStore,
};
pub use registry::{ObserverId, ObserverRegistry};
pub use service::{
    ChangeInfo, Command, CookieService, Envelope, Push, PushReceiver, PushSender, Request,
    Response, ServiceHandle,
};
