//! Subscription state machine for the cookie change stream.
//!
//! The fan-out engine owns the single subscription to the host's change
//! stream. The `Option`-typed receiver makes the "at most one live
//! subscription" invariant structural: arming when already armed is a
//! no-op, so repeated grant-side setup can never produce duplicate
//! notifications.

use crate::cookie::CookieChange;
use crate::host::CookieStore;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Default)]
pub struct ChangeFanout {
    subscription: Option<broadcast::Receiver<CookieChange>>,
}

impl ChangeFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribe to the store's change stream if not already
    /// subscribed. Returns true when a new subscription was created.
    pub fn arm(&mut self, store: &dyn CookieStore) -> bool {
        if self.subscription.is_some() {
            debug!("change stream already subscribed, skipping");
            return false;
        }
        self.subscription = Some(store.subscribe());
        debug!("subscribed to cookie change stream");
        true
    }

    /// Drop the subscription. Returns true when there was one to drop.
    pub fn disarm(&mut self) -> bool {
        let was_subscribed = self.subscription.take().is_some();
        if was_subscribed {
            debug!("unsubscribed from cookie change stream");
        }
        was_subscribed
    }

    /// Wait for the next change event. Pends forever while
    /// unsubscribed or after the stream closes, which lets the service
    /// loop select over this unconditionally. Lagged events are skipped
    /// with a warning; each delivery re-fetches a full snapshot, so a
    /// missed delta only delays a refresh until the next event.
    pub async fn next_change(&mut self) -> CookieChange {
        loop {
            let Some(rx) = self.subscription.as_mut() else {
                return std::future::pending::<CookieChange>().await;
            };
            match rx.recv().await {
                Ok(change) => return change,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "cookie change stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.subscription = None;
                }
            }
        }
    }
}
