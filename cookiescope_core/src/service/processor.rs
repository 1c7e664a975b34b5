//! The cookie service event loop.
//!
//! All mutable state (registry, fan-out subscription) lives inside one
//! task, so handlers never run in parallel with each other. Handlers
//! may still interleave at await points into the host APIs; anything
//! decided before such a point is re-validated after it, most
//! importantly the capability check in [`CookieService::handle_change`].

use crate::domain::hostname_of;
use crate::error::{Result, ServiceError};
use crate::fanout::ChangeFanout;
use crate::gate::{CapabilityDecision, CapabilityGate};
use crate::host::{CapabilityHost, CookieStore};
use crate::registry::{ObserverId, ObserverRegistry};
use crate::service::envelope::{
    ChangeInfo, Command, Envelope, Push, PushSender, Request, Response,
};
use crate::cookie::CookieChange;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Resolve the domain a request targets. The domain field may itself be
/// a full URL or a bare hostname; when it is empty the url field is
/// used instead. Unparseable input falls back to the raw string.
fn target_domain(domain: &str, url: &str) -> String {
    if domain.is_empty() {
        hostname_of(url)
    } else {
        hostname_of(domain)
    }
}

fn error_response(err: ServiceError) -> Response {
    Response::Error {
        message: err.to_string(),
    }
}

/// Handle for submitting requests and tab lifecycle notifications to a
/// running service.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<Command>,
    identity: Uuid,
}

impl ServiceHandle {
    /// The service's trust-domain identity. Envelopes carrying any
    /// other sender value are dropped without a reply.
    pub fn identity(&self) -> Uuid {
        self.identity
    }

    /// Submit a request on behalf of an observer and wait for the
    /// single direct reply.
    pub async fn request(
        &self,
        observer: ObserverId,
        push: PushSender,
        request: Request,
    ) -> Result<Response> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope {
            sender: self.identity,
            observer,
            push,
            request,
            reply: reply_tx,
        };
        self.send_command(Command::Request(envelope)).await?;
        reply_rx.await.map_err(|_| ServiceError::Unavailable)
    }

    /// Notify the service that an observer context was destroyed.
    pub async fn tab_closed(&self, observer: ObserverId) -> Result<()> {
        self.send_command(Command::TabClosed(observer)).await
    }

    /// Notify the service that an observer navigated to a new URL.
    pub async fn tab_navigated(&self, observer: ObserverId, url: impl Into<String>) -> Result<()> {
        self.send_command(Command::TabNavigated {
            observer,
            url: url.into(),
        })
        .await
    }

    /// Submit a raw command. Lets callers build envelopes by hand,
    /// including ones with a foreign sender identity.
    pub async fn send_command(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ServiceError::Unavailable)
    }
}

/// The privileged background service: capability gate, observer
/// registry, change fan-out, and the request router, driven by a
/// single event loop.
pub struct CookieService {
    identity: Uuid,
    command_tx: mpsc::Sender<Command>,
    command_rx: mpsc::Receiver<Command>,
    gate: CapabilityGate,
    store: Arc<dyn CookieStore>,
    registry: ObserverRegistry,
    fanout: ChangeFanout,
}

impl CookieService {
    /// Create a service over the given host APIs with the specified
    /// command channel capacity. The registry starts empty; capability
    /// state is re-derived from the host store when [`run`] starts.
    ///
    /// [`run`]: CookieService::run
    pub fn new(
        capabilities: Arc<dyn CapabilityHost>,
        store: Arc<dyn CookieStore>,
        channel_capacity: usize,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(channel_capacity);
        debug!("creating cookie service");
        Self {
            identity: Uuid::new_v4(),
            command_tx,
            command_rx,
            gate: CapabilityGate::new(capabilities),
            store,
            registry: ObserverRegistry::new(),
            fanout: ChangeFanout::new(),
        }
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            tx: self.command_tx.clone(),
            identity: self.identity,
        }
    }

    /// Run the service event loop until every handle is dropped.
    pub async fn run(mut self) {
        info!("starting cookie service");

        // A capability held from a prior session arms the stream now.
        if self.gate.has_capability().await {
            self.fanout.arm(self.store.as_ref());
        }

        loop {
            tokio::select! {
                // Queued commands drain before change events, so a tab
                // teardown or navigation notification is never outrun
                // by a change buffered earlier in the stream.
                biased;

                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                change = self.fanout.next_change() => {
                    self.handle_change(change).await;
                }
            }
        }

        info!("cookie service shutting down");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Request(envelope) => {
                if envelope.sender != self.identity {
                    // Dropping the envelope drops its reply sender; the
                    // caller gets no response at all.
                    warn!(sender = %envelope.sender, "dropping request from foreign sender");
                    return;
                }
                let Envelope {
                    observer,
                    push,
                    request,
                    reply,
                    ..
                } = envelope;
                let response = self.dispatch(observer, push, request).await;
                let _ = reply.send(response);
            }
            Command::TabClosed(observer) => {
                self.registry.unregister(observer);
            }
            Command::TabNavigated { observer, url } => {
                let domain = hostname_of(&url);
                if self.registry.rebind(observer, domain.as_str()) {
                    debug!(%observer, %domain, "observer rebound after navigation");
                }
            }
        }
    }

    async fn dispatch(
        &mut self,
        observer: ObserverId,
        push: PushSender,
        request: Request,
    ) -> Response {
        match request {
            Request::CheckPermission { domain, url } => {
                self.check_permission(observer, push, &domain, &url).await
            }
            Request::RequestCookiePermission { domain, url } => {
                self.request_permission(observer, push, &domain, &url).await
            }
            Request::FetchCookies { domain, url } => self.fetch_cookies(&domain, &url).await,
            Request::ClearDomainCookies { domain, url } => self.clear_domain(&domain, &url).await,
            Request::RevokeCookiePermission => self.revoke().await,
            Request::Unknown => error_response(ServiceError::UnknownRequest),
        }
    }

    async fn check_permission(
        &mut self,
        observer: ObserverId,
        push: PushSender,
        domain: &str,
        url: &str,
    ) -> Response {
        let domain = target_domain(domain, url);
        let has_permission = self.gate.has_capability().await;
        if has_permission {
            self.fanout.arm(self.store.as_ref());
            self.registry.register(observer, domain, push);
        }
        Response::Permission { has_permission }
    }

    async fn request_permission(
        &mut self,
        observer: ObserverId,
        push: PushSender,
        domain: &str,
        url: &str,
    ) -> Response {
        let domain = target_domain(domain, url);
        match self.gate.request_capability().await {
            Ok(CapabilityDecision::Granted) => {
                self.registry.register(observer, domain, push);
                self.fanout.arm(self.store.as_ref());
                Response::PermissionGranted
            }
            // A decline leaves any prior subscription untouched.
            Ok(CapabilityDecision::Denied) => Response::PermissionDenied,
            Err(err) => {
                error!(error = %err, "capability request failed");
                error_response(err)
            }
        }
    }

    async fn fetch_cookies(&mut self, domain: &str, url: &str) -> Response {
        let domain = target_domain(domain, url);
        if !self.gate.has_capability().await {
            return error_response(ServiceError::NotGranted);
        }
        match self.store.get_all(&domain).await {
            Ok(cookies) => Response::Cookies { cookies, domain },
            Err(err) => {
                error!(error = %err, %domain, "cookie fetch failed");
                error_response(err.into())
            }
        }
    }

    async fn clear_domain(&mut self, domain: &str, url: &str) -> Response {
        let domain = target_domain(domain, url);
        if !self.gate.has_capability().await {
            return error_response(ServiceError::NotGranted);
        }
        let cookies = match self.store.get_all(&domain).await {
            Ok(cookies) => cookies,
            Err(err) => {
                error!(error = %err, %domain, "cookie fetch before clear failed");
                return error_response(err.into());
            }
        };
        for cookie in &cookies {
            if let Err(err) = self
                .store
                .remove(&cookie.resource_url(), &cookie.name, &cookie.store_id)
                .await
            {
                // Not retried; the fan-out refresh that follows the
                // store's own change events is the source of truth for
                // what actually remains.
                warn!(error = %err, name = %cookie.name, "cookie deletion failed");
            }
        }
        info!(%domain, count = cookies.len(), "cleared cookies for domain");
        Response::Cleared { domain }
    }

    async fn revoke(&mut self) -> Response {
        match self.gate.revoke_capability().await {
            Ok(()) => {
                self.fanout.disarm();
                self.registry.clear();
                Response::Revoked
            }
            Err(err) => {
                error!(error = %err, "capability revocation failed");
                error_response(err)
            }
        }
    }

    /// Fan a change event out to every matching observer with a fresh
    /// snapshot of its registered domain.
    async fn handle_change(&mut self, change: CookieChange) {
        // A revoke may race an event already in flight; re-check before
        // touching the registry.
        if !self.gate.has_capability().await {
            debug!("dropping cookie change observed without capability");
            return;
        }
        let event_domain = change.cookie.normalized_domain().to_string();
        for observer in self.registry.all_matching(&event_domain) {
            let Some((domain, push)) = self.registry.entry(observer) else {
                continue;
            };
            let cookies = match self.store.get_all(&domain).await {
                Ok(cookies) => cookies,
                Err(err) => {
                    warn!(error = %err, %domain, "snapshot re-fetch failed, skipping observer");
                    continue;
                }
            };
            let update = Push::CookieUpdate {
                cookies,
                domain,
                change: ChangeInfo {
                    cause: change.cause,
                    removed: change.removed,
                },
            };
            if push.send(update).await.is_err() {
                debug!(%observer, "observer gone, evicting");
                self.registry.unregister(observer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ConsentPolicy, MemoryCapabilityHost, MemoryCookieStore};

    fn service(policy: ConsentPolicy) -> (CookieService, Arc<MemoryCookieStore>) {
        let store = Arc::new(MemoryCookieStore::new());
        let service = CookieService::new(
            Arc::new(MemoryCapabilityHost::new(policy)),
            store.clone(),
            16,
        );
        (service, store)
    }

    fn push_channel() -> (PushSender, crate::service::envelope::PushReceiver) {
        mpsc::channel(16)
    }

    #[test]
    fn test_target_domain_resolution() {
        assert_eq!(target_domain("example.com", ""), "example.com");
        assert_eq!(
            target_domain("https://sub.example.com/x", ""),
            "sub.example.com"
        );
        assert_eq!(target_domain("", "https://example.com/"), "example.com");
        assert_eq!(target_domain("not a url", ""), "not a url");
    }

    #[tokio::test]
    async fn test_fetch_without_capability_is_typed_error() {
        let (service, _store) = service(ConsentPolicy::DenyAll);
        let handle = service.handle();
        tokio::spawn(service.run());

        let (push, _rx) = push_channel();
        let response = handle
            .request(
                ObserverId::new(),
                push,
                Request::FetchCookies {
                    domain: "example.com".into(),
                    url: "https://example.com/".into(),
                },
            )
            .await
            .unwrap();

        match response {
            Response::Error { message } => assert!(message.contains("not been granted")),
            other => panic!("expected error response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_request_type_gets_typed_error() {
        let (service, _store) = service(ConsentPolicy::GrantAll);
        let handle = service.handle();
        tokio::spawn(service.run());

        let (push, _rx) = push_channel();
        let response = handle
            .request(ObserverId::new(), push, Request::Unknown)
            .await
            .unwrap();
        assert!(matches!(response, Response::Error { .. }));
    }

    #[tokio::test]
    async fn test_foreign_sender_gets_no_reply() {
        let (service, _store) = service(ConsentPolicy::GrantAll);
        let handle = service.handle();
        tokio::spawn(service.run());

        let (push, _rx) = push_channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .send_command(Command::Request(Envelope {
                sender: Uuid::new_v4(),
                observer: ObserverId::new(),
                push,
                request: Request::CheckPermission {
                    domain: "example.com".into(),
                    url: "https://example.com/".into(),
                },
                reply: reply_tx,
            }))
            .await
            .unwrap();

        // The reply sender is dropped without being used.
        assert!(reply_rx.await.is_err());
    }
}
