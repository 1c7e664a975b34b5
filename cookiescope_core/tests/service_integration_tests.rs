use cookiescope_core::{
    ChangeCause, ConsentPolicy, Cookie, CookieService, MemoryCapabilityHost, MemoryCookieStore,
    ObserverId, Push, Request, Response, SameSite, ServiceHandle,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn cookie(name: &str, domain: &str) -> Cookie {
    Cookie {
        name: name.into(),
        value: "v".into(),
        domain: domain.into(),
        path: "/".into(),
        secure: false,
        http_only: false,
        same_site: SameSite::Unspecified,
        expiration: None,
        store_id: "0".into(),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn spawn_service(policy: ConsentPolicy) -> (ServiceHandle, Arc<MemoryCookieStore>) {
    init_tracing();
    let store = Arc::new(MemoryCookieStore::new());
    let service = CookieService::new(
        Arc::new(MemoryCapabilityHost::new(policy)),
        store.clone(),
        32,
    );
    let handle = service.handle();
    tokio::spawn(service.run());
    (handle, store)
}

async fn grant_and_register(
    handle: &ServiceHandle,
    domain: &str,
) -> (ObserverId, mpsc::Receiver<Push>) {
    let observer = ObserverId::new();
    let (push_tx, push_rx) = mpsc::channel(32);
    let response = handle
        .request(
            observer,
            push_tx,
            Request::RequestCookiePermission {
                domain: domain.into(),
                url: format!("https://{domain}/"),
            },
        )
        .await
        .unwrap();
    assert!(matches!(response, Response::PermissionGranted));
    (observer, push_rx)
}

async fn next_push(rx: &mut mpsc::Receiver<Push>) -> Push {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for push")
        .expect("push channel closed")
}

async fn assert_no_push(rx: &mut mpsc::Receiver<Push>) {
    // A timeout and a closed channel (the service dropped this
    // observer's sender) both mean nothing was pushed.
    match timeout(Duration::from_millis(100), rx.recv()).await {
        Ok(Some(push)) => panic!("unexpected push: {push:?}"),
        Ok(None) | Err(_) => {}
    }
}

#[tokio::test]
async fn test_grant_then_fetch_and_clear_round_trip() {
    let (handle, store) = spawn_service(ConsentPolicy::GrantAll);
    store.set(cookie("sid", ".example.com"));
    store.set(cookie("theme", "example.com"));

    let (observer, _push_rx) = grant_and_register(&handle, "example.com").await;
    let (push_tx, _rx) = mpsc::channel(32);

    let response = handle
        .request(
            observer,
            push_tx.clone(),
            Request::FetchCookies {
                domain: "example.com".into(),
                url: "https://example.com/".into(),
            },
        )
        .await
        .unwrap();
    match response {
        Response::Cookies { cookies, domain } => {
            assert_eq!(domain, "example.com");
            assert_eq!(cookies.len(), 2);
        }
        other => panic!("expected cookies, got {other:?}"),
    }

    let response = handle
        .request(
            observer,
            push_tx.clone(),
            Request::ClearDomainCookies {
                domain: "example.com".into(),
                url: "https://example.com/".into(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(response, Response::Cleared { domain } if domain == "example.com"));

    let response = handle
        .request(
            observer,
            push_tx,
            Request::FetchCookies {
                domain: "example.com".into(),
                url: "https://example.com/".into(),
            },
        )
        .await
        .unwrap();
    match response {
        Response::Cookies { cookies, .. } => assert!(cookies.is_empty()),
        other => panic!("expected cookies, got {other:?}"),
    }
}

#[tokio::test]
async fn test_check_permission_registers_when_already_granted() {
    let store = Arc::new(MemoryCookieStore::new());
    let service = CookieService::new(
        Arc::new(MemoryCapabilityHost::with_granted(ConsentPolicy::GrantAll)),
        store.clone(),
        32,
    );
    let handle = service.handle();
    tokio::spawn(service.run());

    let observer = ObserverId::new();
    let (push_tx, mut push_rx) = mpsc::channel(32);
    let response = handle
        .request(
            observer,
            push_tx,
            Request::CheckPermission {
                domain: "example.com".into(),
                url: "https://example.com/".into(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(
        response,
        Response::Permission {
            has_permission: true
        }
    ));

    // Registration took effect: a store change reaches the observer.
    store.set(cookie("sid", "example.com"));
    let Push::CookieUpdate { cookies, domain, .. } = next_push(&mut push_rx).await;
    assert_eq!(domain, "example.com");
    assert_eq!(cookies.len(), 1);
}

#[tokio::test]
async fn test_check_permission_does_not_register_without_grant() {
    let (handle, store) = spawn_service(ConsentPolicy::DenyAll);

    let observer = ObserverId::new();
    let (push_tx, mut push_rx) = mpsc::channel(32);
    let response = handle
        .request(
            observer,
            push_tx,
            Request::CheckPermission {
                domain: "example.com".into(),
                url: "https://example.com/".into(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(
        response,
        Response::Permission {
            has_permission: false
        }
    ));

    store.set(cookie("sid", "example.com"));
    assert_no_push(&mut push_rx).await;
}

#[tokio::test]
async fn test_denied_request_gets_denied_response() {
    let (handle, _store) = spawn_service(ConsentPolicy::DenyAll);

    let (push_tx, _rx) = mpsc::channel(32);
    let response = handle
        .request(
            ObserverId::new(),
            push_tx,
            Request::RequestCookiePermission {
                domain: "example.com".into(),
                url: "https://example.com/".into(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(response, Response::PermissionDenied));
}

#[tokio::test]
async fn test_subdomain_change_reaches_parent_observer() {
    let (handle, store) = spawn_service(ConsentPolicy::GrantAll);
    let (_observer, mut push_rx) = grant_and_register(&handle, "example.com").await;

    // Leading dot is stripped before matching; sub.example.com
    // contains example.com, so the containment rule matches.
    store.set(cookie("sid", ".sub.example.com"));

    let Push::CookieUpdate { domain, change, .. } = next_push(&mut push_rx).await;
    assert_eq!(domain, "example.com");
    assert_eq!(change.cause, ChangeCause::Explicit);
    assert!(!change.removed);
}

#[tokio::test]
async fn test_unrelated_change_does_not_reach_observer() {
    let (handle, store) = spawn_service(ConsentPolicy::GrantAll);
    let (_observer, mut push_rx) = grant_and_register(&handle, "example.com").await;

    store.set(cookie("sid", "unrelated.org"));
    assert_no_push(&mut push_rx).await;
}

#[tokio::test]
async fn test_double_grant_setup_yields_single_subscription() {
    let (handle, store) = spawn_service(ConsentPolicy::GrantAll);
    let observer = ObserverId::new();
    let (push_tx, mut push_rx) = mpsc::channel(32);

    // Two setup passes in immediate succession: the second must detect
    // the existing subscription and skip re-registration.
    for _ in 0..2 {
        let response = handle
            .request(
                observer,
                push_tx.clone(),
                Request::RequestCookiePermission {
                    domain: "example.com".into(),
                    url: "https://example.com/".into(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(response, Response::PermissionGranted));
    }

    store.set(cookie("sid", "example.com"));
    let _ = next_push(&mut push_rx).await;
    // A duplicate subscription would deliver the same event again.
    assert_no_push(&mut push_rx).await;
}

#[tokio::test]
async fn test_revocation_is_total() {
    let (handle, store) = spawn_service(ConsentPolicy::GrantAll);
    let (observer, mut push_rx) = grant_and_register(&handle, "example.com").await;

    let (push_tx, _rx) = mpsc::channel(32);
    let response = handle
        .request(observer, push_tx, Request::RevokeCookiePermission)
        .await
        .unwrap();
    assert!(matches!(response, Response::Revoked));

    // An event for a previously registered domain arriving right after
    // the revoke must not produce a push.
    store.set(cookie("sid", "example.com"));
    assert_no_push(&mut push_rx).await;
}

#[tokio::test]
async fn test_closed_tab_stops_receiving_events() {
    let (handle, store) = spawn_service(ConsentPolicy::GrantAll);
    let (observer, mut push_rx) = grant_and_register(&handle, "example.com").await;

    store.set(cookie("a", "example.com"));
    let _ = next_push(&mut push_rx).await;

    handle.tab_closed(observer).await.unwrap();
    store.set(cookie("b", "example.com"));
    assert_no_push(&mut push_rx).await;
}

#[tokio::test]
async fn test_buffered_change_does_not_outrun_teardown() {
    let (handle, store) = spawn_service(ConsentPolicy::GrantAll);

    // A change emitted after the teardown notification was accepted
    // must never reach the closed tab, even when both are waiting in
    // their queues at the same time. Repeated to shake out ordering.
    for round in 0..20 {
        let (observer, mut push_rx) = grant_and_register(&handle, "example.com").await;
        handle.tab_closed(observer).await.unwrap();
        store.set(cookie(&format!("round-{round}"), "example.com"));
        assert_no_push(&mut push_rx).await;
    }
}

#[tokio::test]
async fn test_stale_observer_is_evicted_on_failed_delivery() {
    let (handle, store) = spawn_service(ConsentPolicy::GrantAll);
    let (_gone, gone_rx) = grant_and_register(&handle, "example.com").await;
    let (_alive, mut alive_rx) = grant_and_register(&handle, "example.com").await;

    // Simulate a tab that disappeared without a teardown notification.
    drop(gone_rx);

    // Delivery to the dead channel fails and evicts that observer;
    // the remaining observer is unaffected.
    store.set(cookie("a", "example.com"));
    let _ = next_push(&mut alive_rx).await;

    store.set(cookie("b", "example.com"));
    let _ = next_push(&mut alive_rx).await;
}

#[tokio::test]
async fn test_navigation_rebinds_observer() {
    let (handle, store) = spawn_service(ConsentPolicy::GrantAll);
    let (observer, mut push_rx) = grant_and_register(&handle, "example.com").await;

    handle
        .tab_navigated(observer, "https://other.org/welcome")
        .await
        .unwrap();

    store.set(cookie("sid", "example.com"));
    assert_no_push(&mut push_rx).await;

    store.set(cookie("sid", "other.org"));
    let Push::CookieUpdate { domain, .. } = next_push(&mut push_rx).await;
    assert_eq!(domain, "other.org");
}

#[tokio::test]
async fn test_clear_refreshes_all_observers_via_change_stream() {
    let (handle, store) = spawn_service(ConsentPolicy::GrantAll);
    store.set(cookie("sid", "example.com"));

    let (first, mut first_rx) = grant_and_register(&handle, "example.com").await;
    let (_second, mut second_rx) = grant_and_register(&handle, "example.com").await;

    let (push_tx, _rx) = mpsc::channel(32);
    let response = handle
        .request(
            first,
            push_tx,
            Request::ClearDomainCookies {
                domain: "example.com".into(),
                url: "https://example.com/".into(),
            },
        )
        .await
        .unwrap();
    assert!(matches!(response, Response::Cleared { .. }));

    // Both observers see the refreshed empty snapshot through the
    // deletion's change event, not through the clear response.
    for rx in [&mut first_rx, &mut second_rx] {
        let Push::CookieUpdate {
            cookies, change, ..
        } = next_push(rx).await;
        assert!(cookies.is_empty());
        assert!(change.removed);
    }
}

#[tokio::test]
async fn test_malformed_domain_degrades_to_raw_string() {
    let (handle, _store) = spawn_service(ConsentPolicy::GrantAll);
    let (observer, _push_rx) = grant_and_register(&handle, "example.com").await;
    let (push_tx, _rx) = mpsc::channel(32);

    let response = handle
        .request(
            observer,
            push_tx,
            Request::FetchCookies {
                domain: "%%not-a-url%%".into(),
                url: "also not a url".into(),
            },
        )
        .await
        .unwrap();

    // The raw string is used as the domain; the request still succeeds
    // (with an empty record set) rather than failing to parse.
    match response {
        Response::Cookies { cookies, domain } => {
            assert_eq!(domain, "%%not-a-url%%");
            assert!(cookies.is_empty());
        }
        other => panic!("expected cookies, got {other:?}"),
    }
}
