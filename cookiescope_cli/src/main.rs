use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use cookiescope_core::{
    ConsentPolicy, Cookie, CookieService, MemoryCapabilityHost, MemoryCookieStore, ObserverId,
    Push, Request, Response, SameSite, ServiceHandle,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "cookiescope", version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a scripted session against the in-memory hosts: check,
    /// request consent, fetch, observe a live update, clear, revoke.
    Demo {
        /// Answer the simulated consent prompt with a denial
        #[arg(long)]
        deny: bool,
    },
    /// Print whether a change event domain would reach an observer
    /// registered at the given domain.
    MatchDomains {
        /// Domain the observer is registered at
        #[arg(long)]
        registered: String,
        /// Domain carried by the change event (leading dot allowed)
        #[arg(long)]
        event: String,
    },
}

fn seed_cookie(name: &str, domain: &str, secure: bool) -> Cookie {
    Cookie {
        name: name.into(),
        value: format!("{name}-value"),
        domain: domain.into(),
        path: "/".into(),
        secure,
        http_only: false,
        same_site: SameSite::Lax,
        expiration: Some(Utc::now() + Duration::days(30)),
        store_id: "0".into(),
    }
}

async fn submit(handle: &ServiceHandle, observer: ObserverId, push: mpsc::Sender<Push>, request: Request) {
    let label = serde_json::to_value(&request)
        .ok()
        .and_then(|v| v["type"].as_str().map(str::to_owned))
        .unwrap_or_else(|| "?".into());
    match handle.request(observer, push, request).await {
        Ok(response) => print_response(&label, &response),
        Err(err) => eprintln!("{label}: service error: {err}"),
    }
}

fn print_response(label: &str, response: &Response) {
    match response {
        Response::Permission { has_permission } => {
            println!("{label}: has_permission = {has_permission}");
        }
        Response::PermissionGranted => println!("{label}: granted"),
        Response::PermissionDenied => println!("{label}: denied"),
        Response::Cookies { cookies, domain } => {
            println!("{label}: {} cookie(s) for {domain}", cookies.len());
            for cookie in cookies {
                println!("  {} = {} ({})", cookie.name, cookie.value, cookie.domain);
            }
        }
        Response::Cleared { domain } => println!("{label}: cleared {domain}"),
        Response::Revoked => println!("{label}: revoked"),
        Response::Error { message } => println!("{label}: error: {message}"),
    }
}

async fn run_demo(deny: bool) {
    let policy = if deny {
        ConsentPolicy::DenyAll
    } else {
        ConsentPolicy::GrantAll
    };
    let capabilities = Arc::new(MemoryCapabilityHost::new(policy));
    let store = Arc::new(MemoryCookieStore::new());
    store.set(seed_cookie("sid", ".example.com", true));
    store.set(seed_cookie("theme", "example.com", false));
    store.set(seed_cookie("other", "unrelated.org", false));

    let service = CookieService::new(capabilities, store.clone(), 32);
    let handle = service.handle();
    tokio::spawn(service.run());

    let observer = ObserverId::new();
    let (push_tx, mut push_rx) = mpsc::channel(32);

    // Print live updates as they arrive, the way a tab overlay would
    // re-render.
    tokio::spawn(async move {
        while let Some(Push::CookieUpdate {
            cookies,
            domain,
            change,
        }) = push_rx.recv().await
        {
            println!(
                "push: {domain} now has {} cookie(s) (cause {:?}, removed {})",
                cookies.len(),
                change.cause,
                change.removed
            );
        }
    });

    let domain = "example.com".to_string();
    let url = "https://example.com/".to_string();

    submit(
        &handle,
        observer,
        push_tx.clone(),
        Request::CheckPermission {
            domain: domain.clone(),
            url: url.clone(),
        },
    )
    .await;

    submit(
        &handle,
        observer,
        push_tx.clone(),
        Request::RequestCookiePermission {
            domain: domain.clone(),
            url: url.clone(),
        },
    )
    .await;

    submit(
        &handle,
        observer,
        push_tx.clone(),
        Request::FetchCookies {
            domain: domain.clone(),
            url: url.clone(),
        },
    )
    .await;

    // A site writes a cookie while the overlay is open.
    info!("simulating an external cookie write");
    store.set(seed_cookie("tracker", "sub.example.com", false));

    submit(
        &handle,
        observer,
        push_tx.clone(),
        Request::ClearDomainCookies {
            domain: domain.clone(),
            url: url.clone(),
        },
    )
    .await;

    submit(
        &handle,
        observer,
        push_tx.clone(),
        Request::FetchCookies {
            domain: domain.clone(),
            url: url.clone(),
        },
    )
    .await;

    submit(
        &handle,
        observer,
        push_tx.clone(),
        Request::RevokeCookiePermission,
    )
    .await;

    // Let in-flight pushes drain before exiting.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo { deny } => run_demo(deny).await,
        Commands::MatchDomains { registered, event } => {
            let registered = cookiescope_core::domain::hostname_of(&registered);
            let event = cookiescope_core::domain::strip_leading_dot(&event).to_string();
            let matched = cookiescope_core::domain::domains_match(&registered, &event);
            println!("{registered} vs {event}: {}", if matched { "match" } else { "no match" });
        }
    }
}
